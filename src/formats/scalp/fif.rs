//! Minimal FIFF raw reader for cleaned scalp recordings.
//!
//! A FIFF file is a chain of big-endian tags:
//!
//! ```text
//! kind: i32 │ type: u32 │ size: i32 │ next: i32 │ <size bytes>
//! ```
//!
//! `next == 0` means the following tag is adjacent, `next > 0` is an absolute
//! offset and `-1` ends the chain.  `BLOCK_START`/`BLOCK_END` tags nest the
//! tags into blocks; we need `MEAS_INFO` (channel count, rate, channel
//! structs) and the `RAW_DATA` buffers, stored `[time, channel]`.
//!
//! Samples are calibrated as `raw × cal × range`.  `FIRST_SAMPLE` and any
//! `DATA_SKIP` ahead of the first buffer set the absolute sample number of
//! column 0; later skips become zero-filled gaps.
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{bail, ensure, Context};
use ndarray::{s, Array2};

use super::{ChannelType, ContinuousRecording};
use crate::error::Result;

const FIFFB_MEAS: i32 = 100;
const FIFFB_MEAS_INFO: i32 = 101;
const FIFFB_RAW_DATA: i32 = 102;
const FIFFB_CONTINUOUS_DATA: i32 = 112;

const FIFF_BLOCK_START: i32 = 104;
const FIFF_BLOCK_END: i32 = 105;
const FIFF_NCHAN: i32 = 200;
const FIFF_SFREQ: i32 = 201;
const FIFF_CH_INFO: i32 = 203;
const FIFF_FIRST_SAMPLE: i32 = 208;
const FIFF_DATA_BUFFER: i32 = 300;
const FIFF_DATA_SKIP: i32 = 301;

const FIFFT_SHORT: u32 = 2;
const FIFFT_INT: u32 = 3;
const FIFFT_FLOAT: u32 = 4;
const FIFFT_DOUBLE: u32 = 5;
const FIFFT_DAU_PACK16: u32 = 16;

const FIFFV_EEG_CH: i32 = 2;
const FIFFV_STIM_CH: i32 = 3;
const FIFFV_EOG_CH: i32 = 202;

#[derive(Debug, Clone, Copy)]
struct Tag {
    kind: i32,
    ftype: u32,
    size: i32,
    next: i32,
    pos: u64,
}

impl Tag {
    fn data_pos(&self) -> u64 {
        self.pos + 16
    }

    fn next_pos(&self) -> Option<u64> {
        match self.next {
            0 => Some(self.pos + 16 + self.size as u64),
            n if n > 0 => Some(n as u64),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Block {
    kind: i32,
    tags: Vec<Tag>,
    children: Vec<Block>,
}

impl Block {
    fn find(&self, kind: i32) -> Option<&Block> {
        if self.kind == kind {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(kind))
    }
}

struct FifFile<R> {
    reader: R,
    len: u64,
}

impl<R: Read + Seek> FifFile<R> {
    fn tag_at(&mut self, pos: u64) -> anyhow::Result<Tag> {
        self.reader.seek(SeekFrom::Start(pos))?;
        let mut b = [0u8; 16];
        self.reader
            .read_exact(&mut b)
            .with_context(|| format!("read tag header @ {pos:#x}"))?;
        Ok(Tag {
            kind: i32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            ftype: u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
            size: i32::from_be_bytes([b[8], b[9], b[10], b[11]]),
            next: i32::from_be_bytes([b[12], b[13], b[14], b[15]]),
            pos,
        })
    }

    fn payload(&mut self, tag: &Tag) -> anyhow::Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(tag.data_pos()))?;
        let mut buf = vec![0u8; tag.size.max(0) as usize];
        self.reader
            .read_exact(&mut buf)
            .with_context(|| format!("read tag payload @ {:#x}", tag.data_pos()))?;
        Ok(buf)
    }

    fn read_i32(&mut self, tag: &Tag) -> anyhow::Result<i32> {
        let b = self.payload(tag)?;
        ensure!(b.len() >= 4, "tag {} too short for i32", tag.kind);
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f32(&mut self, tag: &Tag) -> anyhow::Result<f32> {
        let b = self.payload(tag)?;
        ensure!(b.len() >= 4, "tag {} too short for f32", tag.kind);
        Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Walk the tag chain from the start of the file.
    fn scan(&mut self) -> anyhow::Result<Vec<Tag>> {
        let mut tags = Vec::new();
        let mut seen = HashSet::new();
        let mut pos = Some(0);
        while let Some(p) = pos {
            ensure!(p + 16 <= self.len, "tag @ {p:#x} past end of file ({} bytes)", self.len);
            ensure!(seen.insert(p), "tag chain revisits {p:#x}");
            let tag = self.tag_at(p)?;
            pos = tag.next_pos();
            tags.push(tag);
        }
        Ok(tags)
    }

    fn tree(&mut self, tags: &[Tag]) -> anyhow::Result<Block> {
        let mut stack = vec![Block::default()];
        for tag in tags {
            match tag.kind {
                FIFF_BLOCK_START => {
                    let kind = self.read_i32(tag)?;
                    stack.push(Block { kind, ..Block::default() });
                }
                FIFF_BLOCK_END => {
                    if stack.len() > 1 {
                        if let Some(done) = stack.pop() {
                            if let Some(parent) = stack.last_mut() {
                                parent.children.push(done);
                            }
                        }
                    }
                }
                _ => {
                    if let Some(node) = stack.last_mut() {
                        node.tags.push(*tag);
                    }
                }
            }
        }
        // Unterminated blocks still count.
        while stack.len() > 1 {
            if let Some(orphan) = stack.pop() {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(orphan);
                }
            }
        }
        stack.pop().context("empty FIFF tree")
    }
}

struct Channel {
    name: String,
    kind: i32,
    cal: f64,
}

/// 96-byte channel struct: scanno, logno, kind, range, cal, coil_type,
/// loc[12], unit, unit_mul, name[16].
fn parse_ch_info(raw: &[u8]) -> anyhow::Result<Channel> {
    ensure!(raw.len() >= 96, "ch_info payload too short: {} bytes", raw.len());
    let be_i32 = |o: usize| i32::from_be_bytes([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]);
    let be_f32 = |o: usize| f32::from_be_bytes([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]);
    let name = &raw[80..96];
    let end = name.iter().position(|&b| b == 0).unwrap_or(16);
    Ok(Channel {
        name: name[..end].iter().map(|&b| b as char).collect(),
        kind: be_i32(8),
        cal: be_f32(16) as f64 * be_f32(12) as f64,
    })
}

fn channel_type(kind: i32) -> ChannelType {
    match kind {
        FIFFV_EEG_CH => ChannelType::Eeg,
        FIFFV_EOG_CH => ChannelType::Eog,
        FIFFV_STIM_CH => ChannelType::Stim,
        _ => ChannelType::Misc,
    }
}

fn decode_buffer(ftype: u32, bytes: &[u8], out: &mut Vec<f64>) -> anyhow::Result<()> {
    out.clear();
    match ftype {
        FIFFT_FLOAT => out.extend(bytes.chunks_exact(4).map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64)),
        FIFFT_INT => out.extend(bytes.chunks_exact(4).map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64)),
        FIFFT_DOUBLE => out.extend(bytes.chunks_exact(8).map(|b| {
            f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })),
        FIFFT_SHORT | FIFFT_DAU_PACK16 => {
            out.extend(bytes.chunks_exact(2).map(|b| i16::from_be_bytes([b[0], b[1]]) as f64))
        }
        other => bail!("unsupported FIFF buffer type {other}"),
    }
    Ok(())
}

fn item_size(ftype: u32) -> Option<usize> {
    match ftype {
        FIFFT_SHORT | FIFFT_DAU_PACK16 => Some(2),
        FIFFT_INT | FIFFT_FLOAT => Some(4),
        FIFFT_DOUBLE => Some(8),
        _ => None,
    }
}

fn read_fif(path: &Path) -> anyhow::Result<ContinuousRecording> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let len = file.metadata()?.len();
    let mut fif = FifFile { reader: BufReader::new(file), len };
    let tags = fif.scan()?;
    let root = fif.tree(&tags)?;

    let meas = root.find(FIFFB_MEAS).context("FIFFB_MEAS not found")?;
    let info = meas.find(FIFFB_MEAS_INFO).context("FIFFB_MEAS_INFO not found")?;

    let mut n_chan = None;
    let mut sfreq = None;
    let mut chs = Vec::new();
    for tag in &info.tags {
        match tag.kind {
            FIFF_NCHAN => n_chan = Some(fif.read_i32(tag)? as usize),
            FIFF_SFREQ => sfreq = Some(fif.read_f32(tag)? as f64),
            FIFF_CH_INFO => chs.push(parse_ch_info(&fif.payload(tag)?)?),
            _ => {}
        }
    }
    let n_chan = n_chan.context("FIFF_NCHAN not found")?;
    let sfreq = sfreq.context("FIFF_SFREQ not found")?;
    ensure!(chs.len() == n_chan, "expected {n_chan} channel structs, got {}", chs.len());

    let raw = meas
        .find(FIFFB_RAW_DATA)
        .or_else(|| meas.find(FIFFB_CONTINUOUS_DATA))
        .context("no raw-data block in FIFF file")?;

    let mut first_samp = 0i64;
    if let Some(tag) = raw.tags.iter().find(|t| t.kind == FIFF_FIRST_SAMPLE) {
        first_samp = fif.read_i32(tag)? as i64;
    }

    // (tag, samples); skips become zero-filled gaps of the next buffer's size.
    let mut buffers: Vec<(Option<Tag>, usize)> = Vec::new();
    let mut pending_skip = 0usize;
    for tag in &raw.tags {
        match tag.kind {
            FIFF_DATA_SKIP => pending_skip += fif.read_i32(tag)?.max(0) as usize,
            FIFF_DATA_BUFFER => {
                let size = item_size(tag.ftype).with_context(|| format!("unknown buffer type {}", tag.ftype))?;
                let n_samp = tag.size.max(0) as usize / (size * n_chan.max(1));
                if pending_skip > 0 {
                    if buffers.is_empty() {
                        first_samp += (n_samp * pending_skip) as i64;
                    } else {
                        buffers.push((None, n_samp * pending_skip));
                    }
                }
                pending_skip = 0;
                buffers.push((Some(*tag), n_samp));
            }
            _ => {}
        }
    }
    ensure!(!buffers.is_empty(), "no data buffers in raw-data block");
    tracing::debug!(path = %path.display(), buffers = buffers.len(), first_samp, "scanned FIFF raw buffers");

    let n_times: usize = buffers.iter().map(|(_, n)| n).sum();
    let mut data = Array2::<f64>::zeros((n_chan, n_times));
    let mut values = Vec::new();
    let mut t0 = 0;
    for (tag, n_samp) in buffers {
        if let Some(tag) = tag {
            let bytes = fif.payload(&tag)?;
            decode_buffer(tag.ftype, &bytes, &mut values)?;
            let block = Array2::from_shape_vec((n_samp, n_chan), values.split_off(0))?;
            data.slice_mut(s![.., t0..t0 + n_samp]).assign(&block.t());
        }
        t0 += n_samp;
    }
    for (mut row, ch) in data.rows_mut().into_iter().zip(&chs) {
        row *= ch.cal;
    }

    Ok(ContinuousRecording {
        data,
        sfreq,
        first_samp,
        ch_names: chs.iter().map(|c| c.name.clone()).collect(),
        ch_types: chs.iter().map(|c| channel_type(c.kind)).collect(),
    })
}

pub fn read_raw_fif(path: &Path) -> Result<ContinuousRecording> {
    Ok(read_fif(path)?)
}
