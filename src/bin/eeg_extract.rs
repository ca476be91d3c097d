use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use eegio::{
    io::write_timeseries, read_events_json, ChannelScheme, EegReader, EegRequest, EventRow, LoaderConfig,
    PathQuery,
};

#[derive(Parser)]
#[command(name = "eeg-extract", about = "Extract event-locked EEG epochs to safetensors")]
struct Args {
    /// Recording: split-channel base name, .h5, .npy, .bdf or .raw
    #[arg(long)]
    eeg: PathBuf,

    /// sources.json (or params.txt) describing the recording
    #[arg(long)]
    sources: PathBuf,

    /// JSON array of events; omit to export the whole session
    #[arg(long)]
    events: Option<PathBuf>,

    /// Epoch start relative to each event (ms)
    #[arg(long, allow_hyphen_values = true)]
    rel_start: Option<f64>,

    /// Epoch stop relative to each event (ms)
    #[arg(long, allow_hyphen_values = true)]
    rel_stop: Option<f64>,

    /// Channel scheme JSON (pairs or contacts)
    #[arg(long)]
    scheme: Option<PathBuf>,

    /// Load the cleaned scalp recording
    #[arg(long)]
    clean: bool,

    /// Subject code; taken from the events when omitted
    #[arg(long)]
    subject: Option<String>,

    /// Output .safetensors path
    #[arg(long)]
    output: PathBuf,

    /// Logging verbosity: trace, debug, info, warn or error
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn absolute(path: &Path) -> Result<String> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(abs.to_string_lossy().into_owned())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let eegfile = absolute(&args.eeg)?;
    let mut events: Vec<EventRow> = match &args.events {
        Some(path) => read_events_json(path).with_context(|| format!("reading {}", path.display()))?,
        None => vec![EventRow::at_offset(0)],
    };
    let subject = match (&args.subject, events.first()) {
        (Some(s), _) => s.clone(),
        (None, Some(e)) if !e.subject.is_empty() => e.subject.clone(),
        _ => anyhow::bail!("--subject is required when events carry no subject"),
    };
    for e in &mut events {
        e.eegfile = eegfile.clone();
        if e.subject.is_empty() {
            e.subject = subject.clone();
        }
    }

    let (rel_start, rel_stop) = match args.events {
        Some(_) => (args.rel_start, args.rel_stop),
        None => (Some(args.rel_start.unwrap_or(0.0)), Some(args.rel_stop.unwrap_or(-1.0))),
    };
    let scheme = args
        .scheme
        .as_deref()
        .map(ChannelScheme::from_json_path)
        .transpose()?;

    let sources = args.sources.clone();
    let resolver = move |data_type: &str, _: &PathQuery| -> eegio::Result<Option<PathBuf>> {
        Ok((data_type == "sources").then(|| sources.clone()))
    };
    let reader = EegReader::new(subject, LoaderConfig::default(), Rc::new(resolver));
    let request = EegRequest { events: Some(events), rel_start, rel_stop, scheme, clean: args.clean };

    let ts = reader.load(&request)?;
    println!(
        "Loaded {} epochs × {} channels × {} samples @ {} Hz",
        ts.shape().0,
        ts.shape().1,
        ts.shape().2,
        ts.samplerate
    );

    write_timeseries(&ts, &args.output)?;
    println!("Written → {}", args.output.display());

    Ok(())
}
