//! Rereferencing and channel selection.
//!
//! `data`: `[E, C, T]` with `contacts[c]` naming channel `c`.
//!
//! * Pair scheme:    `out[e, k, t] = data[e, i(contact_1[k]), t] − data[e, i(contact_2[k]), t]`
//! * Contact scheme: `out[e, k, t] = data[e, i(contact[k]), t]`
//!
//! Rows whose contacts are not all present are skipped, and their labels are
//! dropped with them so `labels.len() == out.shape()[1]` always holds.
//! Output order follows scheme row order.
use std::collections::HashMap;

use ndarray::{s, Array3, Axis};

use crate::error::{EegError, Result};
use crate::scheme::ChannelScheme;

/// Output of [`rereference`].
#[derive(Debug, Clone)]
pub struct Rereferenced {
    pub data: Array3<f64>,
    pub labels: Vec<String>,
    /// Labels of scheme rows that could not be built from the recording.
    pub missing: Vec<String>,
}

pub fn rereference(data: &Array3<f64>, contacts: &[i64], scheme: &ChannelScheme) -> Result<Rereferenced> {
    let (n_ep, n_ch, n_t) = data.dim();
    if contacts.len() != n_ch {
        return Err(EegError::DimensionMismatch(format!(
            "{} contacts for {n_ch} channels",
            contacts.len()
        )));
    }

    // First occurrence wins if a contact number repeats.
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(n_ch);
    for (i, &c) in contacts.iter().enumerate() {
        index.entry(c).or_insert(i);
    }

    let mut rows: Vec<(usize, Option<usize>)> = Vec::with_capacity(scheme.len());
    let mut labels = Vec::with_capacity(scheme.len());
    let mut missing = Vec::new();

    match scheme {
        ChannelScheme::Pairs(pairs) => {
            for p in pairs {
                match (index.get(&p.contact_1), index.get(&p.contact_2)) {
                    (Some(&a), Some(&b)) => {
                        rows.push((a, Some(b)));
                        labels.push(p.label.clone());
                    }
                    _ => missing.push(p.label.clone()),
                }
            }
        }
        ChannelScheme::Contacts(cs) => {
            for c in cs {
                match index.get(&c.contact) {
                    Some(&a) => {
                        rows.push((a, None));
                        labels.push(c.label.clone());
                    }
                    None => missing.push(c.label.clone()),
                }
            }
        }
    }

    if !missing.is_empty() {
        tracing::warn!("the following channels are missing: {}", missing.join(", "));
    }

    let mut out = Array3::<f64>::zeros((n_ep, rows.len(), n_t));
    for (k, &(a, b)) in rows.iter().enumerate() {
        let mut dst = out.slice_mut(s![.., k, ..]);
        dst.assign(&data.index_axis(Axis(1), a));
        if let Some(b) = b {
            dst -= &data.index_axis(Axis(1), b);
        }
    }

    Ok(Rereferenced { data: out, labels, missing })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n_ch: usize, n_t: usize) -> Array3<f64> {
        Array3::from_shape_fn((2, n_ch, n_t), |(e, c, t)| (e * 100 + c * 10 + t) as f64)
    }

    #[test]
    fn pair_difference() {
        let data = ramp(3, 4);
        let scheme = ChannelScheme::pairs([(1, 2, "1-2"), (3, 1, "3-1")]);
        let r = rereference(&data, &[1, 2, 3], &scheme).unwrap();
        assert_eq!(r.data.dim(), (2, 2, 4));
        for &v in r.data.slice(s![.., 0, ..]).iter() {
            assert_eq!(v, -10.0);
        }
        for &v in r.data.slice(s![.., 1, ..]).iter() {
            assert_eq!(v, 20.0);
        }
    }

    #[test]
    fn absent_pairs_drop_data_and_label_together() {
        let data = ramp(2, 3);
        let scheme = ChannelScheme::pairs([(1, 2, "ok"), (1, 9, "gone"), (2, 1, "back")]);
        let r = rereference(&data, &[1, 2], &scheme).unwrap();
        assert_eq!(r.labels, vec!["ok", "back"]);
        assert_eq!(r.missing, vec!["gone"]);
        assert_eq!(r.data.dim().1, r.labels.len());
    }

    #[test]
    fn contact_selection_follows_scheme_order() {
        let data = ramp(3, 2);
        let scheme = ChannelScheme::contacts([(3, "c"), (1, "a")]);
        let r = rereference(&data, &[1, 2, 3], &scheme).unwrap();
        assert_eq!(r.data[[0, 0, 0]], 20.0);
        assert_eq!(r.data[[0, 1, 0]], 0.0);
        assert_eq!(r.labels, vec!["c", "a"]);
    }

    #[test]
    fn contact_count_must_match() {
        let data = ramp(3, 2);
        let scheme = ChannelScheme::contacts([(1, "a")]);
        assert!(rereference(&data, &[1, 2], &scheme).is_err());
    }
}
