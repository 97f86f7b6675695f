//! # Multi-instrument aligner
//!
//! Inner-joins two or more [`InstrumentFrame`]s on timestamp and derives log prices and
//! log returns per instrument:
//!
//! ```text
//! {P}_log[t] = ln({P}_close[t])
//! {P}_ret[t] = {P}_log[t] - {P}_log[t-1]
//! ```
//!
//! The first joined timestamp has no previous log price, so it is removed from the result.
//! No interpolation happens: a timestamp missing from any instrument is dropped for all.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::errors::{PairDatasetError, Result};
use crate::merge::InstrumentFrame;

/// Column suffixes of one instrument, in the order they are laid out in the dataset.
pub const COLUMN_SUFFIXES: [&str; 11] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "daily_funding_sum",
    "funding_events",
    "daily_funding_mean",
    "funding_incomplete",
    "log",
    "ret",
];

/// Column name of `suffix` for instrument `prefix`.
pub fn column_name(prefix: &str, suffix: &str) -> String {
    format!("{}_{}", prefix, suffix)
}

/// Borrowed view on one dataset column.
#[derive(Debug, Clone, Copy)]
pub enum ColumnRef<'a> {
    Float(&'a [Option<f64>]),
    Int(&'a [Option<i64>]),
    Bool(&'a [Option<bool>]),
}

impl ColumnRef<'_> {
    pub fn len(&self) -> usize {
        match self {
            ColumnRef::Float(v) => v.len(),
            ColumnRef::Int(v) => v.len(),
            ColumnRef::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absent values. A NaN float counts as absent.
    pub fn null_count(&self) -> usize {
        match self {
            ColumnRef::Float(v) => v.iter().filter(|x| !x.is_some_and(|f| !f.is_nan())).count(),
            ColumnRef::Int(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnRef::Bool(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }
}

/// Columns of one instrument inside a [`PairedDataset`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentColumns {
    pub prefix: String,
    pub open: Vec<Option<f64>>,
    pub high: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
    pub close: Vec<Option<f64>>,
    pub volume: Vec<Option<f64>>,
    pub daily_funding_sum: Vec<Option<f64>>,
    pub funding_events: Vec<Option<i64>>,
    pub daily_funding_mean: Vec<Option<f64>>,
    pub funding_incomplete: Vec<Option<bool>>,
    pub log: Vec<Option<f64>>,
    pub ret: Vec<Option<f64>>,
}

impl InstrumentColumns {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Column by suffix, see [`COLUMN_SUFFIXES`].
    pub fn column(&self, suffix: &str) -> Option<ColumnRef<'_>> {
        let col = match suffix {
            "open" => ColumnRef::Float(&self.open),
            "high" => ColumnRef::Float(&self.high),
            "low" => ColumnRef::Float(&self.low),
            "close" => ColumnRef::Float(&self.close),
            "volume" => ColumnRef::Float(&self.volume),
            "daily_funding_sum" => ColumnRef::Float(&self.daily_funding_sum),
            "funding_events" => ColumnRef::Int(&self.funding_events),
            "daily_funding_mean" => ColumnRef::Float(&self.daily_funding_mean),
            "funding_incomplete" => ColumnRef::Bool(&self.funding_incomplete),
            "log" => ColumnRef::Float(&self.log),
            "ret" => ColumnRef::Float(&self.ret),
            _ => return None,
        };
        Some(col)
    }

    /// All columns with their full names, in dataset order.
    pub fn columns(&self) -> Vec<(String, ColumnRef<'_>)> {
        COLUMN_SUFFIXES
            .iter()
            .filter_map(|suffix| {
                self.column(suffix)
                    .map(|col| (column_name(&self.prefix, suffix), col))
            })
            .collect()
    }

    fn drop_first_row(&mut self) {
        for col in [
            &mut self.open,
            &mut self.high,
            &mut self.low,
            &mut self.close,
            &mut self.volume,
            &mut self.daily_funding_sum,
            &mut self.daily_funding_mean,
            &mut self.log,
            &mut self.ret,
        ] {
            if !col.is_empty() {
                col.remove(0);
            }
        }
        if !self.funding_events.is_empty() {
            self.funding_events.remove(0);
        }
        if !self.funding_incomplete.is_empty() {
            self.funding_incomplete.remove(0);
        }
    }
}

/// Time-aligned dataset of several instruments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairedDataset {
    pub timestamps: Vec<DateTime<Utc>>,
    pub instruments: Vec<InstrumentColumns>,
}

impl PairedDataset {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn prefixes(&self) -> Vec<&str> {
        self.instruments.iter().map(|i| i.prefix.as_str()).collect()
    }

    pub fn instrument(&self, prefix: &str) -> Option<&InstrumentColumns> {
        self.instruments.iter().find(|i| i.prefix == prefix)
    }

    /// All instrument columns with their full names, in dataset order.
    pub fn columns(&self) -> Vec<(String, ColumnRef<'_>)> {
        self.instruments.iter().flat_map(|i| i.columns()).collect()
    }

    /// Number of timestamps that occur more than once.
    pub fn duplicate_timestamps(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.timestamps.len());
        self.timestamps.iter().filter(|ts| !seen.insert(**ts)).count()
    }

    /// Every column must have one value per timestamp.
    pub fn check_shape(&self) -> Result<()> {
        for (name, col) in self.columns() {
            if col.len() != self.timestamps.len() {
                return Err(PairDatasetError::data_integrity(format!(
                    "Column {} has {} values for {} timestamps",
                    name,
                    col.len(),
                    self.timestamps.len()
                )));
            }
        }
        Ok(())
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Inner-join `frames` on timestamp and add `log`/`ret` columns.
pub fn align_instruments(frames: &[InstrumentFrame]) -> Result<PairedDataset> {
    if frames.len() < 2 {
        return Err(PairDatasetError::data_integrity(format!(
            "At least two instrument frames are required, got {}",
            frames.len()
        )));
    }

    let mut prefixes = HashSet::new();
    for frame in frames {
        if !prefixes.insert(frame.prefix.as_str()) {
            return Err(PairDatasetError::data_integrity(format!(
                "Duplicate instrument prefix '{}'",
                frame.prefix
            )));
        }
    }

    let mut indices: Vec<HashMap<DateTime<Utc>, usize>> = Vec::with_capacity(frames.len());
    for frame in frames {
        let mut index = HashMap::with_capacity(frame.rows.len());
        for (i, row) in frame.rows.iter().enumerate() {
            if index.insert(row.timestamp, i).is_some() {
                return Err(PairDatasetError::data_integrity(format!(
                    "Duplicate timestamp {} in instrument {}",
                    row.timestamp, frame.prefix
                )));
            }
        }
        indices.push(index);
    }

    let mut common: BTreeSet<DateTime<Utc>> = indices[0].keys().copied().collect();
    for index in &indices[1..] {
        common.retain(|ts| index.contains_key(ts));
    }
    let joined: Vec<DateTime<Utc>> = common.into_iter().collect();

    if joined.is_empty() {
        warn!("instruments share no timestamp, aligned dataset is empty");
        return Ok(PairedDataset {
            timestamps: Vec::new(),
            instruments: frames.iter().map(|f| InstrumentColumns::new(&f.prefix)).collect(),
        });
    }

    let mut instruments = Vec::with_capacity(frames.len());
    for (frame, index) in frames.iter().zip(&indices) {
        let mut cols = InstrumentColumns::new(&frame.prefix);
        let mut prev_log: Option<f64> = None;

        for ts in &joined {
            let row = &frame.rows[index[ts]];
            if !(row.close.is_finite() && row.close > 0.0) {
                return Err(PairDatasetError::data_integrity(format!(
                    "{} close {} at {} cannot be log-transformed",
                    frame.prefix, row.close, ts
                )));
            }
            let log = row.close.ln();

            cols.open.push(finite(row.open));
            cols.high.push(finite(row.high));
            cols.low.push(finite(row.low));
            cols.close.push(Some(row.close));
            cols.volume.push(finite(row.volume));
            cols.daily_funding_sum.push(Some(row.daily_funding_sum));
            cols.funding_events.push(Some(i64::from(row.funding_events)));
            cols.daily_funding_mean.push(row.daily_funding_mean);
            cols.funding_incomplete.push(Some(row.funding_incomplete));
            cols.log.push(Some(log));
            cols.ret.push(prev_log.map(|p| log - p));
            prev_log = Some(log);
        }

        cols.drop_first_row();
        instruments.push(cols);
    }

    let timestamps = joined[1..].to_vec();
    info!(
        "aligned {} instruments on {} timestamps ({} after dropping the first)",
        frames.len(),
        joined.len(),
        timestamps.len()
    );

    Ok(PairedDataset {
        timestamps,
        instruments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_count_treats_nan_as_missing() {
        let values = [Some(1.0), None, Some(f64::NAN)];
        assert_eq!(ColumnRef::Float(&values).null_count(), 2);
        let flags = [Some(true), None];
        assert_eq!(ColumnRef::Bool(&flags).null_count(), 1);
    }

    #[test]
    fn column_names_follow_prefix_layout() {
        let cols = InstrumentColumns::new("ETH");
        let names: Vec<String> = cols.columns().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.len(), COLUMN_SUFFIXES.len());
        assert_eq!(names[0], "ETH_open");
        assert_eq!(names[10], "ETH_ret");
        assert!(cols.column("spread").is_none());
    }

    #[test]
    fn duplicate_timestamps_are_counted() {
        let ts = DateTime::<Utc>::UNIX_EPOCH;
        let dataset = PairedDataset {
            timestamps: vec![ts, ts, ts],
            instruments: Vec::new(),
        };
        assert_eq!(dataset.duplicate_timestamps(), 2);
    }
}
