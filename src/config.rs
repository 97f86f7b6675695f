//! Pipeline configuration.
//!
//! Every tunable of a run lives in [`PipelineConfig`] and is passed explicitly to the
//! stages that need it. The configuration is read from a JSON file, may be patched from
//! the command line, and is validated before any network activity.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{parse_start, Resolution};
use crate::errors::{PairDatasetError, Result};
use crate::retry::RetryPolicy;

/// One instrument of the dataset: the column prefix and the exchange symbol behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Column namespace, e.g. `ETH` produces `ETH_close`
    pub prefix: String,
    /// Exchange symbol, e.g. `ETH` on Hyperliquid
    pub symbol: String,
}

impl InstrumentSpec {
    pub fn new(prefix: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            symbol: symbol.into(),
        }
    }
}

/// Funding guardrail and completeness settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingConfig {
    /// Rates with an absolute value above this cap are excluded from daily aggregates
    pub abs_cap: f64,
    /// Number of settlements a complete day contains
    pub expected_events_per_day: u32,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            abs_cap: 0.01,
            expected_events_per_day: 3,
        }
    }
}

/// Pagination and retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub candle_page_size: usize,
    pub funding_page_size: usize,
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            candle_page_size: 1000,
            funding_page_size: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Complete configuration of a dataset build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Instruments in column order
    pub instruments: Vec<InstrumentSpec>,
    pub resolution: Resolution,
    /// History start, e.g. `2022-01-01 00:00:00` (UTC)
    pub start: String,
    /// Parquet file the aligned dataset is written to
    pub output_path: PathBuf,
    /// Directory receiving the validation report artifacts
    pub report_dir: PathBuf,
    pub funding: FundingConfig,
    pub fetch: FetchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            instruments: vec![InstrumentSpec::new("ETH", "ETH"), InstrumentSpec::new("SOL", "SOL")],
            resolution: Resolution::Day1,
            start: "2022-01-01 00:00:00".to_string(),
            output_path: PathBuf::from("pair_merged_1d.parquet"),
            report_dir: PathBuf::from("report"),
            funding: FundingConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            PairDatasetError::configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parsed history start.
    pub fn start_time(&self) -> Result<DateTime<Utc>> {
        parse_start(&self.start).map_err(|e| {
            PairDatasetError::configuration(format!("Invalid start '{}': {}", self.start, e))
        })
    }

    /// Check everything that can be checked without touching the network or the filesystem.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.instruments.len() < 2 {
            return Err(PairDatasetError::configuration(format!(
                "At least two instruments are required, got {}",
                self.instruments.len()
            )));
        }

        let mut prefixes = HashSet::new();
        for instrument in &self.instruments {
            if instrument.prefix.trim().is_empty() {
                return Err(PairDatasetError::configuration(format!(
                    "Instrument '{}' has an empty prefix",
                    instrument.symbol
                )));
            }
            if instrument.symbol.trim().is_empty() {
                return Err(PairDatasetError::configuration(format!(
                    "No symbol mapped for prefix '{}'",
                    instrument.prefix
                )));
            }
            if !prefixes.insert(instrument.prefix.as_str()) {
                return Err(PairDatasetError::configuration(format!(
                    "Duplicate instrument prefix '{}'",
                    instrument.prefix
                )));
            }
        }

        if self.resolution != Resolution::Day1 {
            return Err(PairDatasetError::configuration(format!(
                "Funding is aggregated per UTC day, candles must be '1d' (got '{}')",
                self.resolution
            )));
        }

        let start = self.start_time()?;
        if start >= now {
            return Err(PairDatasetError::configuration(format!(
                "History start {} is not in the past",
                start
            )));
        }

        if !(self.funding.abs_cap.is_finite() && self.funding.abs_cap > 0.0) {
            return Err(PairDatasetError::configuration(format!(
                "funding.abs_cap must be a positive number, got {}",
                self.funding.abs_cap
            )));
        }
        if self.funding.expected_events_per_day == 0 {
            return Err(PairDatasetError::configuration(
                "funding.expected_events_per_day must be at least 1",
            ));
        }
        if self.fetch.candle_page_size == 0 || self.fetch.funding_page_size == 0 {
            return Err(PairDatasetError::configuration("Page sizes must be at least 1"));
        }
        if self.fetch.retry.max_attempts == Some(0) {
            return Err(PairDatasetError::configuration(
                "fetch.retry.max_attempts must be at least 1 when set",
            ));
        }

        if self.output_path.as_os_str().is_empty() {
            return Err(PairDatasetError::configuration("output_path is empty"));
        }
        Ok(())
    }

    /// Make sure the output file can be created: the parent directory exists (or is created)
    /// and the path is not a directory.
    pub fn prepare_output(&self) -> Result<()> {
        if self.output_path.is_dir() {
            return Err(PairDatasetError::configuration(format!(
                "output_path {} is a directory",
                self.output_path.display()
            )));
        }
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    PairDatasetError::configuration(format!(
                        "Cannot create output directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        // Dropping the handle removes the check file.
        tempfile::NamedTempFile::new_in(output_dir(&self.output_path)).map_err(|e| {
            PairDatasetError::configuration(format!(
                "Output location {} is not writable: {}",
                self.output_path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

/// Directory a file at `path` lands in, `.` for bare file names.
pub(crate) fn output_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
