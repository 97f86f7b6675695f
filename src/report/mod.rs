//! Validation report over a persisted dataset.
//!
//! The report never touches the dataset it inspects. It computes
//!
//! - a one-row summary (range, row count, timezone, duplicate timestamps, worst missing
//!   ratio, incomplete funding days per instrument),
//! - the missing ratio of every column, worst first,
//! - every day on which at least one instrument has incomplete funding,
//! - an anomaly scan per instrument (zero closes, large log returns, return range),
//! - the log-price series a chart is drawn from,
//!
//! and writes each table as a CSV file into the report directory. Structural problems are
//! collected as findings; callers decide whether findings fail the run.
//!
//! No image is rendered. The log-price chart is left to external plotting tools that read
//! [`LOG_PRICE_FILE`].

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::align::{column_name, PairedDataset};
use crate::errors::Result;
use crate::store::read_dataset;

pub const SUMMARY_FILE: &str = "summary.csv";
pub const MISSING_RATIO_FILE: &str = "missing_ratio.csv";
pub const FUNDING_INCOMPLETE_FILE: &str = "funding_incomplete_days.csv";
pub const ANOMALY_FILE: &str = "anomaly_checks.csv";
pub const LOG_PRICE_FILE: &str = "log_price.csv";

/// A daily log return beyond this magnitude (a 20% move) is flagged.
pub fn large_return_threshold() -> f64 {
    1.2_f64.ln()
}

/// Dataset-wide summary.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub rows: usize,
    pub timezone: String,
    pub duplicate_timestamps: usize,
    pub missing_ratio_max: Option<f64>,
    /// Incomplete funding days per instrument prefix
    pub incomplete_days: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingRatioRow {
    pub column: String,
    pub missing_ratio: f64,
}

/// Funding cells of one instrument on an incomplete day.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingCells {
    pub prefix: String,
    pub incomplete: Option<bool>,
    pub events: Option<i64>,
    pub sum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncompleteDayRow {
    pub timestamp: DateTime<Utc>,
    pub instruments: Vec<FundingCells>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRow {
    pub symbol: String,
    pub close_eq_0_days: usize,
    pub ret_abs_gt_20pct_days: usize,
    pub ret_min: Option<f64>,
    pub ret_max: Option<f64>,
}

/// Funding acceptance figures of one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingAcceptance {
    pub prefix: String,
    pub incomplete_pct: Option<f64>,
    pub sum_min: Option<f64>,
    pub sum_max: Option<f64>,
}

/// Paths of the written artifacts.
#[derive(Debug, Clone)]
pub struct ReportArtifacts {
    pub summary: PathBuf,
    pub missing_ratio: PathBuf,
    pub funding_incomplete: PathBuf,
    pub anomalies: PathBuf,
    pub log_price: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub summary: DatasetSummary,
    pub missing_ratio: Vec<MissingRatioRow>,
    pub incomplete_days: Vec<IncompleteDayRow>,
    pub anomalies: Vec<AnomalyRow>,
    pub acceptance: Vec<FundingAcceptance>,
    /// Structural problems that make the dataset unfit for research
    pub findings: Vec<String>,
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%:z").to_string()
}

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn at<T: Copy>(column: &[Option<T>], row: usize) -> Option<T> {
    column.get(row).copied().flatten()
}

fn finite_values(values: &[Option<f64>]) -> impl Iterator<Item = f64> + '_ {
    values.iter().flatten().copied().filter(|v| !v.is_nan())
}

fn min_max(values: &[Option<f64>]) -> (Option<f64>, Option<f64>) {
    finite_values(values).fold((None, None), |(lo, hi), v| {
        (
            Some(lo.map_or(v, |l: f64| l.min(v))),
            Some(hi.map_or(v, |h: f64| h.max(v))),
        )
    })
}

/// Per-column missing ratios, worst first. Ties keep dataset column order.
pub fn missing_ratios(dataset: &PairedDataset) -> Vec<MissingRatioRow> {
    let rows = dataset.len();
    let mut table: Vec<MissingRatioRow> = dataset
        .columns()
        .into_iter()
        .map(|(column, col)| MissingRatioRow {
            column,
            missing_ratio: if rows == 0 {
                0.0
            } else {
                col.null_count() as f64 / rows as f64
            },
        })
        .collect();
    table.sort_by(|a, b| b.missing_ratio.total_cmp(&a.missing_ratio));
    table
}

/// Days on which any instrument's funding is incomplete.
pub fn incomplete_funding_days(dataset: &PairedDataset) -> Vec<IncompleteDayRow> {
    (0..dataset.len())
        .filter(|&i| {
            dataset
                .instruments
                .iter()
                .any(|inst| at(&inst.funding_incomplete, i) == Some(true))
        })
        .map(|i| IncompleteDayRow {
            timestamp: dataset.timestamps[i],
            instruments: dataset
                .instruments
                .iter()
                .map(|inst| FundingCells {
                    prefix: inst.prefix.clone(),
                    incomplete: at(&inst.funding_incomplete, i),
                    events: at(&inst.funding_events, i),
                    sum: at(&inst.daily_funding_sum, i),
                })
                .collect(),
        })
        .collect()
}

/// Zero closes and return extremes per instrument.
pub fn anomaly_scan(dataset: &PairedDataset) -> Vec<AnomalyRow> {
    let threshold = large_return_threshold();
    dataset
        .instruments
        .iter()
        .map(|inst| {
            let (ret_min, ret_max) = min_max(&inst.ret);
            AnomalyRow {
                symbol: inst.prefix.clone(),
                close_eq_0_days: inst.close.iter().filter(|c| **c == Some(0.0)).count(),
                ret_abs_gt_20pct_days: finite_values(&inst.ret)
                    .filter(|r| r.abs() > threshold)
                    .count(),
                ret_min,
                ret_max,
            }
        })
        .collect()
}

/// Share of incomplete funding days and the range of daily funding sums per instrument.
pub fn funding_acceptance(dataset: &PairedDataset) -> Vec<FundingAcceptance> {
    dataset
        .instruments
        .iter()
        .map(|inst| {
            let incomplete = inst
                .funding_incomplete
                .iter()
                .filter(|f| **f == Some(true))
                .count();
            let (sum_min, sum_max) = min_max(&inst.daily_funding_sum);
            FundingAcceptance {
                prefix: inst.prefix.clone(),
                incomplete_pct: (!inst.funding_incomplete.is_empty())
                    .then(|| 100.0 * incomplete as f64 / inst.funding_incomplete.len() as f64),
                sum_min,
                sum_max,
            }
        })
        .collect()
}

/// Log the acceptance figures, one line per instrument.
pub fn log_acceptance(acceptance: &[FundingAcceptance]) {
    for a in acceptance {
        info!(
            "{} funding incomplete days: {}% | daily_funding_sum min {} max {}",
            a.prefix,
            a.incomplete_pct.map_or("n/a".to_string(), |p| format!("{:.2}", p)),
            cell(a.sum_min),
            cell(a.sum_max)
        );
    }
}

impl ValidationReport {
    /// Compute every table of the report.
    pub fn build(dataset: &PairedDataset) -> Self {
        let missing_ratio = missing_ratios(dataset);
        let anomalies = anomaly_scan(dataset);
        let duplicate_timestamps = dataset.duplicate_timestamps();

        let summary = DatasetSummary {
            start: dataset.timestamps.iter().min().copied(),
            end: dataset.timestamps.iter().max().copied(),
            rows: dataset.len(),
            timezone: "UTC".to_string(),
            duplicate_timestamps,
            missing_ratio_max: missing_ratio.first().map(|r| r.missing_ratio),
            incomplete_days: dataset
                .instruments
                .iter()
                .map(|inst| {
                    let days = inst
                        .funding_incomplete
                        .iter()
                        .filter(|f| **f == Some(true))
                        .count();
                    (inst.prefix.clone(), days)
                })
                .collect(),
        };

        let mut findings = Vec::new();
        if duplicate_timestamps > 0 {
            findings.push(format!("{} duplicate timestamps", duplicate_timestamps));
        }
        for row in &anomalies {
            if row.close_eq_0_days > 0 {
                findings.push(format!(
                    "{} has {} days with a zero close",
                    row.symbol, row.close_eq_0_days
                ));
            }
        }

        Self {
            summary,
            missing_ratio,
            incomplete_days: incomplete_funding_days(dataset),
            anomalies,
            acceptance: funding_acceptance(dataset),
            findings,
        }
    }

    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }

    /// Write all report artifacts into `dir`, creating it when needed.
    pub fn write_artifacts(&self, dataset: &PairedDataset, dir: &Path) -> Result<ReportArtifacts> {
        fs::create_dir_all(dir)?;
        let artifacts = ReportArtifacts {
            summary: dir.join(SUMMARY_FILE),
            missing_ratio: dir.join(MISSING_RATIO_FILE),
            funding_incomplete: dir.join(FUNDING_INCOMPLETE_FILE),
            anomalies: dir.join(ANOMALY_FILE),
            log_price: dir.join(LOG_PRICE_FILE),
        };

        self.write_summary(&artifacts.summary)?;

        let mut writer = csv::Writer::from_path(&artifacts.missing_ratio)?;
        for row in &self.missing_ratio {
            writer.serialize(row)?;
        }
        writer.flush()?;

        self.write_incomplete_days(dataset, &artifacts.funding_incomplete)?;

        let mut writer = csv::Writer::from_path(&artifacts.anomalies)?;
        for row in &self.anomalies {
            writer.serialize(row)?;
        }
        writer.flush()?;

        write_log_prices(dataset, &artifacts.log_price)?;
        Ok(artifacts)
    }

    fn write_summary(&self, path: &Path) -> Result<()> {
        let s = &self.summary;
        let mut header = vec![
            "start".to_string(),
            "end".to_string(),
            "rows".to_string(),
            "tz".to_string(),
            "dup_index".to_string(),
            "missing_ratio_max".to_string(),
        ];
        let mut record = vec![
            cell(s.start.as_ref().map(format_ts)),
            cell(s.end.as_ref().map(format_ts)),
            s.rows.to_string(),
            s.timezone.clone(),
            s.duplicate_timestamps.to_string(),
            cell(s.missing_ratio_max),
        ];
        for (prefix, days) in &s.incomplete_days {
            header.push(format!("{}_funding_incomplete_days", prefix));
            record.push(days.to_string());
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&header)?;
        writer.write_record(&record)?;
        writer.flush()?;
        Ok(())
    }

    fn write_incomplete_days(&self, dataset: &PairedDataset, path: &Path) -> Result<()> {
        let mut header = vec!["timestamp".to_string()];
        for suffix in ["funding_incomplete", "funding_events", "daily_funding_sum"] {
            for prefix in dataset.prefixes() {
                header.push(column_name(prefix, suffix));
            }
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&header)?;
        for row in &self.incomplete_days {
            let mut record = vec![format_ts(&row.timestamp)];
            record.extend(row.instruments.iter().map(|c| cell(c.incomplete)));
            record.extend(row.instruments.iter().map(|c| cell(c.events)));
            record.extend(row.instruments.iter().map(|c| cell(c.sum)));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Timestamp plus `{P}_log` of every instrument, the input of an external chart.
fn write_log_prices(dataset: &PairedDataset, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["timestamp".to_string()];
    header.extend(dataset.prefixes().iter().map(|p| column_name(p, "log")));
    writer.write_record(&header)?;

    for (i, ts) in dataset.timestamps.iter().enumerate() {
        let mut record = vec![format_ts(ts)];
        record.extend(dataset.instruments.iter().map(|inst| cell(at(&inst.log, i))));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read the dataset at `input`, write the report into `out_dir` and log its findings.
pub fn run_report(input: &Path, out_dir: &Path) -> Result<ValidationReport> {
    let dataset = read_dataset(input)?;
    let report = ValidationReport::build(&dataset);
    let artifacts = report.write_artifacts(&dataset, out_dir)?;

    info!(
        "report for {} rows ({} .. {}) written to {}",
        report.summary.rows,
        cell(report.summary.start.as_ref().map(format_ts)),
        cell(report.summary.end.as_ref().map(format_ts)),
        out_dir.display()
    );
    info!("summary: {}", artifacts.summary.display());
    log_acceptance(&report.acceptance);
    for finding in &report.findings {
        warn!("finding: {}", finding);
    }
    Ok(report)
}
