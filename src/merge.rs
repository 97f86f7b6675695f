//! Per-instrument merge of finalized candles with daily funding.
//!
//! The candle series is authoritative: every candle row survives. Funding columns are
//! filled only where the funding side has no bin for the candle's day:
//!
//! - `daily_funding_sum` becomes `0.0`
//! - `funding_events` becomes `0`
//! - `funding_incomplete` becomes `true`
//!
//! `daily_funding_mean` stays absent. Nothing else is filled.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{ensure_strictly_increasing, Candle, TimeKeyed};
use crate::errors::Result;
use crate::funding::DailyFundingAggregate;

/// One joined row of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRow {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub daily_funding_sum: f64,
    pub funding_events: u32,
    pub daily_funding_mean: Option<f64>,
    pub funding_incomplete: bool,
}

impl TimeKeyed for InstrumentRow {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Candles and funding of one instrument, ready to be aligned with others.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentFrame {
    pub prefix: String,
    pub rows: Vec<InstrumentRow>,
}

impl InstrumentFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Left-join `candles` with `funding` on the exact timestamp.
pub fn merge_instrument(
    prefix: &str,
    candles: &[Candle],
    funding: &[DailyFundingAggregate],
) -> Result<InstrumentFrame> {
    ensure_strictly_increasing(candles, &format!("{} candles", prefix))?;
    ensure_strictly_increasing(funding, &format!("{} daily funding", prefix))?;

    let by_day: HashMap<DateTime<Utc>, &DailyFundingAggregate> =
        funding.iter().map(|f| (f.day, f)).collect();

    let rows: Vec<InstrumentRow> = candles
        .iter()
        .map(|c| {
            let agg = by_day.get(&c.timestamp);
            InstrumentRow {
                timestamp: c.timestamp,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
                daily_funding_sum: agg.map_or(0.0, |a| a.sum),
                funding_events: agg.map_or(0, |a| a.events),
                daily_funding_mean: agg.and_then(|a| a.mean),
                funding_incomplete: agg.map_or(true, |a| a.incomplete),
            }
        })
        .collect();

    let matched = candles.iter().filter(|c| by_day.contains_key(&c.timestamp)).count();
    debug!(
        "[{}] merged {} candles, {} with a funding bin",
        prefix,
        rows.len(),
        matched
    );

    Ok(InstrumentFrame {
        prefix: prefix.to_string(),
        rows,
    })
}
