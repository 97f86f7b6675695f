//! # Funding guardrail and daily resampler
//!
//! Funding settles several times per day while candles are daily. This module screens raw
//! settlements against an absolute-rate cap and folds the survivors into one
//! [`DailyFundingAggregate`] per UTC day.
//!
//! ## Guardrail
//!
//! A rate with `|rate| > abs_cap` is treated as a data error, not as an extreme market. The
//! event is kept (its timestamp still shows the settlement happened) but its rate is
//! absent for aggregation, so it neither adds to the sum nor counts as a valid event.
//! A NaN rate is treated as missing and an infinite one as an outlier.
//!
//! ## Resampling
//!
//! Bins are left-closed UTC days. Every day between the first and the last settlement gets
//! a bin, including days without any valid event:
//!
//! | field        | value                                   |
//! |--------------|-----------------------------------------|
//! | `sum`        | sum of valid rates, `0.0` when none     |
//! | `events`     | number of valid rates                   |
//! | `mean`       | `sum / events`, absent when `events==0` |
//! | `incomplete` | `events != expected_events_per_day`     |
//!
//! Both steps are pure: the same input always yields the same output.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::FundingConfig;
use crate::data::{day_start, FundingEvent, TimeKeyed};

/// A funding settlement after the guardrail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenedFunding {
    pub timestamp: DateTime<Utc>,
    /// Rate as reported by the exchange
    pub raw_rate: Option<f64>,
    /// Rate used for aggregation, absent when missing or beyond the cap
    pub valid_rate: Option<f64>,
}

impl TimeKeyed for ScreenedFunding {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Result of screening a funding series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardrailOutcome {
    pub events: Vec<ScreenedFunding>,
    /// Events whose rate exceeded the cap
    pub outliers: usize,
    /// Events whose rate was missing or NaN before screening
    pub missing: usize,
}

/// Mark every rate with `|rate| > abs_cap`, and every NaN rate, as absent.
pub fn apply_guardrail(events: &[FundingEvent], abs_cap: f64) -> GuardrailOutcome {
    let mut outcome = GuardrailOutcome {
        events: Vec::with_capacity(events.len()),
        ..GuardrailOutcome::default()
    };

    for event in events {
        let valid_rate = match event.rate {
            Some(rate) if rate.abs() > abs_cap => {
                outcome.outliers += 1;
                None
            }
            Some(rate) if !rate.is_nan() => Some(rate),
            _ => {
                outcome.missing += 1;
                None
            }
        };
        outcome.events.push(ScreenedFunding {
            timestamp: event.timestamp,
            raw_rate: event.rate,
            valid_rate,
        });
    }
    outcome
}

/// Funding statistics of one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyFundingAggregate {
    /// UTC midnight
    pub day: DateTime<Utc>,
    pub sum: f64,
    pub events: u32,
    pub mean: Option<f64>,
    pub incomplete: bool,
}

impl TimeKeyed for DailyFundingAggregate {
    fn timestamp(&self) -> DateTime<Utc> {
        self.day
    }
}

/// Fold screened settlements into daily bins, see the module docs for the rules.
pub fn resample_daily(
    events: &[ScreenedFunding],
    expected_events_per_day: u32,
) -> Vec<DailyFundingAggregate> {
    let mut bins: BTreeMap<DateTime<Utc>, (f64, u32)> = BTreeMap::new();
    for event in events {
        let bin = bins.entry(day_start(event.timestamp)).or_insert((0.0, 0));
        if let Some(rate) = event.valid_rate {
            bin.0 += rate;
            bin.1 += 1;
        }
    }

    let (Some(&first), Some(&last)) = (bins.keys().next(), bins.keys().next_back()) else {
        return Vec::new();
    };

    let mut daily = Vec::with_capacity(bins.len());
    let mut day = first;
    while day <= last {
        let (sum, events) = bins.get(&day).copied().unwrap_or((0.0, 0));
        daily.push(DailyFundingAggregate {
            day,
            sum,
            events,
            mean: (events > 0).then(|| sum / f64::from(events)),
            incomplete: events != expected_events_per_day,
        });
        day += Duration::days(1);
    }
    daily
}

/// Guardrail followed by daily resampling for one instrument, with logging.
pub fn aggregate_funding(
    symbol: &str,
    events: &[FundingEvent],
    config: &FundingConfig,
) -> Vec<DailyFundingAggregate> {
    if events.is_empty() {
        warn!("[{}] no funding history returned, daily funding will be empty", symbol);
        return Vec::new();
    }

    let screened = apply_guardrail(events, config.abs_cap);
    if screened.outliers > 0 {
        warn!(
            "[{}] {} funding rates beyond |{}| excluded from daily sums",
            symbol, screened.outliers, config.abs_cap
        );
    }
    if screened.missing > 0 {
        warn!("[{}] {} funding rates missing", symbol, screened.missing);
    }

    let daily = resample_daily(&screened.events, config.expected_events_per_day);
    let incomplete = daily.iter().filter(|d| d.incomplete).count();
    info!(
        "[{}] {} funding events resampled into {} days ({} incomplete)",
        symbol,
        events.len(),
        daily.len(),
        incomplete
    );
    daily
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn outlier_keeps_its_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let outcome = apply_guardrail(&[FundingEvent::new(ts, 0.5)], 0.01);
        assert_eq!(outcome.outliers, 1);
        assert_eq!(outcome.events[0].timestamp, ts);
        assert_eq!(outcome.events[0].raw_rate, Some(0.5));
        assert_eq!(outcome.events[0].valid_rate, None);
    }

    #[test]
    fn rate_exactly_at_cap_is_valid() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let outcome = apply_guardrail(&[FundingEvent::new(ts, -0.01)], 0.01);
        assert_eq!(outcome.outliers, 0);
        assert_eq!(outcome.events[0].valid_rate, Some(-0.01));
    }

    #[test]
    fn non_finite_rates_are_screened_out() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let events = [
            FundingEvent::new(ts, f64::NAN),
            FundingEvent::new(ts + Duration::hours(8), f64::INFINITY),
            FundingEvent::new(ts + Duration::hours(16), f64::NEG_INFINITY),
        ];
        let outcome = apply_guardrail(&events, 0.01);
        assert_eq!(outcome.missing, 1);
        assert_eq!(outcome.outliers, 2);
        assert!(outcome.events.iter().all(|e| e.valid_rate.is_none()));
    }

    #[test]
    fn empty_input_resamples_to_nothing() {
        assert!(resample_daily(&[], 3).is_empty());
        assert!(aggregate_funding("ETH", &[], &FundingConfig::default()).is_empty());
    }
}
