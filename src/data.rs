//! # Market data primitives
//!
//! Raw observations as they come back from a [`MarketDataSource`](crate::source::MarketDataSource):
//! OHLCV [`Candle`]s and sub-daily [`FundingEvent`]s, both keyed by a UTC timestamp.
//!
//! ## Timestamps
//!
//! Every observation carries a `DateTime<Utc>`. Raw fetch results keep the millisecond
//! resolution reported by the exchange; daily products (funding aggregates, joined frames)
//! are keyed by UTC midnight, see [`day_start`].
//!
//! ## Missing values
//!
//! A funding rate the exchange reported but that could not be parsed is stored as `None`.
//! It is never turned into `0.0`: absent values must not contribute to any sum.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{PairDatasetError, Result};

/// Observation that is keyed by a UTC timestamp.
pub trait TimeKeyed {
    /// Timestamp of the observation.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Candle resolution understood by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Minute1,
    Minute5,
    Minute15,
    Hour1,
    Hour4,
    Day1,
}

impl Resolution {
    /// All supported resolutions, finest first.
    pub fn all() -> &'static [Resolution] {
        &[
            Resolution::Minute1,
            Resolution::Minute5,
            Resolution::Minute15,
            Resolution::Hour1,
            Resolution::Hour4,
            Resolution::Day1,
        ]
    }

    /// Exchange notation ("1m", "1h", "1d", ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Minute1 => "1m",
            Resolution::Minute5 => "5m",
            Resolution::Minute15 => "15m",
            Resolution::Hour1 => "1h",
            Resolution::Hour4 => "4h",
            Resolution::Day1 => "1d",
        }
    }

    /// Length of one bar.
    pub fn duration(&self) -> Duration {
        match self {
            Resolution::Minute1 => Duration::minutes(1),
            Resolution::Minute5 => Duration::minutes(5),
            Resolution::Minute15 => Duration::minutes(15),
            Resolution::Hour1 => Duration::hours(1),
            Resolution::Hour4 => Duration::hours(4),
            Resolution::Day1 => Duration::days(1),
        }
    }

    /// Start of the bar that contains `ts`.
    pub fn bar_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        // Bars are aligned on the Unix epoch, which is also UTC midnight.
        ts.duration_trunc(self.duration()).unwrap_or(ts)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = PairDatasetError;

    fn from_str(s: &str) -> Result<Self> {
        Resolution::all()
            .iter()
            .copied()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| PairDatasetError::unsupported_resolution(s))
    }
}

impl Serialize for Resolution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Resolution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A single OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl TimeKeyed for Candle {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A funding settlement reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingEvent {
    /// Settlement time
    pub timestamp: DateTime<Utc>,
    /// Funding rate for the interval, `None` when the exchange value was unusable
    pub rate: Option<f64>,
}

impl FundingEvent {
    pub fn new(timestamp: DateTime<Utc>, rate: f64) -> Self {
        Self {
            timestamp,
            rate: Some(rate),
        }
    }
}

impl TimeKeyed for FundingEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// UTC midnight of the day containing `ts`.
pub fn day_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    Resolution::Day1.bar_start(ts)
}

/// Convert exchange milliseconds to a UTC timestamp.
pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| PairDatasetError::data_conversion(format!("Invalid timestamp {} ms", ms)))
}

/// Parse a history start such as `2022-01-01 00:00:00`, `2022-01-01` or an RFC 3339 string.
/// Naive inputs are interpreted as UTC.
pub fn parse_start(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| PairDatasetError::data_conversion(format!("Invalid date {}", raw)))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

/// Check that a series is strictly increasing in time.
pub fn ensure_strictly_increasing<T: TimeKeyed>(series: &[T], label: &str) -> Result<()> {
    for (i, pair) in series.windows(2).enumerate() {
        if pair[1].timestamp() <= pair[0].timestamp() {
            return Err(PairDatasetError::data_integrity(format!(
                "{} not strictly increasing at indices {} and {} ({} -> {})",
                label,
                i,
                i + 1,
                pair[0].timestamp(),
                pair[1].timestamp()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_round_trips_through_strings() {
        for resolution in Resolution::all() {
            assert_eq!(resolution.as_str().parse::<Resolution>().unwrap(), *resolution);
        }
        assert!(matches!(
            "2d".parse::<Resolution>(),
            Err(PairDatasetError::UnsupportedResolution(_))
        ));
    }

    #[test]
    fn bar_start_floors_to_utc_boundaries() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 17, 42, 9).unwrap();
        assert_eq!(
            Resolution::Day1.bar_start(ts),
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()
        );
        assert_eq!(
            Resolution::Hour4.bar_start(ts),
            Utc.with_ymd_and_hms(2024, 3, 5, 16, 0, 0).unwrap()
        );
    }

    #[test]
    fn parse_start_accepts_common_layouts() {
        let expected = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_start("2022-01-01 00:00:00").unwrap(), expected);
        assert_eq!(parse_start("2022-01-01").unwrap(), expected);
        assert_eq!(parse_start("2022-01-01T00:00:00Z").unwrap(), expected);
        assert!(parse_start("first of january").is_err());
    }

    #[test]
    fn strictly_increasing_check_flags_duplicates() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let events = vec![FundingEvent::new(ts, 0.0001), FundingEvent::new(ts, 0.0002)];
        assert!(matches!(
            ensure_strictly_increasing(&events, "funding"),
            Err(PairDatasetError::DataIntegrity(_))
        ));
    }
}
