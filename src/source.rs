//! Exchange connectivity.
//!
//! [`MarketDataSource`] is the seam between the pipeline and an exchange: one call returns
//! one bounded page of observations starting at a cursor. Pagination, retries and
//! deduplication are the job of the [`PaginatedFetcher`](crate::fetcher::PaginatedFetcher).
//!
//! [`HyperliquidSource`] implements the trait on top of the Hyperliquid info API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::data::{from_millis, Candle, FundingEvent, Resolution};
use crate::errors::{PairDatasetError, Result};

/// Page-oriented access to historical candles and funding settlements.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Up to `limit` candles with open time `>= since`, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: Resolution,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// Up to `limit` funding settlements at or after `since`, oldest first.
    async fn fetch_funding_history(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FundingEvent>>;

    /// Largest candle page the source can return in one call.
    fn max_candle_page(&self) -> Option<usize> {
        None
    }

    /// Largest funding page the source can return in one call.
    fn max_funding_page(&self) -> Option<usize> {
        None
    }
}

/// Hyperliquid returns at most this many candles per snapshot request.
pub const HYPERLIQUID_MAX_CANDLES: usize = 5000;
/// Hyperliquid returns at most this many funding entries per request.
pub const HYPERLIQUID_MAX_FUNDING: usize = 500;
/// Hyperliquid settles funding every hour.
pub const HYPERLIQUID_FUNDING_EVENTS_PER_DAY: u32 = 24;

/// [`MarketDataSource`] backed by the Hyperliquid info endpoint.
pub struct HyperliquidSource {
    info_client: hyperliquid_rust_sdk::InfoClient,
}

impl HyperliquidSource {
    /// Connect to Hyperliquid mainnet.
    pub async fn mainnet() -> Result<Self> {
        Self::connect(hyperliquid_rust_sdk::BaseUrl::Mainnet).await
    }

    pub async fn connect(base_url: hyperliquid_rust_sdk::BaseUrl) -> Result<Self> {
        let info_client = hyperliquid_rust_sdk::InfoClient::new(None, Some(base_url)).await?;
        Ok(Self { info_client })
    }
}

#[async_trait]
impl MarketDataSource for HyperliquidSource {
    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: Resolution,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let start_ms = non_negative_millis(since)?;
        let end_ms = non_negative_millis(Utc::now())?;
        if start_ms >= end_ms {
            return Ok(Vec::new());
        }

        let snapshot = self
            .info_client
            .candles_snapshot(
                symbol.to_string(),
                resolution.as_str().to_string(),
                start_ms,
                end_ms,
            )
            .await?;
        debug!(symbol, resolution = %resolution, rows = snapshot.len(), "candle snapshot received");

        let mut candles = convert_candles(&snapshot)?;
        candles.truncate(limit);
        Ok(candles)
    }

    async fn fetch_funding_history(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FundingEvent>> {
        let start_ms = non_negative_millis(since)?;
        let history = self
            .info_client
            .funding_history(symbol.to_string(), start_ms, None)
            .await?;
        debug!(symbol, rows = history.len(), "funding history received");

        let mut events = convert_funding(&history)?;
        events.truncate(limit);
        Ok(events)
    }

    fn max_candle_page(&self) -> Option<usize> {
        Some(HYPERLIQUID_MAX_CANDLES)
    }

    fn max_funding_page(&self) -> Option<usize> {
        Some(HYPERLIQUID_MAX_FUNDING)
    }
}

fn non_negative_millis(ts: DateTime<Utc>) -> Result<u64> {
    u64::try_from(ts.timestamp_millis())
        .map_err(|_| PairDatasetError::validation(format!("Timestamp {} predates the epoch", ts)))
}

fn parse_price(raw: &str, field: &str, index: usize) -> Result<f64> {
    raw.parse::<f64>().map_err(|_| {
        PairDatasetError::data_conversion(format!("Invalid {} '{}' at index {}", field, raw, index))
    })
}

/// Convert a candle snapshot, rejecting any bar whose OHLCV strings do not parse.
pub fn convert_candles(
    snapshot: &[hyperliquid_rust_sdk::CandlesSnapshotResponse],
) -> Result<Vec<Candle>> {
    let mut candles = Vec::with_capacity(snapshot.len());
    for (i, candle) in snapshot.iter().enumerate() {
        if candle.time_open >= candle.time_close {
            return Err(PairDatasetError::validation(format!(
                "Invalid candle timestamps: open {} >= close {} at index {}",
                candle.time_open, candle.time_close, i
            )));
        }
        let time_open = i64::try_from(candle.time_open).map_err(|_| {
            PairDatasetError::data_conversion(format!("Invalid open time {}", candle.time_open))
        })?;
        candles.push(Candle {
            timestamp: from_millis(time_open)?,
            open: parse_price(&candle.open, "open price", i)?,
            high: parse_price(&candle.high, "high price", i)?,
            low: parse_price(&candle.low, "low price", i)?,
            close: parse_price(&candle.close, "close price", i)?,
            volume: parse_price(&candle.vlm, "volume", i)?,
        });
    }
    Ok(candles)
}

/// Convert funding history. A rate that does not parse is kept as an absent value.
pub fn convert_funding(
    history: &[hyperliquid_rust_sdk::FundingHistoryResponse],
) -> Result<Vec<FundingEvent>> {
    let mut events = Vec::with_capacity(history.len());
    for entry in history {
        let time = i64::try_from(entry.time).map_err(|_| {
            PairDatasetError::data_conversion(format!("Invalid funding time {}", entry.time))
        })?;
        let rate = match entry.funding_rate.trim().parse::<f64>() {
            Ok(rate) if rate.is_finite() => Some(rate),
            _ => {
                warn!(
                    coin = %entry.coin,
                    time = entry.time,
                    raw = %entry.funding_rate,
                    "unparsable funding rate kept as missing"
                );
                None
            }
        };
        events.push(FundingEvent {
            timestamp: from_millis(time)?,
            rate,
        });
    }
    Ok(events)
}
