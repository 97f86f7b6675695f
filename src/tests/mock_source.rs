//! In-memory market data source and data generators for testing

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::data::{Candle, FundingEvent, Resolution};
use crate::errors::{PairDatasetError, Result};
use crate::source::MarketDataSource;

/// UTC midnight of 2024-01-`day` (day may overflow into following months).
pub fn day(day: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day - 1)
}

/// Daily candles for days `first..=last` with a slowly rising close.
pub fn daily_candles(first: i64, last: i64, base: f64) -> Vec<Candle> {
    (first..=last)
        .map(|d| {
            let close = base + d as f64;
            Candle {
                timestamp: day(d),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000.0 + d as f64,
            }
        })
        .collect()
}

/// `per_day` funding settlements per day for days `first..=last`, all with `rate`.
pub fn funding_events(first: i64, last: i64, per_day: u32, rate: f64) -> Vec<FundingEvent> {
    let step = Duration::hours(24 / i64::from(per_day.max(1)));
    (first..=last)
        .flat_map(|d| (0..per_day).map(move |i| FundingEvent::new(day(d) + step * i as i32, rate)))
        .collect()
}

/// Serves fixed candles and funding per symbol, page by page.
///
/// Scripted errors are returned, in order, before any data call succeeds. With
/// `overlap` set, every page starts that far before the requested cursor so consecutive
/// pages repeat rows.
#[derive(Default)]
pub struct MockSource {
    candles: HashMap<String, Vec<Candle>>,
    funding: HashMap<String, Vec<FundingEvent>>,
    failures: Mutex<VecDeque<PairDatasetError>>,
    overlap: Option<Duration>,
    max_funding_page: Option<usize>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.candles.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_funding(mut self, symbol: &str, events: Vec<FundingEvent>) -> Self {
        self.funding.insert(symbol.to_string(), events);
        self
    }

    pub fn with_failures(self, failures: Vec<PairDatasetError>) -> Self {
        *self.failures.lock().unwrap() = failures.into();
        self
    }

    pub fn with_overlap(mut self, overlap: Duration) -> Self {
        self.overlap = Some(overlap);
        self
    }

    pub fn with_max_funding_page(mut self, max: usize) -> Self {
        self.max_funding_page = Some(max);
        self
    }

    /// Number of page requests served, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_failure(&self) -> Option<PairDatasetError> {
        self.failures.lock().unwrap().pop_front()
    }

    fn page<T: Copy>(
        &self,
        rows: Option<&Vec<T>>,
        ts: impl Fn(&T) -> DateTime<Utc>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        let from = since - self.overlap.unwrap_or_else(Duration::zero);
        Ok(rows
            .map(|rows| {
                rows.iter()
                    .filter(|r| ts(*r) >= from)
                    .take(limit)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl MarketDataSource for MockSource {
    async fn fetch_candles(
        &self,
        symbol: &str,
        _resolution: Resolution,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        self.page(self.candles.get(symbol), |c| c.timestamp, since, limit)
    }

    async fn fetch_funding_history(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FundingEvent>> {
        self.page(self.funding.get(symbol), |e| e.timestamp, since, limit)
    }

    fn max_funding_page(&self) -> Option<usize> {
        self.max_funding_page
    }
}
