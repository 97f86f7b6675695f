//! Paginated series fetcher.
//!
//! Drives a [`MarketDataSource`] page by page from a start timestamp up to the live edge:
//!
//! 1. request a page of at most `page_size` observations at the cursor;
//! 2. move the cursor one millisecond past the last observation returned;
//! 3. stop when a page is empty or shorter than `page_size`.
//!
//! Transient errors are retried at the same cursor according to the injected
//! [`RetryPolicy`]. Once all pages are collected the series is deduplicated by timestamp
//! (first occurrence wins) and sorted ascending, so overlapping pages never double count.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::data::{Candle, FundingEvent, Resolution, TimeKeyed};
use crate::errors::{PairDatasetError, Result};
use crate::retry::RetryPolicy;
use crate::source::MarketDataSource;

/// Pagination driver around a [`MarketDataSource`].
pub struct PaginatedFetcher<S> {
    source: S,
    retry: RetryPolicy,
}

impl<S: MarketDataSource> PaginatedFetcher<S> {
    pub fn new(source: S, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// Borrow the underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// All candles of `symbol` from `start` to the live edge.
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
        page_size: usize,
    ) -> Result<Vec<Candle>> {
        let page_size = effective_page_size(page_size, self.source.max_candle_page());
        let label = format!("candles {} {}", symbol, resolution);
        let source = &self.source;
        paginate(&label, start, page_size, &self.retry, |cursor| {
            source.fetch_candles(symbol, resolution, cursor, page_size)
        })
        .await
    }

    /// All funding settlements of `symbol` from `start` to the live edge.
    pub async fn fetch_funding(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        page_size: usize,
    ) -> Result<Vec<FundingEvent>> {
        let page_size = effective_page_size(page_size, self.source.max_funding_page());
        let label = format!("funding {}", symbol);
        let source = &self.source;
        paginate(&label, start, page_size, &self.retry, |cursor| {
            source.fetch_funding_history(symbol, cursor, page_size)
        })
        .await
    }
}

/// Never ask for more than the source can deliver, otherwise a capped page would look
/// like the live edge.
pub fn effective_page_size(requested: usize, source_max: Option<usize>) -> usize {
    let capped = match source_max {
        Some(max) => requested.min(max),
        None => requested,
    };
    capped.max(1)
}

/// Generic pagination loop shared by every series type.
pub async fn paginate<T, F, Fut>(
    label: &str,
    start: DateTime<Utc>,
    page_size: usize,
    retry: &RetryPolicy,
    mut fetch_page: F,
) -> Result<Vec<T>>
where
    T: TimeKeyed,
    F: FnMut(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut cursor = start;
    let mut collected: Vec<T> = Vec::new();
    let mut pages = 0usize;

    loop {
        let page = fetch_with_retry(label, cursor, retry, &mut fetch_page).await?;
        pages += 1;

        let Some(last) = page.last().map(TimeKeyed::timestamp) else {
            break;
        };
        let page_len = page.len();
        collected.extend(page);
        info!(
            "[{}] page {} fetched up to {} | {} rows accumulated",
            label,
            pages,
            last.format("%Y-%m-%d"),
            collected.len()
        );

        if page_len < page_size {
            break;
        }

        let next = last + Duration::milliseconds(1);
        if next <= cursor {
            warn!(
                "[{}] cursor did not advance past {} (last row {}), stopping pagination",
                label, cursor, last
            );
            break;
        }
        cursor = next;
    }

    let fetched = collected.len();
    let series = dedup_sorted(collected);
    if series.len() < fetched {
        debug!(
            "[{}] dropped {} duplicate rows from overlapping pages",
            label,
            fetched - series.len()
        );
    }
    Ok(series)
}

async fn fetch_with_retry<T, F, Fut>(
    label: &str,
    cursor: DateTime<Utc>,
    retry: &RetryPolicy,
    fetch_page: &mut F,
) -> Result<Vec<T>>
where
    F: FnMut(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut failures = 0u32;
    loop {
        match fetch_page(cursor).await {
            Ok(page) => return Ok(page),
            Err(err) if err.is_transient() => {
                failures = failures.saturating_add(1);
                if !retry.allows_retry(failures) {
                    return Err(PairDatasetError::RetryExhausted {
                        operation: format!("{} at {}", label, cursor),
                        attempts: failures,
                        last_error: Box::new(err),
                    });
                }
                let delay = retry.delay_for(failures);
                warn!(
                    "[{}] transient error at cursor {} (attempt {}): {}; retrying in {:?}",
                    label, cursor, failures, err, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Keep the first observation per timestamp and return them in ascending order.
pub fn dedup_sorted<T: TimeKeyed>(rows: Vec<T>) -> Vec<T> {
    let mut by_time: BTreeMap<DateTime<Utc>, T> = BTreeMap::new();
    for row in rows {
        if let Entry::Vacant(slot) = by_time.entry(row.timestamp()) {
            slot.insert(row);
        }
    }
    by_time.into_values().collect()
}
