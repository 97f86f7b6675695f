use chrono::Duration;
use proptest::prelude::*;

use super::mock_source::{daily_candles, day, funding_events, MockSource};
use crate::data::{ensure_strictly_increasing, Resolution};
use crate::errors::PairDatasetError;
use crate::fetcher::PaginatedFetcher;
use crate::retry::RetryPolicy;

fn fetcher(source: MockSource) -> PaginatedFetcher<MockSource> {
    PaginatedFetcher::new(source, RetryPolicy::immediate(None))
}

#[tokio::test]
async fn pages_through_the_whole_history() {
    let source = MockSource::new().with_candles("ETH", daily_candles(1, 25, 100.0));
    let fetcher = fetcher(source);

    let candles = fetcher
        .fetch_candles("ETH", Resolution::Day1, day(1), 10)
        .await
        .unwrap();

    assert_eq!(candles.len(), 25);
    assert_eq!(candles.first().unwrap().timestamp, day(1));
    assert_eq!(candles.last().unwrap().timestamp, day(25));
    // 10 + 10 + 5: the short third page ends pagination.
    assert_eq!(fetcher.source().calls(), 3);
}

#[tokio::test]
async fn exact_multiple_of_page_size_ends_on_empty_page() {
    let source = MockSource::new().with_candles("ETH", daily_candles(1, 20, 100.0));
    let fetcher = fetcher(source);

    let candles = fetcher
        .fetch_candles("ETH", Resolution::Day1, day(1), 10)
        .await
        .unwrap();

    assert_eq!(candles.len(), 20);
    assert_eq!(fetcher.source().calls(), 3);
}

#[tokio::test]
async fn empty_first_page_yields_empty_series() {
    let fetcher = fetcher(MockSource::new());

    let events = fetcher.fetch_funding("SOL", day(1), 1000).await.unwrap();

    assert!(events.is_empty());
    assert_eq!(fetcher.source().calls(), 1);
}

#[tokio::test]
async fn start_after_last_observation_yields_empty_series() {
    let source = MockSource::new().with_candles("ETH", daily_candles(1, 5, 100.0));
    let fetcher = fetcher(source);

    let candles = fetcher
        .fetch_candles("ETH", Resolution::Day1, day(30), 10)
        .await
        .unwrap();

    assert!(candles.is_empty());
}

#[tokio::test]
async fn overlapping_pages_are_deduplicated() {
    let source = MockSource::new()
        .with_funding("ETH", funding_events(1, 10, 3, 0.0001))
        .with_overlap(Duration::hours(20));
    let fetcher = fetcher(source);

    let events = fetcher.fetch_funding("ETH", day(1), 7).await.unwrap();

    assert_eq!(events.len(), 30);
    ensure_strictly_increasing(&events, "funding").unwrap();
}

#[tokio::test]
async fn transient_errors_are_retried_at_the_same_cursor() {
    let source = MockSource::new()
        .with_candles("ETH", daily_candles(1, 5, 100.0))
        .with_failures(vec![
            PairDatasetError::network("connection reset"),
            PairDatasetError::rate_limit("429"),
        ]);
    let fetcher = fetcher(source);

    let candles = fetcher
        .fetch_candles("ETH", Resolution::Day1, day(1), 10)
        .await
        .unwrap();

    assert_eq!(candles.len(), 5);
    assert_eq!(fetcher.source().calls(), 3);
}

#[tokio::test]
async fn bounded_retry_surfaces_retry_exhausted() {
    let source = MockSource::new()
        .with_candles("ETH", daily_candles(1, 5, 100.0))
        .with_failures(vec![
            PairDatasetError::network("down"),
            PairDatasetError::network("down"),
            PairDatasetError::network("still down"),
        ]);
    let fetcher = PaginatedFetcher::new(source, RetryPolicy::immediate(Some(3)));

    let err = fetcher
        .fetch_candles("ETH", Resolution::Day1, day(1), 10)
        .await
        .unwrap_err();

    match err {
        PairDatasetError::RetryExhausted {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.to_string().contains("still down"));
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let source = MockSource::new()
        .with_candles("ETH", daily_candles(1, 5, 100.0))
        .with_failures(vec![PairDatasetError::data_conversion("bad payload")]);
    let fetcher = fetcher(source);

    let err = fetcher
        .fetch_candles("ETH", Resolution::Day1, day(1), 10)
        .await
        .unwrap_err();

    assert!(matches!(err, PairDatasetError::DataConversion(_)));
    assert_eq!(fetcher.source().calls(), 1);
}

#[tokio::test]
async fn page_size_is_capped_by_the_source() {
    // A source capped at 4 rows per page must not end pagination after its first page.
    let source = MockSource::new()
        .with_funding("ETH", funding_events(1, 5, 3, 0.0001))
        .with_max_funding_page(4);
    let fetcher = fetcher(source);

    let events = fetcher.fetch_funding("ETH", day(1), 1000).await.unwrap();

    assert_eq!(events.len(), 15);
    assert_eq!(fetcher.source().calls(), 4);
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

    #[test]
    fn fetched_series_is_strictly_increasing_and_complete(
        days in 1i64..40,
        per_day in 1u32..5,
        page_size in 1usize..20,
        overlap_rows in 0usize..20,
    ) {
        // Repeat fewer rows than a page holds so every page makes progress.
        let step_hours = 24 / i64::from(per_day);
        let overlap = Duration::hours(step_hours * (overlap_rows % page_size) as i64);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let events = runtime.block_on(async move {
            let source = MockSource::new()
                .with_funding("ETH", funding_events(1, days, per_day, 0.0001))
                .with_overlap(overlap);
            fetcher(source).fetch_funding("ETH", day(1), page_size).await
        }).unwrap();

        prop_assert!(events.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        prop_assert_eq!(events.len() as i64, days * i64::from(per_day));
    }
}
