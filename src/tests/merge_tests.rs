use chrono::{Duration, Utc};

use super::mock_source::{daily_candles, day, funding_events};
use crate::candles::{drop_unclosed_last_bar, is_aligned};
use crate::config::FundingConfig;
use crate::data::Resolution;
use crate::errors::PairDatasetError;
use crate::funding::aggregate_funding;
use crate::merge::merge_instrument;

#[test]
fn finalizer_drops_todays_bar() {
    let candles = daily_candles(1, 5, 100.0);
    let now = day(5) + Duration::hours(13);

    let finalized = drop_unclosed_last_bar(candles, Resolution::Day1, now);

    assert_eq!(finalized.len(), 4);
    assert_eq!(finalized.last().unwrap().timestamp, day(4));
}

#[test]
fn finalizer_keeps_closed_history() {
    let candles = daily_candles(1, 5, 100.0);
    let now = day(6) + Duration::minutes(1);

    let finalized = drop_unclosed_last_bar(candles.clone(), Resolution::Day1, now);

    assert_eq!(finalized, candles);
}

#[test]
fn finalizer_accepts_empty_series() {
    assert!(drop_unclosed_last_bar(Vec::new(), Resolution::Day1, Utc::now()).is_empty());
}

#[test]
fn daily_candles_are_aligned() {
    let mut candles = daily_candles(1, 3, 100.0);
    assert!(is_aligned(&candles, Resolution::Day1));
    candles[1].timestamp += Duration::hours(1);
    assert!(!is_aligned(&candles, Resolution::Day1));
}

#[test]
fn left_join_keeps_every_candle_and_fills_funding() {
    let candles = daily_candles(1, 5, 100.0);
    let daily = aggregate_funding("ETH", &funding_events(2, 3, 3, 0.0001), &FundingConfig::default());

    let frame = merge_instrument("ETH", &candles, &daily).unwrap();

    assert_eq!(frame.prefix, "ETH");
    assert_eq!(frame.len(), 5);

    let unmatched = &frame.rows[0];
    assert_eq!(unmatched.timestamp, day(1));
    assert_eq!(unmatched.daily_funding_sum, 0.0);
    assert_eq!(unmatched.funding_events, 0);
    assert!(unmatched.funding_incomplete);
    assert_eq!(unmatched.daily_funding_mean, None);
    assert_eq!(unmatched.close, candles[0].close);

    let matched = &frame.rows[1];
    assert_eq!(matched.funding_events, 3);
    assert!(!matched.funding_incomplete);
    assert!((matched.daily_funding_sum - 0.0003).abs() < 1e-12);
    assert!(matched.daily_funding_mean.is_some());
}

#[test]
fn funding_without_candles_is_discarded() {
    let candles = daily_candles(3, 4, 100.0);
    let daily = aggregate_funding("ETH", &funding_events(1, 6, 3, 0.0001), &FundingConfig::default());

    let frame = merge_instrument("ETH", &candles, &daily).unwrap();

    assert_eq!(frame.len(), 2);
    assert_eq!(frame.rows[0].timestamp, day(3));
}

#[test]
fn empty_funding_marks_every_row_incomplete() {
    let frame = merge_instrument("SOL", &daily_candles(1, 3, 20.0), &[]).unwrap();

    assert!(frame.rows.iter().all(|r| r.funding_incomplete && r.funding_events == 0));
}

#[test]
fn unsorted_candles_are_rejected() {
    let mut candles = daily_candles(1, 3, 100.0);
    candles.swap(0, 2);

    let err = merge_instrument("ETH", &candles, &[]).unwrap_err();

    assert!(matches!(err, PairDatasetError::DataIntegrity(_)));
}
