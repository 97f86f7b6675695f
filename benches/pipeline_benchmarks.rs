//! Performance benchmarks for the dataset stages
//!
//! Measures funding resampling and the multi-instrument inner join on synthetic
//! histories of increasing length.

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use perp_pair_dataset::prelude::*;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

/// Hourly funding settlements over `days` days
fn create_funding(days: usize) -> Vec<FundingEvent> {
    (0..days * 24)
        .map(|i| {
            let rate = 0.00001 + (i as f64 * 0.01).sin() * 0.00002;
            FundingEvent::new(epoch() + Duration::hours(i as i64), rate)
        })
        .collect()
}

/// Daily candles over `days` days, starting `offset` days after the epoch
fn create_candles(days: usize, offset: i64) -> Vec<Candle> {
    (0..days)
        .map(|i| {
            let close = 2000.0 + (i as f64 * 0.1).sin() * 100.0;
            Candle {
                timestamp: epoch() + Duration::days(offset + i as i64),
                open: close - 5.0,
                high: close + 20.0,
                low: close - 20.0,
                close,
                volume: 1_000.0,
            }
        })
        .collect()
}

fn bench_funding_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("funding_resample");
    let config = FundingConfig {
        expected_events_per_day: 24,
        ..FundingConfig::default()
    };

    for days in [30, 365, 1825].iter() {
        let events = create_funding(*days);
        group.bench_with_input(BenchmarkId::new("aggregate_funding", days), days, |b, _| {
            b.iter(|| black_box(aggregate_funding("ETH", &events, &config)))
        });
    }

    group.finish();
}

fn bench_align(c: &mut Criterion) {
    let mut group = c.benchmark_group("align");

    for days in [365, 1825, 3650].iter() {
        let frames = vec![
            merge_instrument("ETH", &create_candles(*days, 0), &[]).unwrap(),
            merge_instrument("SOL", &create_candles(*days, 30), &[]).unwrap(),
        ];
        group.bench_with_input(BenchmarkId::new("align_instruments", days), days, |b, _| {
            b.iter(|| black_box(align_instruments(&frames).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_funding_resample, bench_align);
criterion_main!(benches);
