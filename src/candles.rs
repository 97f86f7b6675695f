//! Candle finalizer.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::data::{Candle, Resolution};

/// Drop the last candle when it is the bar still being traded at `now`.
///
/// Only the final bar is inspected. Earlier bars are closed by construction and an empty
/// series is returned unchanged.
pub fn drop_unclosed_last_bar(
    mut candles: Vec<Candle>,
    resolution: Resolution,
    now: DateTime<Utc>,
) -> Vec<Candle> {
    let current_bar = resolution.bar_start(now);
    if candles.last().is_some_and(|c| c.timestamp == current_bar) {
        debug!("dropping unclosed {} bar opened at {}", resolution, current_bar);
        candles.pop();
    }
    candles
}

/// `true` when every bar opens on a boundary of `resolution`.
pub fn is_aligned(candles: &[Candle], resolution: Resolution) -> bool {
    candles
        .iter()
        .all(|c| resolution.bar_start(c.timestamp) == c.timestamp)
}
