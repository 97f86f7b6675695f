//! End-to-end dataset build: fetch, clean, merge, align and persist.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::align::{align_instruments, PairedDataset};
use crate::candles::{drop_unclosed_last_bar, is_aligned};
use crate::config::{InstrumentSpec, PipelineConfig};
use crate::errors::Result;
use crate::fetcher::PaginatedFetcher;
use crate::funding::aggregate_funding;
use crate::merge::{merge_instrument, InstrumentFrame};
use crate::report::{funding_acceptance, log_acceptance};
use crate::source::MarketDataSource;
use crate::store::write_dataset;

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub dataset: PairedDataset,
    pub output_path: PathBuf,
}

/// Builds the aligned dataset for the configured instruments.
///
/// Instruments are processed one after another; a failure in any of them aborts the run
/// before anything is written.
pub struct DatasetPipeline<S> {
    config: PipelineConfig,
    fetcher: PaginatedFetcher<S>,
}

impl<S: MarketDataSource> DatasetPipeline<S> {
    pub fn new(config: PipelineConfig, source: S) -> Self {
        let fetcher = PaginatedFetcher::new(source, config.fetch.retry.clone());
        Self { config, fetcher }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        self.fetcher.source()
    }

    /// Run against the wall clock.
    pub async fn run(&self) -> Result<PipelineOutcome> {
        self.run_at(Utc::now()).await
    }

    /// Run as if the current time were `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<PipelineOutcome> {
        self.config.validate(now)?;
        self.config.prepare_output()?;
        let start = self.config.start_time()?;

        info!(
            "building {} dataset for {} instruments from {}",
            self.config.resolution,
            self.config.instruments.len(),
            start
        );

        let mut frames = Vec::with_capacity(self.config.instruments.len());
        for instrument in &self.config.instruments {
            frames.push(self.build_frame(instrument, start, now).await?);
        }

        let dataset = align_instruments(&frames)?;
        write_dataset(&dataset, &self.config.output_path)?;

        info!(
            "dataset saved to {} with {} rows",
            self.config.output_path.display(),
            dataset.len()
        );
        log_acceptance(&funding_acceptance(&dataset));

        Ok(PipelineOutcome {
            dataset,
            output_path: self.config.output_path.clone(),
        })
    }

    /// Fetch and merge one instrument.
    pub async fn build_frame(
        &self,
        instrument: &InstrumentSpec,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<InstrumentFrame> {
        let resolution = self.config.resolution;
        let fetch = &self.config.fetch;

        let candles = self
            .fetcher
            .fetch_candles(&instrument.symbol, resolution, start, fetch.candle_page_size)
            .await?;
        let candles = drop_unclosed_last_bar(candles, resolution, now);
        if candles.is_empty() {
            warn!("[{}] no closed {} candles since {}", instrument.prefix, resolution, start);
        } else if !is_aligned(&candles, resolution) {
            warn!(
                "[{}] candles are not aligned to {} boundaries, funding will not match",
                instrument.prefix, resolution
            );
        }

        let events = self
            .fetcher
            .fetch_funding(&instrument.symbol, start, fetch.funding_page_size)
            .await?;
        let daily = aggregate_funding(&instrument.symbol, &events, &self.config.funding);

        let frame = merge_instrument(&instrument.prefix, &candles, &daily)?;
        info!(
            "[{}] {} candles, {} funding events, {} funding days",
            instrument.prefix,
            candles.len(),
            events.len(),
            daily.len()
        );
        Ok(frame)
    }
}
