//! Perpetual-futures pair dataset builder.
//!
//! Pulls daily candles and funding history for two or more perpetual contracts, screens
//! funding outliers, resamples funding to UTC days, joins everything on a common daily
//! index and persists the result as Parquet. A [`ValidationReport`](report::ValidationReport)
//! summarises the quality of the persisted dataset.
//!
//! The stages can be used on their own:
//! [`PaginatedFetcher`](fetcher::PaginatedFetcher) →
//! [`aggregate_funding`](funding::aggregate_funding) /
//! [`drop_unclosed_last_bar`](candles::drop_unclosed_last_bar) →
//! [`merge_instrument`](merge::merge_instrument) →
//! [`align_instruments`](align::align_instruments) →
//! [`write_dataset`](store::write_dataset), or all at once through
//! [`DatasetPipeline`](pipeline::DatasetPipeline).

pub mod align;
pub mod candles;
pub mod config;
pub mod data;
pub mod errors;
pub mod fetcher;
pub mod funding;
pub mod merge;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod source;
pub mod store;


/// Convenient re-export of the most common items.
pub mod prelude {
    pub use crate::align::{align_instruments, InstrumentColumns, PairedDataset};
    pub use crate::config::{FetchConfig, FundingConfig, InstrumentSpec, PipelineConfig};
    pub use crate::data::{Candle, FundingEvent, Resolution};
    pub use crate::errors::{PairDatasetError, Result};
    pub use crate::fetcher::PaginatedFetcher;
    pub use crate::funding::{aggregate_funding, DailyFundingAggregate};
    pub use crate::merge::{merge_instrument, InstrumentFrame};
    pub use crate::pipeline::{DatasetPipeline, PipelineOutcome};
    pub use crate::report::{run_report, ValidationReport};
    pub use crate::retry::RetryPolicy;
    pub use crate::source::{HyperliquidSource, MarketDataSource};
    pub use crate::store::{read_dataset, write_dataset};
}
