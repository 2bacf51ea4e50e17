//! octraffic-core — codebook-driven collision time-series aggregation
//! and statistical summaries.
//!
//! PIPELINE (one way, no cycles):
//!   raw tables + codebook
//!     → field classification (codebook)
//!     → temporal bucketing (bucket)
//!     → aggregation (aggregate, engine)
//!     → descriptive statistics (describe) and hypothesis tests (hypothesis)
//!     → summary-table assembly (summary)
//!     → external persistence/reporting (store, and collaborators beyond
//!       this crate).
//!
//! The engine is a pure batch computation: the codebook is loaded once
//! and read-only, every (entity, granularity) unit is independent, and
//! all I/O lives at the edges (dataset, store).

pub mod aggregate;
pub mod bucket;
pub mod codebook;
pub mod dataset;
pub mod describe;
pub mod engine;
pub mod error;
pub mod hypothesis;
pub mod record;
pub mod store;
pub mod summary;
pub mod synthetic;
pub mod types;

pub use aggregate::{aggregate, aggregate_all, AggregatedRow, AggregationOutcome, FieldAggregate};
pub use bucket::{bucket, Granularity, TimeBucket};
pub use codebook::{Codebook, CodebookEntry, FieldKind};
pub use describe::{summarize, summarize_by, StatSummary, OVERALL_LEVEL};
pub use engine::{TsBundle, TsEngine};
pub use error::{EngineError, EngineResult};
pub use hypothesis::{
    chi2_gof, chi2_gof_counts, chi2_independence, kruskal_wallis, p_value_display, TestKind,
    TestResult,
};
pub use record::{Entity, Record, RecordTable, Value, TIMESTAMP_FIELD};
pub use store::TsStore;
pub use summary::{SummaryCell, SummaryRow, SummaryTable};
