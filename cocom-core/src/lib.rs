#![deny(missing_docs)]
//! Cocom enrichment core library.
//!
//! This crate turns raw code complexity analyses into flat per-file records
//! and derives the per-repository evolution series from them.

pub mod batch;
pub mod config;
pub mod dates;
pub mod domain;
pub mod enricher;
pub mod error;
pub mod evolution;
pub mod flatten;
pub mod projects;
pub mod store;
/// Study registry.
pub mod studies;
pub mod study;

pub use batch::{BulkWriter, UploadSummary};
pub use config::{EnricherConfig, MAX_SIZE_BULK_ENRICHED_ITEMS};
pub use dates::{fix_field_date, parse_date};
pub use domain::{
    CommitData, EvolutionRecord, FileAnalysis, FileMetrics, FlatRecord, MetricTotals, Ratio,
    RawEvent,
};
pub use enricher::CocomEnricher;
pub use error::{CocomError, Result};
pub use evolution::{EvolutionAggregator, sort_by_commit_date};
pub use flatten::{RecordFlattener, derive_ratios, extract_modules};
pub use projects::ProjectMap;
pub use store::{DocumentStore, FetchPage, MemoryStore, fetch};
pub use studies::build_studies;
pub use study::{Study, StudyParams};
