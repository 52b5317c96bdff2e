#![deny(missing_docs)]
//! Elasticsearch document store for the Cocom enricher.
//!
//! Implements [`cocom_core::DocumentStore`] on top of the scroll and bulk
//! APIs using a blocking HTTP client.

pub mod config;
pub mod store;

pub use config::ElasticConfig;
pub use store::{ElasticStore, anonymize_url};
