//! Cocom enricher: raw events to flat records, flat records to evolution.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};

use crate::batch::{BulkWriter, UploadSummary};
use crate::config::EnricherConfig;
use crate::domain::{FlatRecord, RawEvent};
use crate::error::Result;
use crate::evolution::{EvolutionAggregator, sort_by_commit_date};
use crate::flatten::{RecordFlattener, enrichment_stamp};
use crate::projects::ProjectMap;
use crate::store::{DocumentStore, fetch};
use crate::studies::default_studies;
use crate::study::{Study, StudyParams};

/// Field used as the unique key of every enriched document.
pub const UNIQUE_ID_FIELD: &str = "id";

/// Enriches Cocom analysis data.
#[derive(Debug, Clone, Default)]
pub struct CocomEnricher {
    config: EnricherConfig,
    projects: Option<ProjectMap>,
}

impl CocomEnricher {
    /// Create an enricher with the given configuration.
    pub fn new(config: EnricherConfig) -> Self {
        Self {
            config,
            projects: None,
        }
    }

    /// Attach a project map used to tag records.
    pub fn with_projects(mut self, projects: ProjectMap) -> Self {
        self.projects = Some(projects);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EnricherConfig {
        &self.config
    }

    /// Name of the unique key field.
    pub fn field_unique_id(&self) -> &'static str {
        UNIQUE_ID_FIELD
    }

    /// Cocom records carry no identities.
    pub fn has_identities(&self) -> bool {
        false
    }

    /// Identities found in a raw event; always empty.
    pub fn identities(&self, _event: &RawEvent) -> Vec<String> {
        Vec::new()
    }

    /// Studies this enricher offers, in the order they should run.
    pub fn studies(&self) -> Vec<Arc<dyn Study + Send + Sync>> {
        default_studies()
    }

    /// Flat records for one raw event, stamped with the current time.
    pub fn rich_items(&self, event: &RawEvent) -> Result<Vec<FlatRecord>> {
        let flattener =
            RecordFlattener::new(&self.config, self.projects.as_ref(), enrichment_stamp(Utc::now()));
        flattener.rich_items(event)
    }

    /// Flatten every raw event of `ocean` into `enrich`.
    ///
    /// Uploads in batches of the configured flattener size and returns the
    /// submitted and inserted counts. A short write is logged, not fatal.
    pub fn enrich_items<O, E>(&self, ocean: &O, enrich: &E) -> Result<UploadSummary>
    where
        O: DocumentStore + ?Sized,
        E: DocumentStore + ?Sized,
    {
        let flattener =
            RecordFlattener::new(&self.config, self.projects.as_ref(), enrichment_stamp(Utc::now()));
        let mut writer = BulkWriter::new(enrich, self.field_unique_id(), self.config.bulk_size);

        for item in fetch(ocean) {
            let event: RawEvent = serde_json::from_value(item?)?;
            let rich_items = flattener.rich_items(&event)?;
            writer.extend(&rich_items)?;
        }

        writer.finish("Cocom")
    }

    /// Build the per-origin evolution series from the enriched records.
    ///
    /// The whole series is recomputed on every call. Records are read from
    /// `enrich_backend`, ordered by commit date and written to
    /// `params.out_index` on the same store.
    pub fn enrich_repo_analysis<E>(
        &self,
        enrich_backend: &E,
        params: &StudyParams,
    ) -> Result<UploadSummary>
    where
        E: DocumentStore + ?Sized,
    {
        info!(
            "Doing enrich_repository_analysis study for index {}",
            enrich_backend.describe()
        );
        debug!(
            "study params: no_incremental={} date_field={}",
            params.no_incremental, params.date_field
        );

        let mut records = Vec::new();
        for item in fetch(enrich_backend) {
            let record: FlatRecord = serde_json::from_value(item?)?;
            records.push(record);
        }
        sort_by_commit_date(&mut records);

        let out = enrich_backend.open_index(&params.out_index)?;
        let mut writer = BulkWriter::new(out.as_ref(), self.field_unique_id(), out.max_items_bulk());
        let mut aggregator = EvolutionAggregator::new();

        for record in &records {
            let evolution = aggregator.process(record);
            writer.push(&evolution)?;
        }

        debug!(
            "evolution computed for {} origins from {} records",
            aggregator.origin_count(),
            records.len()
        );
        writer.finish("Study Enricher")
    }
}
