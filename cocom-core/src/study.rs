//! Study trait definitions.

use crate::batch::UploadSummary;
use crate::enricher::CocomEnricher;
use crate::error::Result;
use crate::store::DocumentStore;

/// Default index receiving the repository evolution series.
pub const DEFAULT_STUDY_INDEX: &str = "cocom_enrich_graal_repo";

/// Default date field studies key their output on.
pub const DEFAULT_DATE_FIELD: &str = "grimoire_creation_date";

/// Parameters passed to a study by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyParams {
    /// Recompute from scratch; studies here always do.
    pub no_incremental: bool,
    /// Index the study writes to.
    pub out_index: String,
    /// Date field of the study output.
    pub date_field: String,
}

impl Default for StudyParams {
    fn default() -> Self {
        Self {
            no_incremental: false,
            out_index: DEFAULT_STUDY_INDEX.to_string(),
            date_field: DEFAULT_DATE_FIELD.to_string(),
        }
    }
}

/// A derived dataset computed over already enriched records.
pub trait Study {
    /// Returns the unique ID of the study (e.g., "enrich_repo_analysis").
    fn id(&self) -> &str;
    /// Runs the study, reading `enrich_backend` and writing `params.out_index`.
    fn run(
        &self,
        enricher: &CocomEnricher,
        ocean_backend: &dyn DocumentStore,
        enrich_backend: &dyn DocumentStore,
        params: &StudyParams,
    ) -> Result<UploadSummary>;
}
