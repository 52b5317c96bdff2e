//! Study registry.

use std::sync::Arc;

use crate::batch::UploadSummary;
use crate::enricher::CocomEnricher;
use crate::error::{CocomError, Result};
use crate::store::DocumentStore;
use crate::study::{Study, StudyParams};

/// Build study instances from a list of IDs.
pub fn build_studies(ids: &[String]) -> Result<Vec<Arc<dyn Study + Send + Sync>>> {
    let mut studies: Vec<Arc<dyn Study + Send + Sync>> = Vec::new();
    for id in ids {
        let study = match normalize_study_id(id) {
            Some(StudyKind::RepoAnalysis) => Arc::new(RepoAnalysisStudy) as Arc<_>,
            None => return Err(CocomError::Other(format!("unknown study: {id}"))),
        };
        studies.push(study);
    }

    Ok(studies)
}

/// Studies run when none are requested explicitly.
pub fn default_studies() -> Vec<Arc<dyn Study + Send + Sync>> {
    vec![Arc::new(RepoAnalysisStudy)]
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum StudyKind {
    RepoAnalysis,
}

fn normalize_study_id(id: &str) -> Option<StudyKind> {
    match id.trim().to_lowercase().as_str() {
        "enrich_repo_analysis" | "repo-analysis" | "repo_analysis" => {
            Some(StudyKind::RepoAnalysis)
        }
        _ => None,
    }
}

/// Cumulative evolution of metrics per repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepoAnalysisStudy;

impl Study for RepoAnalysisStudy {
    fn id(&self) -> &str {
        "enrich_repo_analysis"
    }

    fn run(
        &self,
        enricher: &CocomEnricher,
        _ocean_backend: &dyn DocumentStore,
        enrich_backend: &dyn DocumentStore,
        params: &StudyParams,
    ) -> Result<UploadSummary> {
        enricher.enrich_repo_analysis(enrich_backend, params)
    }
}

#[cfg(test)]
mod tests {
    use super::{build_studies, default_studies};
    use crate::config::EnricherConfig;
    use crate::enricher::CocomEnricher;
    use crate::store::{DocumentStore, MemoryStore};
    use crate::study::StudyParams;
    use serde_json::json;

    #[test]
    fn build_studies_supports_aliases() {
        let studies = build_studies(&[
            "enrich_repo_analysis".to_string(),
            " Repo-Analysis ".to_string(),
        ])
        .expect("build studies");

        let ids: Vec<&str> = studies.iter().map(|study| study.id()).collect();
        assert_eq!(ids, vec!["enrich_repo_analysis", "enrich_repo_analysis"]);
    }

    #[test]
    fn build_studies_rejects_unknown_ids() {
        let err = build_studies(&["onion".to_string()]).err().expect("error");
        assert!(err.to_string().contains("unknown study: onion"));
        assert!(build_studies(&[]).expect("empty").is_empty());
    }

    #[test]
    fn repo_analysis_study_runs_through_trait_object() {
        let raw = MemoryStore::new("raw");
        let enrich = raw.sibling("enriched");
        enrich
            .bulk_upload(
                &[json!({
                    "id": "c1_a.py",
                    "file_path": "a.py",
                    "loc": 12,
                    "comments": 3,
                    "blanks": 0,
                    "commit_sha": "c1",
                    "author_date": "2020-01-01T00:00:00+00:00",
                    "commit_date": "2020-01-01T00:00:00+00:00",
                    "origin": "repo1"
                })],
                "id",
            )
            .expect("seed");
        let enricher = CocomEnricher::new(EnricherConfig::default());
        let params = StudyParams {
            out_index: "evolution".to_string(),
            ..StudyParams::default()
        };

        let study = default_studies().remove(0);
        let summary = study
            .run(&enricher, &raw, &enrich, &params)
            .expect("run study");

        assert_eq!(summary.submitted, 1);
        let point = enrich.sibling("evolution").get("c1_a.py").expect("get");
        let point = point.expect("evolution point");
        assert_eq!(point["total_loc"], json!(12));
        assert_eq!(point["total_comments_ratio"], json!(0.2));
    }
}
