//! Flattening of raw commit events into per-file records.

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;

use crate::config::EnricherConfig;
use crate::dates::{fix_field_date, parse_date};
use crate::domain::{
    EnrichmentStamp, FileAnalysis, FileMetrics, FlatRecord, Ratio, RawEvent, RichFile,
};
use crate::error::Result;
use crate::projects::ProjectMap;

/// Backend name stamped on enriched records.
pub const BACKEND_NAME: &str = "CocomEnrich";

/// Ancestor directories of a path, shallowest first.
///
/// The file name itself and the empty root are excluded:
/// `"a/b/c.py"` yields `["a", "a/b"]`.
pub fn extract_modules(file_path: &str) -> Vec<String> {
    let chunks: Vec<&str> = file_path.split('/').collect();
    (0..chunks.len())
        .map(|idx| chunks[..idx].join("/"))
        .filter(|sub_path| !sub_path.is_empty())
        .collect()
}

/// Comment and blank ratios over `loc + comments + blanks`.
///
/// When `loc` is null or zero the raw counts are passed through unchanged,
/// nulls included. When `loc` is set, missing comments or blanks count as 0.
pub fn derive_ratios(
    loc: Option<i64>,
    comments: Option<i64>,
    blanks: Option<i64>,
) -> (Option<Ratio>, Option<Ratio>) {
    match loc {
        Some(loc) if loc != 0 => {
            let comments = comments.unwrap_or(0);
            let blanks = blanks.unwrap_or(0);
            let total_lines = (loc + comments + blanks) as f64;
            (
                Some(Ratio::Fraction(comments as f64 / total_lines)),
                Some(Ratio::Fraction(blanks as f64 / total_lines)),
            )
        }
        _ => (comments.map(Ratio::Count), blanks.map(Ratio::Count)),
    }
}

/// Metric and path fields for one file analysis.
pub fn rich_item(file_analysis: &FileAnalysis) -> RichFile {
    let metrics = file_analysis.metrics.clone();
    let (comments_ratio, blanks_ratio) = ratios_for(&metrics);

    RichFile {
        ext: file_analysis.ext.clone(),
        in_commit: file_analysis.in_commit,
        file_path: file_analysis.file_path.clone(),
        modules: extract_modules(&file_analysis.file_path),
        comments_ratio,
        blanks_ratio,
        metrics,
    }
}

fn ratios_for(metrics: &FileMetrics) -> (Option<Ratio>, Option<Ratio>) {
    derive_ratios(metrics.loc, metrics.comments, metrics.blanks)
}

/// Stamp identifying this enricher and the time of the run.
pub fn enrichment_stamp(enriched_on: DateTime<Utc>) -> EnrichmentStamp {
    EnrichmentStamp {
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend_name: BACKEND_NAME.to_string(),
        enriched_on: enriched_on.to_rfc3339_opts(SecondsFormat::Micros, false),
    }
}

/// Turns raw commit events into flat per-file records.
#[derive(Debug, Clone)]
pub struct RecordFlattener<'a> {
    config: &'a EnricherConfig,
    projects: Option<&'a ProjectMap>,
    stamp: EnrichmentStamp,
}

impl<'a> RecordFlattener<'a> {
    /// Create a flattener; `stamp` is shared by every record it produces.
    pub fn new(
        config: &'a EnricherConfig,
        projects: Option<&'a ProjectMap>,
        stamp: EnrichmentStamp,
    ) -> Self {
        Self {
            config,
            projects,
            stamp,
        }
    }

    /// One record per file analysis in the event, in analysis order.
    pub fn rich_items(&self, event: &RawEvent) -> Result<Vec<FlatRecord>> {
        let entry = &event.data;
        let author_date = fix_field_date(&entry.author_date)?;
        let commit_date = fix_field_date(&entry.commit_date)?;
        let grimoire_creation_date = parse_date(&entry.author_date)
            .ok()
            .map(|date| date.to_iso());
        let project = match self.projects {
            Some(projects) => projects.project_fields(&event.provenance.origin_key()),
            None => Default::default(),
        };

        let mut records = Vec::with_capacity(entry.analysis.len());
        for file_analysis in &entry.analysis {
            let file = rich_item(file_analysis);
            records.push(FlatRecord {
                id: format!("{}_{}", entry.commit, file.file_path),
                metrics: file.metrics,
                ext: file.ext,
                in_commit: file.in_commit,
                file_path: file.file_path,
                modules: file.modules,
                comments_ratio: file.comments_ratio,
                blanks_ratio: file.blanks_ratio,
                commit_sha: entry.commit.clone(),
                author: entry.author.clone(),
                committer: entry.committer.clone(),
                message: entry.message.clone(),
                author_date: author_date.clone(),
                commit_date: commit_date.clone(),
                provenance: event.provenance.clone(),
                stamp: self.stamp.clone(),
                grimoire_creation_date: grimoire_creation_date.clone(),
                is_cocom_file: 1,
                repository_labels: self.config.repository_labels.clone(),
                metadata_filter_raw: self.config.filter_raw.clone(),
                project: project.clone(),
            });
        }

        debug!(
            "flattened commit {} into {} records",
            entry.commit,
            records.len()
        );
        Ok(records)
    }
}
