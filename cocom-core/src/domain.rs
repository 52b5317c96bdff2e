//! Domain entities for Cocom enrichment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The six per-file complexity metrics reported by the analyzer.
///
/// A `None` metric is unknown. A `None` `loc` marks a file deleted in the
/// commit that produced the analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetrics {
    /// Cyclomatic complexity.
    #[serde(default)]
    pub ccn: Option<i64>,
    /// Number of functions.
    #[serde(default)]
    pub num_funs: Option<i64>,
    /// Number of tokens.
    #[serde(default)]
    pub tokens: Option<i64>,
    /// Lines of code.
    #[serde(default)]
    pub loc: Option<i64>,
    /// Comment lines.
    #[serde(default)]
    pub comments: Option<i64>,
    /// Blank lines.
    #[serde(default)]
    pub blanks: Option<i64>,
}

impl FileMetrics {
    /// Whether the file was deleted in the commit these metrics belong to.
    pub fn is_deleted(&self) -> bool {
        self.loc.is_none()
    }
}

/// A derived ratio field.
///
/// Ratios are fractions of the total line count, except when `loc` is null or
/// zero: then the raw count is passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ratio {
    /// Raw count passed through on the degrade path.
    Count(i64),
    /// Fraction of `loc + comments + blanks`.
    Fraction(f64),
}

impl Ratio {
    /// Numeric value of the ratio regardless of variant.
    pub fn as_f64(&self) -> f64 {
        match self {
            Ratio::Count(count) => *count as f64,
            Ratio::Fraction(fraction) => *fraction,
        }
    }
}

/// Raw analysis of one file in one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Complexity metrics for the file.
    #[serde(flatten)]
    pub metrics: FileMetrics,
    /// File extension.
    #[serde(default)]
    pub ext: Option<String>,
    /// Path of the file relative to the repository root.
    pub file_path: String,
    /// Whether the file was touched by the commit.
    #[serde(default)]
    pub in_commit: Option<bool>,
}

/// Commit-level payload of a raw event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitData {
    /// Commit SHA.
    pub commit: String,
    /// Author identity line.
    #[serde(rename = "Author", default)]
    pub author: Option<String>,
    /// Committer identity line.
    #[serde(rename = "Commit", default)]
    pub committer: Option<String>,
    /// Commit message.
    #[serde(default)]
    pub message: Option<String>,
    /// Author date as reported by git.
    #[serde(rename = "AuthorDate")]
    pub author_date: String,
    /// Commit date as reported by git.
    #[serde(rename = "CommitDate")]
    pub commit_date: String,
    /// Per-file analyses.
    #[serde(default)]
    pub analysis: Vec<FileAnalysis>,
}

/// Provenance fields copied verbatim from a raw event into every record.
///
/// Absent fields are carried as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Last update time of the raw item.
    #[serde(rename = "metadata__updated_on", default)]
    pub metadata_updated_on: Option<Value>,
    /// Ingestion time of the raw item.
    #[serde(rename = "metadata__timestamp", default)]
    pub metadata_timestamp: Option<Value>,
    /// Backend offset.
    #[serde(default)]
    pub offset: Option<Value>,
    /// Repository origin.
    #[serde(default)]
    pub origin: Option<Value>,
    /// Backend tag.
    #[serde(default)]
    pub tag: Option<Value>,
    /// Raw item uuid.
    #[serde(default)]
    pub uuid: Option<Value>,
}

impl Provenance {
    /// Key identifying the origin; a missing origin groups under the empty key.
    pub fn origin_key(&self) -> String {
        match &self.origin {
            Some(Value::String(origin)) => origin.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// One raw change event: a commit bundling per-file analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Commit payload.
    pub data: CommitData,
    /// Provenance fields of the raw item.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Fields stamped on every enriched record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentStamp {
    /// Version of the enricher that produced the record.
    #[serde(rename = "metadata__gelk_version", default)]
    pub version: String,
    /// Name of the enricher backend.
    #[serde(rename = "metadata__gelk_backend_name", default)]
    pub backend_name: String,
    /// Time the record was enriched.
    #[serde(rename = "metadata__enriched_on", default)]
    pub enriched_on: String,
}

/// Metric and path fields derived from a single [`FileAnalysis`].
#[derive(Debug, Clone, PartialEq)]
pub struct RichFile {
    /// Complexity metrics, null where unknown.
    pub metrics: FileMetrics,
    /// File extension.
    pub ext: Option<String>,
    /// Whether the file was touched by the commit.
    pub in_commit: Option<bool>,
    /// Path of the file.
    pub file_path: String,
    /// Ancestor directories, shallowest first.
    pub modules: Vec<String>,
    /// Comment lines relative to all lines.
    pub comments_ratio: Option<Ratio>,
    /// Blank lines relative to all lines.
    pub blanks_ratio: Option<Ratio>,
}

/// Search-ready record for one file in one commit.
// Only the trailing `project` map may collect unknown keys; the other
// flattened parts must stay plain structs so they claim their own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    /// Unique key: `<commit_sha>_<file_path>`.
    pub id: String,
    /// Complexity metrics, null where unknown.
    #[serde(flatten)]
    pub metrics: FileMetrics,
    /// File extension.
    #[serde(default)]
    pub ext: Option<String>,
    /// Whether the file was touched by the commit.
    #[serde(default)]
    pub in_commit: Option<bool>,
    /// Path of the file.
    pub file_path: String,
    /// Ancestor directories, shallowest first.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Comment lines relative to all lines.
    #[serde(default)]
    pub comments_ratio: Option<Ratio>,
    /// Blank lines relative to all lines.
    #[serde(default)]
    pub blanks_ratio: Option<Ratio>,
    /// Commit SHA.
    pub commit_sha: String,
    /// Author identity line.
    #[serde(default)]
    pub author: Option<String>,
    /// Committer identity line.
    #[serde(default)]
    pub committer: Option<String>,
    /// Commit message.
    #[serde(default)]
    pub message: Option<String>,
    /// Normalized author date.
    pub author_date: String,
    /// Normalized commit date.
    pub commit_date: String,
    /// Provenance copied from the raw event.
    #[serde(flatten)]
    pub provenance: Provenance,
    /// Enricher stamp.
    #[serde(flatten)]
    pub stamp: EnrichmentStamp,
    /// Creation date used by dashboards.
    #[serde(default)]
    pub grimoire_creation_date: Option<String>,
    /// Item type marker.
    #[serde(default = "item_marker")]
    pub is_cocom_file: u8,
    /// Labels configured for the repository.
    #[serde(default)]
    pub repository_labels: Option<Vec<String>>,
    /// Raw filter configured for the repository.
    #[serde(rename = "metadata__filter_raw", default)]
    pub metadata_filter_raw: Option<String>,
    /// Project mapping fields (`project`, `project_1`, ...).
    #[serde(flatten)]
    pub project: BTreeMap<String, Value>,
}

fn item_marker() -> u8 {
    1
}

/// Running totals of the six metrics for one origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTotals {
    /// Total cyclomatic complexity.
    pub total_ccn: i64,
    /// Total number of functions.
    pub total_num_funs: i64,
    /// Total number of tokens.
    pub total_tokens: i64,
    /// Total lines of code.
    pub total_loc: i64,
    /// Total comment lines.
    pub total_comments: i64,
    /// Total blank lines.
    pub total_blanks: i64,
}

/// One point of an origin's cumulative evolution series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionRecord {
    /// Id of the flat record this point was derived from.
    pub id: String,
    /// Commit SHA.
    pub commit_sha: String,
    /// Repository origin.
    pub origin: Option<Value>,
    /// Path of the file.
    pub file_path: String,
    /// Ancestor directories of the file.
    pub modules: Vec<String>,
    /// Normalized author date.
    pub author_date: String,
    /// Normalized commit date.
    pub commit_date: String,
    /// Last update time of the raw item.
    #[serde(rename = "metadata__updated_on")]
    pub metadata_updated_on: Option<Value>,
    /// File metrics; all null when the file was deleted in this event.
    #[serde(flatten)]
    pub metrics: FileMetrics,
    /// Origin totals including this event.
    #[serde(flatten)]
    pub totals: MetricTotals,
    /// File-level comments ratio.
    pub comments_ratio: Option<Ratio>,
    /// File-level blanks ratio.
    pub blanks_ratio: Option<Ratio>,
    /// Origin-level comments ratio.
    pub total_comments_ratio: Option<Ratio>,
    /// Origin-level blanks ratio.
    pub total_blanks_ratio: Option<Ratio>,
}

#[cfg(test)]
mod tests {
    use super::{FlatRecord, Provenance, RawEvent, Ratio};
    use serde_json::json;

    #[test]
    fn raw_event_reads_commit_fields_and_provenance() {
        let value = json!({
            "origin": "https://github.com/chaoss/grimoirelab-perceval",
            "uuid": "abc",
            "data": {
                "commit": "deadbeef",
                "Author": "Jane <jane@example.com>",
                "Commit": "John <john@example.com>",
                "message": "Fix parser",
                "AuthorDate": "Tue Aug 14 14:30:13 2018 +0200",
                "CommitDate": "Tue Aug 14 14:32:00 2018 +0200",
                "analysis": [
                    {"file_path": "perceval/backend.py", "loc": 10, "ext": "py", "in_commit": true}
                ]
            }
        });

        let event: RawEvent = serde_json::from_value(value).expect("decode event");

        assert_eq!(event.data.commit, "deadbeef");
        assert_eq!(event.data.analysis.len(), 1);
        assert_eq!(event.data.analysis[0].metrics.loc, Some(10));
        assert_eq!(event.data.analysis[0].metrics.ccn, None);
        assert_eq!(
            event.provenance.origin_key(),
            "https://github.com/chaoss/grimoirelab-perceval"
        );
        assert_eq!(event.provenance.tag, None);
    }

    #[test]
    fn origin_key_handles_missing_and_non_string_values() {
        assert_eq!(Provenance::default().origin_key(), "");
        let provenance = Provenance {
            origin: Some(json!(42)),
            ..Provenance::default()
        };
        assert_eq!(provenance.origin_key(), "42");
    }

    #[test]
    fn ratio_serializes_as_plain_number() {
        assert_eq!(serde_json::to_value(Ratio::Count(5)).unwrap(), json!(5));
        assert_eq!(serde_json::to_value(Ratio::Fraction(0.25)).unwrap(), json!(0.25));
        let decoded: Ratio = serde_json::from_value(json!(0.5)).unwrap();
        assert_eq!(decoded, Ratio::Fraction(0.5));
        let decoded: Ratio = serde_json::from_value(json!(3)).unwrap();
        assert_eq!(decoded, Ratio::Count(3));
    }

    #[test]
    fn flat_record_keeps_project_fields_in_catch_all() {
        let value = json!({
            "id": "c1_a/b.py",
            "file_path": "a/b.py",
            "modules": ["a"],
            "loc": 3,
            "comments": null,
            "commit_sha": "c1",
            "author_date": "2018-08-14T14:30:13+02:00",
            "commit_date": "2018-08-14T14:30:13+02:00",
            "origin": "repo1",
            "project": "Main",
            "project_1": "Main"
        });

        let record: FlatRecord = serde_json::from_value(value).expect("decode record");

        assert_eq!(record.metrics.loc, Some(3));
        assert_eq!(record.provenance.origin_key(), "repo1");
        assert_eq!(record.is_cocom_file, 1);
        assert_eq!(record.project.get("project"), Some(&json!("Main")));
        assert_eq!(record.project.len(), 2);
    }
}
