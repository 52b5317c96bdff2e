//! Cumulative per-origin evolution of complexity metrics.
//!
//! The aggregator walks flat records in commit date order and keeps, for each
//! origin, the last known metrics of every live file plus six running totals.
//! Each total always equals the sum of its metric over the live files.

use std::collections::HashMap;
use std::ops::{AddAssign, Sub};

use crate::dates::sort_key;
use crate::domain::{EvolutionRecord, FileMetrics, FlatRecord, MetricTotals};
use crate::flatten::derive_ratios;

/// Metric values used for total bookkeeping, with unknowns counted as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricValues {
    /// Cyclomatic complexity.
    pub ccn: i64,
    /// Number of functions.
    pub num_funs: i64,
    /// Number of tokens.
    pub tokens: i64,
    /// Lines of code.
    pub loc: i64,
    /// Comment lines.
    pub comments: i64,
    /// Blank lines.
    pub blanks: i64,
}

impl MetricValues {
    /// The single place where a null metric becomes 0.
    pub fn from_metrics(metrics: &FileMetrics) -> Self {
        Self {
            ccn: metrics.ccn.unwrap_or(0),
            num_funs: metrics.num_funs.unwrap_or(0),
            tokens: metrics.tokens.unwrap_or(0),
            loc: metrics.loc.unwrap_or(0),
            comments: metrics.comments.unwrap_or(0),
            blanks: metrics.blanks.unwrap_or(0),
        }
    }

    /// Back to the nullable record representation.
    pub fn to_metrics(self) -> FileMetrics {
        FileMetrics {
            ccn: Some(self.ccn),
            num_funs: Some(self.num_funs),
            tokens: Some(self.tokens),
            loc: Some(self.loc),
            comments: Some(self.comments),
            blanks: Some(self.blanks),
        }
    }

    /// As `total_*` fields.
    pub fn to_totals(self) -> MetricTotals {
        MetricTotals {
            total_ccn: self.ccn,
            total_num_funs: self.num_funs,
            total_tokens: self.tokens,
            total_loc: self.loc,
            total_comments: self.comments,
            total_blanks: self.blanks,
        }
    }
}

impl AddAssign for MetricValues {
    fn add_assign(&mut self, rhs: Self) {
        self.ccn += rhs.ccn;
        self.num_funs += rhs.num_funs;
        self.tokens += rhs.tokens;
        self.loc += rhs.loc;
        self.comments += rhs.comments;
        self.blanks += rhs.blanks;
    }
}

impl Sub for MetricValues {
    type Output = MetricValues;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            ccn: self.ccn - rhs.ccn,
            num_funs: self.num_funs - rhs.num_funs,
            tokens: self.tokens - rhs.tokens,
            loc: self.loc - rhs.loc,
            comments: self.comments - rhs.comments,
            blanks: self.blanks - rhs.blanks,
        }
    }
}

/// Aggregation state for one origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginState {
    files: HashMap<String, MetricValues>,
    totals: MetricValues,
}

impl OriginState {
    /// Running totals over the live files.
    pub fn totals(&self) -> MetricValues {
        self.totals
    }

    /// Last known metrics of a live file.
    pub fn file(&self, file_path: &str) -> Option<&MetricValues> {
        self.files.get(file_path)
    }

    /// Number of live files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Sum of every live file's metrics, recomputed from scratch.
    pub fn recomputed_totals(&self) -> MetricValues {
        let mut sum = MetricValues::default();
        for values in self.files.values() {
            sum += *values;
        }
        sum
    }

    /// Fold one file event into the totals and the file map.
    fn apply(&mut self, file_path: &str, detail: MetricValues, deleted: bool) {
        match self.files.get(file_path) {
            Some(previous) => {
                let delta = detail - *previous;
                self.totals += delta;
            }
            None => self.totals += detail,
        }

        if deleted {
            self.files.remove(file_path);
        } else {
            self.files.insert(file_path.to_string(), detail);
        }
    }
}

/// Builds the evolution series; owns all per-origin state for one run.
#[derive(Debug, Default)]
pub struct EvolutionAggregator {
    origins: HashMap<String, OriginState>,
}

impl EvolutionAggregator {
    /// Create an aggregator with no state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one record and produce its evolution point.
    ///
    /// Records must be fed in increasing commit date order.
    pub fn process(&mut self, record: &FlatRecord) -> EvolutionRecord {
        let detail = MetricValues::from_metrics(&record.metrics);
        let deleted = record.metrics.is_deleted();

        let state = self
            .origins
            .entry(record.provenance.origin_key())
            .or_default();
        state.apply(&record.file_path, detail, deleted);
        let totals = state.totals();

        let metrics = if deleted {
            FileMetrics::default()
        } else {
            detail.to_metrics()
        };
        let (total_comments_ratio, total_blanks_ratio) =
            derive_ratios(Some(totals.loc), Some(totals.comments), Some(totals.blanks));

        EvolutionRecord {
            id: record.id.clone(),
            commit_sha: record.commit_sha.clone(),
            origin: record.provenance.origin.clone(),
            file_path: record.file_path.clone(),
            modules: record.modules.clone(),
            author_date: record.author_date.clone(),
            commit_date: record.commit_date.clone(),
            metadata_updated_on: record.provenance.metadata_updated_on.clone(),
            metrics,
            totals: totals.to_totals(),
            comments_ratio: record.comments_ratio,
            blanks_ratio: record.blanks_ratio,
            total_comments_ratio,
            total_blanks_ratio,
        }
    }

    /// State of an origin, if any record for it was seen.
    pub fn origin(&self, origin: &str) -> Option<&OriginState> {
        self.origins.get(origin)
    }

    /// Number of origins seen so far.
    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }
}

/// Order records by commit date, keeping fetch order for ties.
///
/// Dates are compared as instants; unparseable dates sort first.
pub fn sort_by_commit_date(records: &mut [FlatRecord]) {
    records.sort_by_cached_key(|record| sort_key(&record.commit_date));
}

#[cfg(test)]
mod tests {
    use super::{EvolutionAggregator, MetricValues, sort_by_commit_date};
    use crate::domain::{EnrichmentStamp, FileMetrics, FlatRecord, Provenance, Ratio};
    use crate::flatten::derive_ratios;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn record(
        origin: &str,
        commit: &str,
        file_path: &str,
        commit_date: &str,
        metrics: FileMetrics,
    ) -> FlatRecord {
        let (comments_ratio, blanks_ratio) =
            derive_ratios(metrics.loc, metrics.comments, metrics.blanks);
        FlatRecord {
            id: format!("{commit}_{file_path}"),
            metrics,
            ext: None,
            in_commit: Some(true),
            file_path: file_path.to_string(),
            modules: Vec::new(),
            comments_ratio,
            blanks_ratio,
            commit_sha: commit.to_string(),
            author: None,
            committer: None,
            message: None,
            author_date: commit_date.to_string(),
            commit_date: commit_date.to_string(),
            provenance: Provenance {
                origin: Some(json!(origin)),
                metadata_updated_on: Some(json!(commit_date)),
                ..Provenance::default()
            },
            stamp: EnrichmentStamp::default(),
            grimoire_creation_date: None,
            is_cocom_file: 1,
            repository_labels: None,
            metadata_filter_raw: None,
            project: BTreeMap::new(),
        }
    }

    fn lines(loc: i64, comments: i64, blanks: i64) -> FileMetrics {
        FileMetrics {
            ccn: Some(1),
            num_funs: Some(1),
            tokens: Some(loc * 5),
            loc: Some(loc),
            comments: Some(comments),
            blanks: Some(blanks),
        }
    }

    fn deleted() -> FileMetrics {
        FileMetrics::default()
    }

    #[test]
    fn modification_applies_delta() {
        let mut aggregator = EvolutionAggregator::new();

        let first = aggregator.process(&record(
            "repo1",
            "c1",
            "x.py",
            "2020-01-01T00:00:00+00:00",
            lines(10, 2, 1),
        ));
        let second = aggregator.process(&record(
            "repo1",
            "c2",
            "x.py",
            "2020-01-02T00:00:00+00:00",
            lines(20, 4, 2),
        ));

        assert_eq!(first.totals.total_loc, 10);
        assert_eq!(second.totals.total_loc, 20);
        assert_eq!(second.totals.total_comments, 4);
        assert_eq!(second.totals.total_blanks, 2);
        assert_eq!(second.metrics.loc, Some(20));
    }

    #[test]
    fn delta_adds_only_net_change() {
        let mut aggregator = EvolutionAggregator::new();
        aggregator.process(&record("r", "c1", "other.c", "2020-01-01", lines(7, 0, 0)));
        let before = aggregator.process(&record("r", "c2", "f.c", "2020-01-02", lines(100, 0, 0)));
        let after = aggregator.process(&record("r", "c3", "f.c", "2020-01-03", lines(150, 0, 0)));

        assert_eq!(after.totals.total_loc - before.totals.total_loc, 50);
        assert_eq!(after.totals.total_loc, 157);
    }

    #[test]
    fn deletion_removes_file_and_nulls_output_metrics() {
        let mut aggregator = EvolutionAggregator::new();
        aggregator.process(&record("r", "c1", "a.py", "2020-01-01", lines(10, 2, 1)));
        aggregator.process(&record("r", "c2", "b.py", "2020-01-02", lines(5, 0, 0)));

        let removed = aggregator.process(&record("r", "c3", "a.py", "2020-01-03", deleted()));

        assert_eq!(removed.metrics, FileMetrics::default());
        assert_eq!(removed.totals.total_loc, 5);
        assert_eq!(removed.totals.total_comments, 0);
        assert_eq!(removed.comments_ratio, None);
        let state = aggregator.origin("r").expect("origin state");
        assert!(state.file("a.py").is_none());
        assert_eq!(state.file_count(), 1);
    }

    #[test]
    fn readded_file_counts_as_new_addition() {
        let mut aggregator = EvolutionAggregator::new();
        aggregator.process(&record("r", "c1", "a.py", "2020-01-01", lines(10, 0, 0)));
        aggregator.process(&record("r", "c2", "a.py", "2020-01-02", deleted()));

        let readded = aggregator.process(&record("r", "c3", "a.py", "2020-01-03", lines(30, 0, 0)));

        assert_eq!(readded.totals.total_loc, 30);
    }

    #[test]
    fn deleting_unseen_file_leaves_totals_unchanged() {
        let mut aggregator = EvolutionAggregator::new();
        aggregator.process(&record("r", "c1", "a.py", "2020-01-01", lines(10, 0, 0)));

        let ghost = aggregator.process(&record("r", "c2", "ghost.py", "2020-01-02", deleted()));

        assert_eq!(ghost.totals.total_loc, 10);
        assert_eq!(aggregator.origin("r").map(|state| state.file_count()), Some(1));
    }

    #[test]
    fn first_record_of_origin_can_be_a_deletion() {
        let mut aggregator = EvolutionAggregator::new();
        let first = aggregator.process(&record("r", "c1", "gone.py", "2020-01-01", deleted()));

        assert_eq!(first.totals.total_loc, 0);
        assert_eq!(first.total_comments_ratio, Some(Ratio::Count(0)));
        assert_eq!(first.total_blanks_ratio, Some(Ratio::Count(0)));
        assert_eq!(aggregator.origin("r").map(|state| state.file_count()), Some(0));
    }

    #[test]
    fn origins_are_tracked_independently() {
        let mut aggregator = EvolutionAggregator::new();
        aggregator.process(&record("repo1", "c1", "a.py", "2020-01-01", lines(10, 0, 0)));
        let other = aggregator.process(&record("repo2", "c2", "a.py", "2020-01-02", lines(3, 0, 0)));

        assert_eq!(other.totals.total_loc, 3);
        assert_eq!(aggregator.origin_count(), 2);
        assert_eq!(
            aggregator.origin("repo1").map(|state| state.totals().loc),
            Some(10)
        );
    }

    #[test]
    fn totals_always_match_live_files() {
        let mut aggregator = EvolutionAggregator::new();
        let events = [
            ("a.py", lines(10, 1, 1)),
            ("b.py", lines(20, 2, 2)),
            ("a.py", lines(15, 3, 0)),
            ("c.py", lines(1, 0, 0)),
            ("b.py", deleted()),
            ("b.py", lines(4, 4, 4)),
            ("c.py", deleted()),
        ];

        for (idx, (path, metrics)) in events.into_iter().enumerate() {
            let date = format!("2020-01-{:02}", idx + 1);
            aggregator.process(&record("r", &format!("c{idx}"), path, &date, metrics));
            let state = aggregator.origin("r").expect("state");
            assert_eq!(state.totals(), state.recomputed_totals());
        }
        assert_eq!(aggregator.origin("r").map(|state| state.totals().loc), Some(19));
    }

    #[test]
    fn null_metrics_count_as_zero_in_totals_but_stay_in_output() {
        let mut aggregator = EvolutionAggregator::new();
        let metrics = FileMetrics {
            loc: Some(10),
            ..FileMetrics::default()
        };

        let point = aggregator.process(&record("r", "c1", "a.py", "2020-01-01", metrics));

        assert_eq!(point.totals.total_ccn, 0);
        assert_eq!(point.metrics.ccn, Some(0));
        assert_eq!(point.total_comments_ratio, Some(Ratio::Fraction(0.0)));
    }

    #[test]
    fn aggregate_ratios_use_totals() {
        let mut aggregator = EvolutionAggregator::new();
        aggregator.process(&record("r", "c1", "a.py", "2020-01-01", lines(6, 2, 2)));
        let point = aggregator.process(&record("r", "c2", "b.py", "2020-01-02", lines(4, 4, 2)));

        assert_eq!(point.total_comments_ratio, Some(Ratio::Fraction(0.3)));
        assert_eq!(point.total_blanks_ratio, Some(Ratio::Fraction(0.2)));
        assert_eq!(point.comments_ratio, Some(Ratio::Fraction(0.4)));
    }

    #[test]
    fn metric_values_arithmetic() {
        let mut total = MetricValues::from_metrics(&lines(10, 2, 1));
        total += MetricValues::from_metrics(&lines(5, 1, 0));
        let delta = total - MetricValues::from_metrics(&lines(10, 2, 1));
        assert_eq!(delta.loc, 5);
        assert_eq!(delta.comments, 1);
        assert_eq!(total.to_totals().total_tokens, 75);
    }

    #[test]
    fn sorting_is_by_instant_and_stable() {
        let mut records = vec![
            record("r", "late", "a", "2020-01-02T00:00:00+00:00", lines(1, 0, 0)),
            record("r", "tie1", "a", "2020-01-01T02:00:00+02:00", lines(1, 0, 0)),
            record("r", "tie2", "b", "2020-01-01T00:00:00+00:00", lines(1, 0, 0)),
            record("r", "early", "a", "2019-12-31T23:00:00+00:00", lines(1, 0, 0)),
        ];

        sort_by_commit_date(&mut records);

        let order: Vec<&str> = records.iter().map(|r| r.commit_sha.as_str()).collect();
        assert_eq!(order, vec!["early", "tie1", "tie2", "late"]);
    }

    #[test]
    fn evolution_record_serializes_nulls_for_deleted_files() {
        let mut aggregator = EvolutionAggregator::new();
        aggregator.process(&record("r", "c1", "a.py", "2020-01-01", lines(10, 0, 0)));
        let point = aggregator.process(&record("r", "c2", "a.py", "2020-01-02", deleted()));

        let value = serde_json::to_value(&point).expect("encode");

        assert_eq!(value["loc"], json!(null));
        assert_eq!(value["ccn"], json!(null));
        assert_eq!(value["total_loc"], json!(0));
        assert_eq!(value["origin"], json!("r"));
        assert_eq!(value["metadata__updated_on"], json!("2020-01-02"));
        assert_eq!(value["total_comments_ratio"], json!(0));
    }
}
