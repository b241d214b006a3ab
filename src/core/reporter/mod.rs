//! # Reporter Module
//!
//! Turns the stream of per-pair match results into a report.
//!
//! ## Report Sections
//! 1. **Buckets** - every retained result, grouped by global distance
//!    ascending
//! 2. **Confirmed** - pairs whose local score cleared the match threshold,
//!    strongest first
//! 3. **Summary** - per-bucket counts plus totals, including skipped images
//!    and skipped pairs so nothing is dropped silently
//!
//! Aggregation is order independent: aggregators built on different threads
//! can be merged, and `finish` sorts every list, so the report is the same
//! however the pairs were scheduled.

mod export;

pub use export::{export_csv, export_json, export_text, ExportFormat};

use crate::core::matcher::MatchResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A pair that could not be evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPair {
    pub identity_a: String,
    pub identity_b: String,
    pub reason: String,
}

/// All retained results at one global distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceBucket {
    pub distance: u32,
    /// Pairs at this distance, retained or not
    pub count: u64,
    /// Retained pairs, sorted by identity
    pub results: Vec<MatchResult>,
}

/// Totals for a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_records: usize,
    pub pairs_evaluated: u64,
    /// Pairs that went through descriptor matching
    pub fine_checks: u64,
    pub confirmed: usize,
    pub skipped_images: usize,
    pub skipped_pairs: u64,
    /// Pairs per global distance, ascending
    pub bucket_counts: BTreeMap<u32, u64>,
}

/// Finished report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub generated_at: DateTime<Utc>,
    pub buckets: Vec<DistanceBucket>,
    pub confirmed: Vec<MatchResult>,
    pub skipped_pairs: Vec<SkippedPair>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, Default)]
struct BucketState {
    count: u64,
    results: Vec<MatchResult>,
}

/// Streaming, mergeable accumulator for match results
#[derive(Debug, Clone, Default)]
pub struct ReportAggregator {
    retention: Option<u32>,
    total_records: usize,
    pairs_evaluated: u64,
    fine_checks: u64,
    buckets: BTreeMap<u32, BucketState>,
    confirmed: Vec<MatchResult>,
    skipped_pairs: Vec<SkippedPair>,
}

impl ReportAggregator {
    /// Aggregator that keeps every result
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep result lists only for buckets at or below `max_distance`.
    /// Farther buckets are still counted.
    pub fn with_retention(max_distance: u32) -> Self {
        Self {
            retention: Some(max_distance),
            ..Self::default()
        }
    }

    /// Empty aggregator with the same retention policy
    pub fn empty_like(&self) -> Self {
        Self {
            retention: self.retention,
            ..Self::default()
        }
    }

    pub fn set_total_records(&mut self, total: usize) {
        self.total_records = total;
    }

    /// Add one evaluated pair
    pub fn push(&mut self, result: MatchResult) {
        self.pairs_evaluated += 1;

        if result.confirmed {
            self.confirmed.push(result.clone());
        }

        let retain = self
            .retention
            .map_or(true, |max| result.global_distance <= max);
        let bucket = self.buckets.entry(result.global_distance).or_default();
        bucket.count += 1;
        if retain {
            bucket.results.push(result);
        }
    }

    /// Note that a pair went through descriptor matching
    pub fn record_fine_check(&mut self) {
        self.fine_checks += 1;
    }

    /// Note a pair that was dropped without a result
    pub fn record_skipped_pair(&mut self, skipped: SkippedPair) {
        self.skipped_pairs.push(skipped);
    }

    pub fn pairs_evaluated(&self) -> u64 {
        self.pairs_evaluated
    }

    /// Fold another aggregator into this one
    pub fn merge(mut self, other: Self) -> Self {
        self.total_records = self.total_records.max(other.total_records);
        self.pairs_evaluated += other.pairs_evaluated;
        self.fine_checks += other.fine_checks;
        self.confirmed.extend(other.confirmed);
        self.skipped_pairs.extend(other.skipped_pairs);

        for (distance, state) in other.buckets {
            let bucket = self.buckets.entry(distance).or_default();
            bucket.count += state.count;
            bucket.results.extend(state.results);
        }

        self
    }

    /// Sort everything and produce the report
    pub fn finish(self, skipped_images: usize) -> SimilarityReport {
        let mut confirmed = self.confirmed;
        confirmed.sort_by(rank_confirmed);

        let mut skipped_pairs = self.skipped_pairs;
        skipped_pairs.sort_by(|a, b| {
            (&a.identity_a, &a.identity_b).cmp(&(&b.identity_a, &b.identity_b))
        });

        let bucket_counts: BTreeMap<u32, u64> = self
            .buckets
            .iter()
            .map(|(distance, state)| (*distance, state.count))
            .collect();

        let buckets: Vec<DistanceBucket> = self
            .buckets
            .into_iter()
            .map(|(distance, state)| {
                let mut results = state.results;
                results.sort_by(by_identity);
                DistanceBucket {
                    distance,
                    count: state.count,
                    results,
                }
            })
            .collect();

        let summary = ReportSummary {
            total_records: self.total_records,
            pairs_evaluated: self.pairs_evaluated,
            fine_checks: self.fine_checks,
            confirmed: confirmed.len(),
            skipped_images,
            skipped_pairs: skipped_pairs.len() as u64,
            bucket_counts,
        };

        SimilarityReport {
            generated_at: Utc::now(),
            buckets,
            confirmed,
            skipped_pairs,
            summary,
        }
    }
}

fn by_identity(a: &MatchResult, b: &MatchResult) -> Ordering {
    (&a.identity_a, &a.identity_b).cmp(&(&b.identity_a, &b.identity_b))
}

/// Local score descending, then global distance ascending, then identity
fn rank_confirmed(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.local_score
        .cmp(&a.local_score)
        .then(a.global_distance.cmp(&b.global_distance))
        .then_with(|| by_identity(a, b))
}
