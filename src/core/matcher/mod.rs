//! # Matcher Module
//!
//! The cascading pair matcher.
//!
//! ## Stages
//! 1. **Coarse** - Hamming distance between global fingerprints. Pairs
//!    farther apart than `coarse_threshold` stop here.
//! 2. **Fine** - only at or below `fine_trigger`, and only when both images
//!    have descriptors: ratio-test matching of local descriptors. The number
//!    of good matches is the local score.
//! 3. **Confirm** - a local score of at least `match_threshold`.
//!
//! Coarse comparisons are a handful of integer ops; fine comparisons are
//! `n * m` descriptor distances. The fine stage must never run for a pair the
//! coarse stage rejected.
//!
//! ## Thresholds
//! | Distance              | Outcome                              |
//! |-----------------------|--------------------------------------|
//! | > coarse_threshold    | `local_score = None`, not confirmed  |
//! | > fine_trigger        | `local_score = Some(0)`              |
//! | <= fine_trigger       | ratio-test score, maybe confirmed    |

mod fine;

pub use fine::{FineMatcher, RatioTestMatcher};

#[cfg(test)]
pub(crate) use fine::tests::CountingMatcher;

use crate::core::config::MatchConfig;
use crate::core::fingerprint::{FingerprintRecord, ImageIdentity};
use crate::core::pairs::{CandidatePair, PairGenerator};
use crate::core::reporter::{ReportAggregator, SkippedPair};
use crate::error::ConfigError;
use crate::events::{Event, EventSender, MatchEvent, MatchProgress};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of evaluating one pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// The smaller of the two identities
    pub identity_a: ImageIdentity,
    pub identity_b: ImageIdentity,
    pub global_distance: u32,
    /// Set only when the pair passed the coarse stage. A pair that passed
    /// but had no fine stage (distance above `fine_trigger`, or either
    /// descriptor set empty) scores `Some(0)`. A featureless image farther
    /// than `coarse_threshold` from its partner stays `None`: the coarse
    /// verdict comes first.
    pub local_score: Option<u32>,
    pub confirmed: bool,
}

/// Result of one cascade, plus whether the fine stage ran
struct Evaluation {
    result: MatchResult,
    fine_checked: bool,
}

/// Two-stage matcher over fingerprint records
pub struct CascadeMatcher<F: FineMatcher = RatioTestMatcher> {
    config: MatchConfig,
    fine: F,
}

impl CascadeMatcher<RatioTestMatcher> {
    pub fn new(config: MatchConfig) -> Result<Self, ConfigError> {
        let fine = RatioTestMatcher::new(config.ratio_threshold);
        Self::with_fine_matcher(config, fine)
    }
}

impl<F: FineMatcher> CascadeMatcher<F> {
    /// Use a custom fine stage
    pub fn with_fine_matcher(config: MatchConfig, fine: F) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, fine })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn fine_matcher(&self) -> &F {
        &self.fine
    }

    /// Evaluate one pair. The result does not depend on argument order.
    pub fn evaluate(
        &self,
        a: &FingerprintRecord,
        b: &FingerprintRecord,
    ) -> Result<MatchResult, ConfigError> {
        self.cascade(a, b).map(|evaluation| evaluation.result)
    }

    fn cascade(
        &self,
        a: &FingerprintRecord,
        b: &FingerprintRecord,
    ) -> Result<Evaluation, ConfigError> {
        // The smaller identity is always the query side
        let (a, b) = if b.identity < a.identity { (b, a) } else { (a, b) };

        let global_distance = a.global_fingerprint.distance(&b.global_fingerprint)?;

        let mut result = MatchResult {
            identity_a: a.identity.clone(),
            identity_b: b.identity.clone(),
            global_distance,
            local_score: None,
            confirmed: false,
        };

        if global_distance > self.config.coarse_threshold {
            return Ok(Evaluation {
                result,
                fine_checked: false,
            });
        }

        let run_fine = global_distance <= self.config.fine_trigger
            && !a.local_descriptors.is_empty()
            && !b.local_descriptors.is_empty();

        let score = if run_fine {
            self.fine.score(&a.local_descriptors, &b.local_descriptors)?
        } else {
            0
        };

        result.local_score = Some(score);
        result.confirmed = score >= self.config.match_threshold;

        Ok(Evaluation {
            result,
            fine_checked: run_fine,
        })
    }

    /// Evaluate every pair of `records` into a fresh aggregator
    pub fn run(
        &self,
        records: &[FingerprintRecord],
        events: &EventSender,
    ) -> Result<ReportAggregator, ConfigError> {
        self.run_into(records, ReportAggregator::new(), events)
    }

    /// Evaluate every pair of `records` in parallel and merge the results
    /// into `aggregator`.
    ///
    /// Fingerprint widths are checked across the whole corpus first, so a
    /// width mismatch fails the run before any result exists. A descriptor
    /// width mismatch only skips the affected pair.
    pub fn run_into(
        &self,
        records: &[FingerprintRecord],
        aggregator: ReportAggregator,
        events: &EventSender,
    ) -> Result<ReportAggregator, ConfigError> {
        validate_uniform_width(records)?;

        let generator = PairGenerator::new(records);
        let total_pairs = generator.len();
        tracing::info!(
            "Matching {} records ({} pairs, coarse <= {}, fine <= {})",
            records.len(),
            total_pairs,
            self.config.coarse_threshold,
            self.config.fine_trigger
        );
        events.send(Event::Match(MatchEvent::Started {
            total_records: records.len(),
            total_pairs,
        }));

        // Progress every 1% of the pair space, capped so huge corpora still
        // report regularly
        let interval = (total_pairs / 100).clamp(1, 100_000);
        let evaluated = AtomicU64::new(0);

        let merged = generator
            .par_iter()
            .try_fold(
                || aggregator.empty_like(),
                |mut acc, pair| {
                    self.accumulate(&mut acc, pair, events)?;

                    let done = evaluated.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % interval == 0 || done == total_pairs {
                        events.send(Event::Match(MatchEvent::Progress(MatchProgress {
                            pairs_evaluated: done,
                            total_pairs,
                        })));
                    }
                    Ok::<_, ConfigError>(acc)
                },
            )
            .try_reduce(|| aggregator.empty_like(), |a, b| Ok(a.merge(b)))?;

        let mut aggregator = aggregator.merge(merged);
        aggregator.set_total_records(records.len());

        tracing::info!(
            "Matching complete: {} pairs evaluated",
            aggregator.pairs_evaluated()
        );

        Ok(aggregator)
    }

    fn accumulate(
        &self,
        acc: &mut ReportAggregator,
        pair: CandidatePair<'_>,
        events: &EventSender,
    ) -> Result<(), ConfigError> {
        match self.cascade(pair.a, pair.b) {
            Ok(evaluation) => {
                if evaluation.fine_checked {
                    acc.record_fine_check();
                }
                acc.push(evaluation.result);
                Ok(())
            }
            Err(error @ ConfigError::DescriptorWidthMismatch { .. }) => {
                tracing::warn!(
                    "Skipping pair {} / {}: {}",
                    pair.a.identity,
                    pair.b.identity,
                    error
                );
                let (first, second) = if pair.b.identity < pair.a.identity {
                    (pair.b, pair.a)
                } else {
                    (pair.a, pair.b)
                };
                let skipped = SkippedPair {
                    identity_a: first.identity.to_string(),
                    identity_b: second.identity.to_string(),
                    reason: error.to_string(),
                };
                events.send(Event::Match(MatchEvent::PairSkipped {
                    identity_a: skipped.identity_a.clone(),
                    identity_b: skipped.identity_b.clone(),
                    message: skipped.reason.clone(),
                }));
                acc.record_skipped_pair(skipped);
                Ok(())
            }
            Err(fatal) => Err(fatal),
        }
    }
}

/// Every record must carry a fingerprint of the same width
pub fn validate_uniform_width(records: &[FingerprintRecord]) -> Result<(), ConfigError> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let expected = first.global_fingerprint.bit_count();

    match records
        .iter()
        .map(|r| r.global_fingerprint.bit_count())
        .find(|&bits| bits != expected)
    {
        Some(other) => Err(ConfigError::FingerprintWidthMismatch {
            left: expected,
            right: other,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::{DescriptorSet, GlobalFingerprint, DESCRIPTOR_BYTES};
    use crate::events::{null_sender, EventChannel};

    /// 64-bit fingerprint with the lowest `flipped` bits set
    fn fingerprint(flipped: u32) -> GlobalFingerprint {
        let value: u64 = if flipped >= 64 { u64::MAX } else { (1u64 << flipped) - 1 };
        GlobalFingerprint::from_bytes(value.to_be_bytes().to_vec()).unwrap()
    }

    /// `n` pairwise distinct descriptors: row k has byte k set to 0xff
    fn distinct_descriptors(n: usize) -> DescriptorSet {
        let rows: Vec<[u8; DESCRIPTOR_BYTES]> = (0..n)
            .map(|k| {
                let mut row = [0u8; DESCRIPTOR_BYTES];
                row[k % DESCRIPTOR_BYTES] = 0xff;
                row[(k / DESCRIPTOR_BYTES + 1) % DESCRIPTOR_BYTES] ^= 0x0f;
                row
            })
            .collect();
        DescriptorSet::from(rows)
    }

    fn record(identity: &str, flipped: u32, descriptors: DescriptorSet) -> FingerprintRecord {
        FingerprintRecord {
            identity: identity.into(),
            global_fingerprint: fingerprint(flipped),
            local_descriptors: descriptors,
        }
    }

    fn counting(config: MatchConfig) -> CascadeMatcher<CountingMatcher> {
        let fine = CountingMatcher::new(config.ratio_threshold);
        CascadeMatcher::with_fine_matcher(config, fine).unwrap()
    }

    #[test]
    fn identical_records_confirm_with_full_score() {
        let matcher = CascadeMatcher::new(MatchConfig::default()).unwrap();
        let a = record("a", 0, distinct_descriptors(31));
        let b = record("b", 0, distinct_descriptors(31));

        let result = matcher.evaluate(&a, &b).unwrap();
        assert_eq!(result.global_distance, 0);
        assert_eq!(result.local_score, Some(31));
        assert!(result.confirmed);
    }

    #[test]
    fn score_below_threshold_is_not_confirmed() {
        let matcher = CascadeMatcher::new(MatchConfig::default()).unwrap();
        let a = record("a", 0, distinct_descriptors(29));
        let b = record("b", 2, distinct_descriptors(29));

        let result = matcher.evaluate(&a, &b).unwrap();
        assert_eq!(result.global_distance, 2);
        assert_eq!(result.local_score, Some(29));
        assert!(!result.confirmed);
    }

    #[test]
    fn evaluation_is_symmetric() {
        let matcher = CascadeMatcher::new(MatchConfig::default()).unwrap();
        let a = record("x", 1, distinct_descriptors(40));
        let b = record("y", 3, distinct_descriptors(12));

        assert_eq!(matcher.evaluate(&a, &b).unwrap(), matcher.evaluate(&b, &a).unwrap());
        assert_eq!(matcher.evaluate(&b, &a).unwrap().identity_a.as_str(), "x");
    }

    #[test]
    fn coarse_rejection_skips_fine_stage() {
        let matcher = counting(MatchConfig::default());
        let a = record("a", 0, distinct_descriptors(50));
        let b = record("b", 6, distinct_descriptors(50));

        let result = matcher.evaluate(&a, &b).unwrap();
        assert_eq!(result.global_distance, 6);
        assert_eq!(result.local_score, None);
        assert!(!result.confirmed);
        assert_eq!(matcher.fine_matcher().calls(), 0);
    }

    #[test]
    fn between_trigger_and_coarse_scores_zero_without_fine_stage() {
        let config = MatchConfig::new().coarse_threshold(10).fine_trigger(3);
        let matcher = counting(config);
        let a = record("a", 0, distinct_descriptors(50));
        let b = record("b", 5, distinct_descriptors(50));

        let result = matcher.evaluate(&a, &b).unwrap();
        assert_eq!(result.local_score, Some(0));
        assert!(!result.confirmed);
        assert_eq!(matcher.fine_matcher().calls(), 0);
    }

    #[test]
    fn empty_descriptor_set_scores_zero() {
        let matcher = counting(MatchConfig::default());
        let featureless = record("blank", 0, DescriptorSet::empty());
        let textured = record("card", 0, distinct_descriptors(60));

        for (a, b) in [(&featureless, &textured), (&textured, &featureless)] {
            let result = matcher.evaluate(a, b).unwrap();
            assert_eq!(result.local_score, Some(0));
            assert!(!result.confirmed);
        }
        assert_eq!(matcher.fine_matcher().calls(), 0);
    }

    #[test]
    fn fingerprint_width_mismatch_is_an_error() {
        let matcher = CascadeMatcher::new(MatchConfig::default()).unwrap();
        let narrow = record("a", 0, DescriptorSet::empty());
        let wide = FingerprintRecord {
            identity: "b".into(),
            global_fingerprint: GlobalFingerprint::from_bytes(vec![0; 16]).unwrap(),
            local_descriptors: DescriptorSet::empty(),
        };

        assert_eq!(
            matcher.evaluate(&narrow, &wide),
            Err(ConfigError::FingerprintWidthMismatch { left: 64, right: 128 })
        );
    }

    #[test]
    fn run_prunes_far_pairs() {
        let matcher = counting(MatchConfig::default());
        // Three near-identical records and three far away from everything
        let records = vec![
            record("n1", 0, distinct_descriptors(35)),
            record("n2", 1, distinct_descriptors(35)),
            record("n3", 2, distinct_descriptors(35)),
            record("f1", 20, distinct_descriptors(35)),
            record("f2", 40, distinct_descriptors(35)),
            record("f3", 60, distinct_descriptors(35)),
        ];

        let report = matcher.run(&records, &null_sender()).unwrap().finish(0);

        assert_eq!(report.summary.pairs_evaluated, 15);
        // n1-n2, n1-n3, n2-n3 are the only pairs within distance 5
        assert_eq!(matcher.fine_matcher().calls(), 3);
        assert_eq!(report.summary.fine_checks, 3);
        assert_eq!(report.summary.confirmed, 3);
        assert_eq!(report.summary.total_records, 6);
    }

    #[test]
    fn run_rejects_mixed_widths_without_output() {
        let matcher = counting(MatchConfig::default());
        let mut records = vec![
            record("a", 0, distinct_descriptors(35)),
            record("b", 0, distinct_descriptors(35)),
        ];
        records.push(FingerprintRecord {
            identity: "c".into(),
            global_fingerprint: GlobalFingerprint::from_bytes(vec![0; 32]).unwrap(),
            local_descriptors: DescriptorSet::empty(),
        });

        let result = matcher.run(&records, &null_sender());
        assert_eq!(
            result.unwrap_err(),
            ConfigError::FingerprintWidthMismatch { left: 64, right: 256 }
        );
        assert_eq!(matcher.fine_matcher().calls(), 0);
    }

    #[test]
    fn descriptor_width_mismatch_skips_only_that_pair() {
        let matcher = CascadeMatcher::new(MatchConfig::default()).unwrap();
        let odd = DescriptorSet::from_blob(16, vec![0xaa; 64]).unwrap();
        let records = vec![
            record("a", 0, distinct_descriptors(40)),
            record("b", 0, distinct_descriptors(40)),
            record("c", 0, odd),
        ];

        let report = matcher.run(&records, &null_sender()).unwrap().finish(0);

        assert_eq!(report.summary.pairs_evaluated, 1);
        assert_eq!(report.summary.skipped_pairs, 2);
        assert_eq!(report.summary.confirmed, 1);
        assert_eq!(report.skipped_pairs[0].identity_a, "a");
        assert_eq!(report.skipped_pairs[0].identity_b, "c");
    }

    #[test]
    fn skipped_pairs_are_announced() {
        let matcher = CascadeMatcher::new(MatchConfig::default()).unwrap();
        let odd = DescriptorSet::from_blob(16, vec![0xaa; 64]).unwrap();
        let records = vec![
            record("a", 0, distinct_descriptors(40)),
            record("c", 0, odd),
        ];

        let (sender, receiver) = EventChannel::new();
        matcher.run(&records, &sender).unwrap();
        drop(sender);

        let skipped: Vec<(String, String)> = receiver
            .iter()
            .filter_map(|e| match e {
                Event::Match(MatchEvent::PairSkipped {
                    identity_a,
                    identity_b,
                    message,
                }) => {
                    assert!(message.contains("16"));
                    Some((identity_a, identity_b))
                }
                _ => None,
            })
            .collect();
        assert_eq!(skipped, vec![("a".to_string(), "c".to_string())]);
    }

    #[test]
    fn featureless_image_beyond_coarse_gate_has_no_score() {
        let matcher = counting(MatchConfig::default());
        let blank = record("blank", 0, DescriptorSet::empty());
        let far = record("far", 20, distinct_descriptors(40));

        let result = matcher.evaluate(&blank, &far).unwrap();
        assert_eq!(result.local_score, None);
        assert!(!result.confirmed);
        assert_eq!(matcher.fine_matcher().calls(), 0);
    }

    #[test]
    fn run_reports_progress() {
        let matcher = CascadeMatcher::new(MatchConfig::default()).unwrap();
        let records: Vec<_> = (0..5)
            .map(|i| record(&format!("r{i}"), i * 10, DescriptorSet::empty()))
            .collect();

        let (sender, receiver) = EventChannel::new();
        matcher.run(&records, &sender).unwrap();
        drop(sender);

        let events: Vec<Event> = receiver.iter().collect();
        assert!(matches!(
            events.first(),
            Some(Event::Match(MatchEvent::Started { total_records: 5, total_pairs: 10 }))
        ));
        // Workers may deliver progress out of order
        let furthest = events
            .iter()
            .filter_map(|e| match e {
                Event::Match(MatchEvent::Progress(p)) => Some(p.pairs_evaluated),
                _ => None,
            })
            .max();
        assert_eq!(furthest, Some(10));
    }

    #[test]
    fn run_is_independent_of_input_order() {
        let matcher = CascadeMatcher::new(MatchConfig::default()).unwrap();
        let mut records = vec![
            record("a", 0, distinct_descriptors(33)),
            record("b", 1, distinct_descriptors(33)),
            record("c", 4, distinct_descriptors(8)),
            record("d", 30, DescriptorSet::empty()),
        ];

        let forward = matcher.run(&records, &null_sender()).unwrap().finish(0);
        records.reverse();
        let backward = matcher.run(&records, &null_sender()).unwrap().finish(0);

        assert_eq!(forward.buckets, backward.buckets);
        assert_eq!(forward.confirmed, backward.confirmed);
        assert_eq!(forward.summary, backward.summary);
    }
}
