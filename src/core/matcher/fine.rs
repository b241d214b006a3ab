//! Fine stage: nearest-neighbour descriptor matching with a ratio test.

use crate::core::fingerprint::descriptors::hamming;
use crate::core::fingerprint::DescriptorSet;
use crate::error::ConfigError;

/// Scores how well a query descriptor set is explained by a train set
pub trait FineMatcher: Send + Sync {
    /// Count of good matches of `query` descriptors among `train`
    fn score(&self, query: &DescriptorSet, train: &DescriptorSet) -> Result<u32, ConfigError>;
}

/// Brute-force Hamming matcher with Lowe's ratio test.
///
/// A query descriptor is a good match when its nearest train descriptor is
/// strictly closer than `ratio` times the second nearest. A train set with
/// fewer than two descriptors can produce no good match.
#[derive(Debug, Clone, Copy)]
pub struct RatioTestMatcher {
    ratio: f32,
}

impl RatioTestMatcher {
    pub fn new(ratio: f32) -> Self {
        Self { ratio }
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }
}

impl FineMatcher for RatioTestMatcher {
    fn score(&self, query: &DescriptorSet, train: &DescriptorSet) -> Result<u32, ConfigError> {
        if query.width() != train.width() {
            return Err(ConfigError::DescriptorWidthMismatch {
                left: query.width(),
                right: train.width(),
            });
        }

        if train.len() < 2 {
            return Ok(0);
        }

        let mut good = 0;
        for descriptor in query.iter() {
            let mut nearest = u32::MAX;
            let mut second = u32::MAX;

            for candidate in train.iter() {
                let distance = hamming(descriptor, candidate);
                if distance < nearest {
                    second = nearest;
                    nearest = distance;
                } else if distance < second {
                    second = distance;
                }
            }

            if (nearest as f32) < self.ratio * second as f32 {
                good += 1;
            }
        }

        Ok(good)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegating matcher that counts invocations
    pub struct CountingMatcher {
        inner: RatioTestMatcher,
        pub calls: AtomicUsize,
    }

    impl CountingMatcher {
        pub fn new(ratio: f32) -> Self {
            Self {
                inner: RatioTestMatcher::new(ratio),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FineMatcher for CountingMatcher {
        fn score(&self, query: &DescriptorSet, train: &DescriptorSet) -> Result<u32, ConfigError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.score(query, train)
        }
    }

    fn set(rows: &[[u8; 4]]) -> DescriptorSet {
        DescriptorSet::from_descriptors(4, rows.iter()).unwrap()
    }

    #[test]
    fn identical_distinct_sets_match_fully() {
        let rows = [[0x00; 4], [0xff; 4], [0x0f; 4], [0xf0, 0xf0, 0x00, 0x00]];
        let a = set(&rows);
        assert_eq!(RatioTestMatcher::new(0.75).score(&a, &a).unwrap(), 4);
    }

    #[test]
    fn ambiguous_neighbours_are_discarded() {
        // Query sits exactly between two train descriptors: d1 == d2
        let query = set(&[[0b0000_0011, 0, 0, 0]]);
        let train = set(&[[0b0000_0001, 0, 0, 0], [0b0000_0010, 0, 0, 0]]);
        assert_eq!(RatioTestMatcher::new(0.75).score(&query, &train).unwrap(), 0);
    }

    #[test]
    fn ratio_boundary_is_strict() {
        // d1 = 3, d2 = 4: 3 < 0.75 * 4 is false
        let query = set(&[[0x00; 4]]);
        let train = set(&[[0b0000_0111, 0, 0, 0], [0x0f, 0, 0, 0]]);
        assert_eq!(RatioTestMatcher::new(0.75).score(&query, &train).unwrap(), 0);
        // ...but passes once the ratio is relaxed
        assert_eq!(RatioTestMatcher::new(0.8).score(&query, &train).unwrap(), 1);
    }

    #[test]
    fn single_train_descriptor_gives_no_match() {
        let query = set(&[[0x00; 4], [0x01; 4]]);
        let train = set(&[[0x00; 4]]);
        assert_eq!(RatioTestMatcher::new(0.75).score(&query, &train).unwrap(), 0);
    }

    #[test]
    fn width_mismatch_is_an_error() {
        let narrow = set(&[[0; 4], [1; 4]]);
        let wide = DescriptorSet::from_blob(8, vec![0; 16]).unwrap();
        assert_eq!(
            RatioTestMatcher::new(0.75).score(&narrow, &wide),
            Err(ConfigError::DescriptorWidthMismatch { left: 4, right: 8 })
        );
    }

    #[test]
    fn counting_matcher_delegates() {
        let matcher = CountingMatcher::new(0.75);
        let a = set(&[[0; 4], [0xff; 4]]);
        matcher.score(&a, &a).unwrap();
        matcher.score(&a, &a).unwrap();
        assert_eq!(matcher.calls(), 2);
    }
}
