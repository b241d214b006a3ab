//! # Pairs Module
//!
//! Enumerates every unordered pair of distinct records exactly once.
//!
//! Pairs are yielded lazily in row-major order over the input slice:
//! `(0,1) (0,2) .. (0,m-1) (1,2) ..`. Nothing is allocated per pair, so a
//! corpus of tens of thousands of records can be walked without holding the
//! `m(m-1)/2` pair space in memory.

use crate::core::fingerprint::FingerprintRecord;
use rayon::prelude::*;

/// Two distinct records to compare
#[derive(Debug, Clone, Copy)]
pub struct CandidatePair<'a> {
    pub a: &'a FingerprintRecord,
    pub b: &'a FingerprintRecord,
}

/// Restartable source of candidate pairs over a fixed record slice
#[derive(Debug, Clone, Copy)]
pub struct PairGenerator<'a> {
    records: &'a [FingerprintRecord],
}

impl<'a> PairGenerator<'a> {
    pub fn new(records: &'a [FingerprintRecord]) -> Self {
        Self { records }
    }

    /// Number of unordered pairs among `m` items
    pub fn pair_count(m: usize) -> u64 {
        let m = m as u64;
        m * m.saturating_sub(1) / 2
    }

    pub fn len(&self) -> u64 {
        Self::pair_count(self.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.records.len() < 2
    }

    /// Fresh sequential pass; every call yields the same pairs in the same order
    pub fn iter(&self) -> PairIter<'a> {
        PairIter {
            records: self.records,
            i: 0,
            j: 1,
            remaining: Self::pair_count(self.records.len()) as usize,
        }
    }

    /// Parallel pass over the same pair set, split by first index
    pub fn par_iter(&self) -> impl ParallelIterator<Item = CandidatePair<'a>> + 'a {
        let records = self.records;
        (0..records.len()).into_par_iter().flat_map_iter(move |i| {
            (i + 1..records.len()).map(move |j| CandidatePair {
                a: &records[i],
                b: &records[j],
            })
        })
    }
}

impl<'a> IntoIterator for &PairGenerator<'a> {
    type Item = CandidatePair<'a>;
    type IntoIter = PairIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Sequential pair iterator
#[derive(Debug, Clone)]
pub struct PairIter<'a> {
    records: &'a [FingerprintRecord],
    i: usize,
    j: usize,
    remaining: usize,
}

impl<'a> Iterator for PairIter<'a> {
    type Item = CandidatePair<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let pair = CandidatePair {
            a: &self.records[self.i],
            b: &self.records[self.j],
        };

        self.remaining -= 1;
        self.j += 1;
        if self.j == self.records.len() {
            self.i += 1;
            self.j = self.i + 1;
        }

        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for PairIter<'_> {}

impl std::iter::FusedIterator for PairIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::tests::record;
    use std::collections::HashSet;

    fn records(m: usize) -> Vec<FingerprintRecord> {
        (0..m).map(|i| record(&format!("img-{i:03}"), i as u8, 0)).collect()
    }

    fn key(pair: &CandidatePair<'_>) -> (String, String) {
        let (a, b) = (pair.a.identity.to_string(), pair.b.identity.to_string());
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }

    #[test]
    fn yields_every_unordered_pair_once() {
        for m in [0, 1, 2, 3, 7, 40] {
            let recs = records(m);
            let generator = PairGenerator::new(&recs);
            let pairs: Vec<_> = generator.iter().collect();

            assert_eq!(pairs.len() as u64, PairGenerator::pair_count(m));
            assert_eq!(pairs.len(), m * m.saturating_sub(1) / 2);

            let unique: HashSet<_> = pairs.iter().map(key).collect();
            assert_eq!(unique.len(), pairs.len(), "duplicate pair for m={}", m);
            assert!(pairs.iter().all(|p| p.a.identity != p.b.identity));
        }
    }

    #[test]
    fn empty_and_single_inputs_are_empty() {
        assert!(PairGenerator::new(&[]).iter().next().is_none());
        let one = records(1);
        assert!(PairGenerator::new(&one).is_empty());
        assert_eq!(PairGenerator::new(&one).iter().count(), 0);
    }

    #[test]
    fn restarting_yields_same_sequence() {
        let recs = records(9);
        let generator = PairGenerator::new(&recs);

        let first: Vec<_> = generator.iter().map(|p| key(&p)).collect();
        let second: Vec<_> = (&generator).into_iter().map(|p| key(&p)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn row_major_order() {
        let recs = records(3);
        let order: Vec<_> = PairGenerator::new(&recs)
            .iter()
            .map(|p| (p.a.identity.to_string(), p.b.identity.to_string()))
            .collect();

        assert_eq!(
            order,
            vec![
                ("img-000".to_string(), "img-001".to_string()),
                ("img-000".to_string(), "img-002".to_string()),
                ("img-001".to_string(), "img-002".to_string()),
            ]
        );
    }

    #[test]
    fn exact_size_counts_down() {
        let recs = records(5);
        let mut iter = PairGenerator::new(&recs).iter();
        assert_eq!(iter.len(), 10);
        iter.next();
        iter.next();
        assert_eq!(iter.len(), 8);
    }

    #[test]
    fn parallel_view_matches_sequential() {
        let recs = records(25);
        let generator = PairGenerator::new(&recs);

        let sequential: HashSet<_> = generator.iter().map(|p| key(&p)).collect();
        let parallel: HashSet<_> = generator.par_iter().map(|p| key(&p)).collect();
        assert_eq!(sequential, parallel);
        assert_eq!(parallel.len(), 300);
    }
}
