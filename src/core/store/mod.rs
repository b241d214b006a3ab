//! # Store Module
//!
//! Persists fingerprint records keyed by image identity, so the expensive
//! extraction runs once per image and matching can be re-run freely.
//!
//! ## Backends
//! - `SqliteStore` - Persistent storage using SQLite
//! - `InMemoryStore` - For testing and one-shot runs

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::FingerprintStore;

use crate::core::fingerprint::FingerprintRecord;
use serde::{Deserialize, Serialize};

/// A stored row that no longer decodes into a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadableRecord {
    pub identity: String,
    pub reason: String,
}

/// Everything read back from a store in one pass
#[derive(Debug, Clone, Default)]
pub struct LoadedRecords {
    pub records: Vec<FingerprintRecord>,
    /// Rows left out of `records`; the rest of the store is still usable
    pub unreadable: Vec<UnreadableRecord>,
}

/// Summary of what a store holds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_records: usize,
    /// Records with at least one local descriptor
    pub with_descriptors: usize,
    pub total_descriptors: usize,
    /// Fingerprint widths present, ascending
    pub fingerprint_widths: Vec<u32>,
}

impl StoreStats {
    pub fn from_records(records: &[FingerprintRecord]) -> Self {
        let mut widths: Vec<u32> = records
            .iter()
            .map(|r| r.global_fingerprint.bit_count())
            .collect();
        widths.sort_unstable();
        widths.dedup();

        Self {
            total_records: records.len(),
            with_descriptors: records
                .iter()
                .filter(|r| !r.local_descriptors.is_empty())
                .count(),
            total_descriptors: records.iter().map(|r| r.local_descriptors.len()).sum(),
            fingerprint_widths: widths,
        }
    }

    /// Share of records with local descriptors, 0.0 for an empty store
    pub fn descriptor_coverage(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            self.with_descriptors as f64 / self.total_records as f64
        }
    }
}
