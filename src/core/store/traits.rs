//! Fingerprint store trait definition.

use super::LoadedRecords;
use crate::core::fingerprint::{FingerprintRecord, ImageIdentity};
use crate::error::StoreError;

/// Keyed table of fingerprint records.
///
/// `identity` is the primary key: writing a record whose identity is
/// already present replaces the old one.
pub trait FingerprintStore: Send + Sync {
    /// Insert or replace a record
    fn put(&self, record: &FingerprintRecord) -> Result<(), StoreError>;

    /// Insert or replace many records in one transaction.
    fn put_batch(&self, records: &[FingerprintRecord]) -> Result<(), StoreError> {
        for record in records {
            self.put(record)?;
        }
        Ok(())
    }

    /// Look up one record
    fn get(&self, identity: &ImageIdentity) -> Result<Option<FingerprintRecord>, StoreError>;

    /// Every stored record, in no particular order. Fails on the first row
    /// that does not decode.
    fn all(&self) -> Result<Vec<FingerprintRecord>, StoreError>;

    /// Every stored record, setting aside rows that do not decode instead of
    /// failing. Errors are reserved for the store itself being unusable.
    fn load_all(&self) -> Result<LoadedRecords, StoreError> {
        Ok(LoadedRecords {
            records: self.all()?,
            unreadable: Vec::new(),
        })
    }

    /// Number of stored records
    fn count(&self) -> Result<usize, StoreError>;

    /// Remove every record
    fn clear(&self) -> Result<(), StoreError>;
}
