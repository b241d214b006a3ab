//! In-memory fingerprint store for tests and one-shot runs.

use super::FingerprintStore;
use crate::core::fingerprint::{FingerprintRecord, ImageIdentity};
use crate::error::StoreError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// Fingerprint store that lives only as long as the process
pub struct InMemoryStore {
    records: RwLock<HashMap<ImageIdentity, FingerprintRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Corrupted {
            path: PathBuf::from("memory"),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintStore for InMemoryStore {
    fn put(&self, record: &FingerprintRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        records.insert(record.identity.clone(), record.clone());
        Ok(())
    }

    fn put_batch(&self, batch: &[FingerprintRecord]) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        for record in batch {
            records.insert(record.identity.clone(), record.clone());
        }
        Ok(())
    }

    fn get(&self, identity: &ImageIdentity) -> Result<Option<FingerprintRecord>, StoreError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.get(identity).cloned())
    }

    fn all(&self) -> Result<Vec<FingerprintRecord>, StoreError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.values().cloned().collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.len())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        records.clear();
        Ok(())
    }
}
