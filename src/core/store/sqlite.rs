//! SQLite fingerprint store for persistent indexing.

use super::{FingerprintStore, LoadedRecords, UnreadableRecord};
use crate::core::fingerprint::{DescriptorSet, FingerprintRecord, GlobalFingerprint, ImageIdentity};
use crate::error::StoreError;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const UPSERT: &str = "INSERT OR REPLACE INTO fingerprints
     (identity, global_fingerprint, descriptor_width, local_descriptors)
     VALUES (?1, ?2, ?3, ?4)";

/// Row as read from disk, before validation
type RawRow = (String, String, i64, Option<Vec<u8>>);

/// SQLite-backed fingerprint store
///
/// Uses WAL mode so `stats` and other readers are not blocked by an index run.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             CREATE TABLE IF NOT EXISTS fingerprints (
                 identity TEXT PRIMARY KEY,
                 global_fingerprint TEXT NOT NULL,
                 descriptor_width INTEGER NOT NULL,
                 local_descriptors BLOB
             );
             CREATE INDEX IF NOT EXISTS idx_global_fingerprint
                 ON fingerprints(global_fingerprint);",
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::NotADatabase => {
                StoreError::Corrupted {
                    path: path.to_path_buf(),
                }
            }
            other => StoreError::QueryFailed(other.to_string()),
        })?;

        tracing::debug!("Opened fingerprint store at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Bytes used on disk by the database and its write-ahead log
    pub fn size_on_disk(&self) -> u64 {
        let mut wal = self.db_path.as_os_str().to_owned();
        wal.push("-wal");

        [self.db_path.clone(), PathBuf::from(wal)]
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Corrupted {
            path: self.db_path.clone(),
        })
    }

    fn decode_row((identity, fingerprint, width, blob): RawRow) -> Result<FingerprintRecord, StoreError> {
        let invalid = |reason: String| StoreError::InvalidRecord {
            identity: identity.clone(),
            reason,
        };

        let global_fingerprint =
            GlobalFingerprint::from_hex(&fingerprint).map_err(|e| invalid(e.to_string()))?;
        let width = usize::try_from(width).map_err(|e| invalid(e.to_string()))?;
        let local_descriptors = DescriptorSet::from_blob(width, blob.unwrap_or_default())
            .map_err(|e| invalid(e.to_string()))?;

        Ok(FingerprintRecord {
            identity: ImageIdentity::from(identity),
            global_fingerprint,
            local_descriptors,
        })
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn raw_rows(&self) -> Result<Vec<RawRow>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT identity, global_fingerprint, descriptor_width, local_descriptors
                 FROM fingerprints",
            )
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::read_row)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let raw = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(raw)
    }
}

impl FingerprintStore for SqliteStore {
    fn put(&self, record: &FingerprintRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            UPSERT,
            params![
                record.identity.as_str(),
                record.global_fingerprint.to_hex(),
                record.local_descriptors.width() as i64,
                record.local_descriptors.as_bytes(),
            ],
        )
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    fn put_batch(&self, records: &[FingerprintRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare_cached(UPSERT)
                .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

            for record in records {
                stmt.execute(params![
                    record.identity.as_str(),
                    record.global_fingerprint.to_hex(),
                    record.local_descriptors.width() as i64,
                    record.local_descriptors.as_bytes(),
                ])
                .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
            }
        }

        tx.commit()
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    fn get(&self, identity: &ImageIdentity) -> Result<Option<FingerprintRecord>, StoreError> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT identity, global_fingerprint, descriptor_width, local_descriptors
                 FROM fingerprints WHERE identity = ?1",
                [identity.as_str()],
                Self::read_row,
            )
            .optional()
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        row.map(Self::decode_row).transpose()
    }

    fn all(&self) -> Result<Vec<FingerprintRecord>, StoreError> {
        self.raw_rows()?.into_iter().map(Self::decode_row).collect()
    }

    fn load_all(&self) -> Result<LoadedRecords, StoreError> {
        let mut loaded = LoadedRecords::default();

        for row in self.raw_rows()? {
            match Self::decode_row(row) {
                Ok(record) => loaded.records.push(record),
                Err(StoreError::InvalidRecord { identity, reason }) => {
                    tracing::warn!("Stored record {} is unreadable: {}", identity, reason);
                    loaded.unreadable.push(UnreadableRecord { identity, reason });
                }
                Err(other) => return Err(other),
            }
        }

        Ok(loaded)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;

        conn.query_row("SELECT COUNT(*) FROM fingerprints", [], |row| {
            row.get::<_, i64>(0).map(|v| v as usize)
        })
        .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute("DELETE FROM fingerprints", [])
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(())
    }
}
