//! Embedded key-value storage for node data directories
//!
//! The node runtime persists its state through a [`StorageBackend`]. The engine only
//! needs three things from it: open a data directory, export a consistent snapshot
//! into another directory, and close cleanly.

use parking_lot::Mutex;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File holding the store inside a node data directory
pub const STORE_FILE_NAME: &str = "chain.db3";

/// Custom error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Store is closed")]
    Closed,
    #[error("Store at {0} is still in use")]
    StillShared(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

pub trait StorageBackend: Sized {
    /// Open (creating if needed) the store kept in the data directory `path`.
    fn open(path: &Path) -> StoreResult<Self>;

    /// Write a consistent point-in-time copy of the store into `dest_dir`.
    fn export_snapshot(&self, dest_dir: &Path) -> StoreResult<()>;

    fn close(self) -> StoreResult<()>;
}

/// Store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: u64,
    pub total_value_bytes: u64,
}

/// SQLite-backed key-value store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    data_dir: PathBuf,
}

impl SqliteStore {
    fn init(conn: &Connection) -> StoreResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS storage (
                key    BLOB PRIMARY KEY,
                value  BLOB NOT NULL
            ) WITHOUT ROWID",
            [],
        )?;
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO storage (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Write many entries in one transaction
    pub fn put_batch(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> StoreResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO storage (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        debug!(count = entries.len(), "Storage: batch written");
        Ok(entries.len())
    }

    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM storage WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// All entries in key order
    pub fn entries(&self) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM storage ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.conn.lock();
        let (entries, total_value_bytes): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), SUM(LENGTH(value)) FROM storage",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        // SQLite integers are signed; counts and sums are never negative
        Ok(StoreStats {
            entries: entries.max(0) as u64,
            total_value_bytes: total_value_bytes.unwrap_or(0).max(0) as u64,
        })
    }
}

impl StorageBackend for SqliteStore {
    fn open(path: &Path) -> StoreResult<Self> {
        fs::create_dir_all(path)?;
        let conn = Connection::open(path.join(STORE_FILE_NAME))?;
        Self::init(&conn)?;
        debug!(path = %path.display(), "Storage opened");
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            data_dir: path.to_path_buf(),
        })
    }

    fn export_snapshot(&self, dest_dir: &Path) -> StoreResult<()> {
        if !dest_dir.is_dir() {
            return Err(StoreError::NotFound(format!(
                "snapshot directory {}",
                dest_dir.display()
            )));
        }
        let target = dest_dir.join(STORE_FILE_NAME);
        if target.exists() {
            return Err(StoreError::InvalidData(format!(
                "snapshot target {} already exists",
                target.display()
            )));
        }

        let conn = self.conn.lock();
        // online backup API copies a consistent image even while other handles write
        conn.backup(DatabaseName::Main, &target, None)?;
        info!(
            source = %self.data_dir.display(),
            target = %target.display(),
            "Storage snapshot exported"
        );
        Ok(())
    }

    fn close(self) -> StoreResult<()> {
        let conn = self.conn.into_inner();
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        debug!(path = %self.data_dir.display(), "Storage closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Initialize logger for tests (only once)
    static INIT: std::sync::Once = std::sync::Once::new();

    fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
                )
                .with_test_writer()
                .try_init();
        });
    }

    #[test]
    fn test_open_creates_directory() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("node-0");
        let store = SqliteStore::open(&data).unwrap();
        assert!(data.join(STORE_FILE_NAME).exists());
        assert_eq!(store.data_dir(), data.as_path());
        store.close().unwrap();
    }

    #[test]
    fn test_put_get() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();

        store.put(b"height", b"1").unwrap();
        store.put(b"height", b"2").unwrap();
        assert_eq!(store.get(b"height").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_batch_and_stats() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();

        let empty = store.stats().unwrap();
        assert_eq!(empty.entries, 0);
        assert_eq!(empty.total_value_bytes, 0);

        let entries: Vec<(Vec<u8>, Vec<u8>)> =
            (0u8..5).map(|i| (vec![i], vec![i; 4])).collect();
        assert_eq!(store.put_batch(&entries).unwrap(), 5);

        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 5);
        assert_eq!(stats.total_value_bytes, 20);
        assert_eq!(store.entries().unwrap(), entries);
    }

    #[test]
    fn test_data_survives_reopen() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        store.put(b"k", b"v").unwrap();
        store.close().unwrap();

        let reopened = SqliteStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_export_snapshot() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let snapshot = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("data")).unwrap();
        store.put(b"block:1", b"genesis").unwrap();

        store.export_snapshot(snapshot.path()).unwrap();
        store.put(b"block:2", b"after snapshot").unwrap();

        let copy = SqliteStore::open(snapshot.path()).unwrap();
        assert_eq!(copy.get(b"block:1").unwrap(), Some(b"genesis".to_vec()));
        assert_eq!(copy.get(b"block:2").unwrap(), None);
    }

    #[test]
    fn test_export_snapshot_refuses_missing_or_occupied_target() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("data")).unwrap();

        let missing = dir.path().join("nope");
        assert!(matches!(
            store.export_snapshot(&missing),
            Err(StoreError::NotFound(_))
        ));

        let occupied = tempfile::tempdir().unwrap();
        fs::write(occupied.path().join(STORE_FILE_NAME), b"x").unwrap();
        assert!(matches!(
            store.export_snapshot(occupied.path()),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[test]
    fn test_store_error_display() {
        init();
        let error = StoreError::NotFound("test".to_string());
        let error_str = format!("{}", error);
        assert!(error_str.contains("Not found"));
        assert!(error_str.contains("test"));
    }
}
