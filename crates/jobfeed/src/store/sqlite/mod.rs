//! SQLite-backed record store.
//!
//! Uses rusqlite with a thread-safe handle. All access is serialized through
//! a `Mutex<Connection>`, so each compare-and-swap statement runs alone.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::{CasOutcome, InsertOutcome, RecordStore, StatusCounts, StoreError};
use crate::record::{Enrichment, EnrichmentStatus, JobRecord};

pub(crate) mod migrations;
mod record_repo;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Record store persisted in a single SQLite file.
///
/// Cloning is cheap (inner `Arc`). WAL mode is enabled so that a second
/// process (the CLI next to a running scheduler) can read while we write.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        migrations::run_all(&conn)?;

        log::info!("Record store opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }
}

/// Returns the canonical database path: `~/.jobfeed/data/jobfeed.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".jobfeed").join("data").join("jobfeed.db"))
}

impl RecordStore for SqliteStore {
    fn insert(&self, record: &JobRecord) -> Result<InsertOutcome, StoreError> {
        self.with_conn(|conn| record_repo::insert(conn, record))
    }

    fn get(&self, id: &str) -> Result<Option<JobRecord>, StoreError> {
        self.with_conn(|conn| record_repo::find_by_id(conn, id))
    }

    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<JobRecord>, StoreError> {
        self.with_conn(|conn| record_repo::find_by_fingerprint(conn, fingerprint))
    }

    fn list_by_status(
        &self,
        status: EnrichmentStatus,
        limit: Option<usize>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        self.with_conn(|conn| record_repo::list_by_status(conn, status, limit))
    }

    fn list_processing_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        self.with_conn(|conn| record_repo::list_processing_before(conn, &cutoff))
    }

    fn compare_and_swap(
        &self,
        id: &str,
        expected_version: u64,
        enrichment: &Enrichment,
    ) -> Result<CasOutcome, StoreError> {
        self.with_conn(|conn| record_repo::compare_and_swap(conn, id, expected_version, enrichment))
    }

    fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        self.with_conn(record_repo::status_counts)
    }
}
