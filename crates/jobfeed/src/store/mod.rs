//! Record store contract and its implementations.
//!
//! The queue and the scraper only ever see `dyn RecordStore`. Atomicity comes
//! from [`RecordStore::compare_and_swap`]: the enrichment sub-record is
//! replaced only if the stored `version` still matches what the caller read.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::{Enrichment, EnrichmentStatus, JobRecord};

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result of inserting a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same fingerprint already exists; nothing was written.
    DuplicateFingerprint,
}

/// Result of a conditional enrichment write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write landed; `version` is the record's new version.
    Applied { version: u64 },
    /// The record changed since it was read.
    Conflict,
    NotFound,
}

/// Number of records per enrichment status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub unenriched: u64,
    pub pending: u64,
    pub processing: u64,
    pub enriched: u64,
    pub failed: u64,
    /// Sum of `attempts` over every record.
    pub total_attempts: u64,
}

impl StatusCounts {
    pub fn get(&self, status: EnrichmentStatus) -> u64 {
        match status {
            EnrichmentStatus::Unenriched => self.unenriched,
            EnrichmentStatus::Pending => self.pending,
            EnrichmentStatus::Processing => self.processing,
            EnrichmentStatus::Enriched => self.enriched,
            EnrichmentStatus::Failed => self.failed,
        }
    }

    pub(crate) fn add(&mut self, status: EnrichmentStatus, count: u64) {
        let slot = match status {
            EnrichmentStatus::Unenriched => &mut self.unenriched,
            EnrichmentStatus::Pending => &mut self.pending,
            EnrichmentStatus::Processing => &mut self.processing,
            EnrichmentStatus::Enriched => &mut self.enriched,
            EnrichmentStatus::Failed => &mut self.failed,
        };
        *slot += count;
    }

    /// Total number of records.
    pub fn total(&self) -> u64 {
        EnrichmentStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// Persistent keyed storage of job records.
pub trait RecordStore: Send + Sync {
    /// Inserts a new record unless its fingerprint is already present.
    fn insert(&self, record: &JobRecord) -> Result<InsertOutcome, StoreError>;

    fn get(&self, id: &str) -> Result<Option<JobRecord>, StoreError>;

    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<JobRecord>, StoreError>;

    /// Records with the given status, oldest insert first.
    fn list_by_status(
        &self,
        status: EnrichmentStatus,
        limit: Option<usize>,
    ) -> Result<Vec<JobRecord>, StoreError>;

    /// `processing` records whose `last_attempt_at` is strictly before `cutoff`.
    fn list_processing_before(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<JobRecord>, StoreError>;

    /// Replaces the enrichment sub-record of `id` iff its version is still
    /// `expected_version`, bumping the version. Must be atomic per record.
    fn compare_and_swap(
        &self,
        id: &str,
        expected_version: u64,
        enrichment: &Enrichment,
    ) -> Result<CasOutcome, StoreError>;

    /// Per-status counts from a single consistent read.
    fn status_counts(&self) -> Result<StatusCounts, StoreError>;
}
