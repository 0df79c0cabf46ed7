//! In-memory record store for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{CasOutcome, InsertOutcome, RecordStore, StatusCounts, StoreError};
use crate::record::{Enrichment, EnrichmentStatus, JobRecord};

/// Internal storage keeping insertion order alongside id and fingerprint lookup.
#[derive(Debug, Default)]
struct MemoryState {
    /// Record ids, oldest first.
    order: Vec<String>,
    records: HashMap<String, JobRecord>,
    /// Fingerprint -> record id.
    fingerprints: HashMap<String, String>,
}

impl MemoryState {
    fn iter_ordered(&self) -> impl Iterator<Item = &JobRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }
}

/// Record store held entirely in memory.
///
/// Cloning creates a new handle to the **same** records. Every operation
/// runs under one mutex, which makes `compare_and_swap` atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: &JobRecord) -> Result<InsertOutcome, StoreError> {
        let mut state = self.lock()?;
        if state.fingerprints.contains_key(&record.fingerprint) {
            return Ok(InsertOutcome::DuplicateFingerprint);
        }
        state
            .fingerprints
            .insert(record.fingerprint.clone(), record.id.clone());
        state.order.push(record.id.clone());
        state.records.insert(record.id.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn get(&self, id: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.lock()?.records.get(id).cloned())
    }

    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<JobRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .fingerprints
            .get(fingerprint)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    fn list_by_status(
        &self,
        status: EnrichmentStatus,
        limit: Option<usize>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .iter_ordered()
            .filter(|r| r.enrichment.status == status)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn list_processing_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .iter_ordered()
            .filter(|r| {
                r.enrichment.status == EnrichmentStatus::Processing
                    && r.enrichment.last_attempt_at.is_some_and(|t| t < cutoff)
            })
            .cloned()
            .collect())
    }

    fn compare_and_swap(
        &self,
        id: &str,
        expected_version: u64,
        enrichment: &Enrichment,
    ) -> Result<CasOutcome, StoreError> {
        let mut state = self.lock()?;
        let Some(record) = state.records.get_mut(id) else {
            return Ok(CasOutcome::NotFound);
        };
        if record.version != expected_version {
            return Ok(CasOutcome::Conflict);
        }
        record.enrichment = enrichment.clone();
        record.version += 1;
        Ok(CasOutcome::Applied {
            version: record.version,
        })
    }

    fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let state = self.lock()?;
        let mut counts = StatusCounts::default();
        for record in state.records.values() {
            counts.add(record.enrichment.status, 1);
            counts.total_attempts += u64::from(record.enrichment.attempts);
        }
        Ok(counts)
    }
}
