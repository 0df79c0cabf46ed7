//! The enrichment queue.
//!
//! Every mutation follows the same loop: read the record, ask the status
//! table whether the step is legal, then write it back with
//! [`RecordStore::compare_and_swap`]. A conflict means someone else wrote
//! first; the loop re-reads and decides again. That single conditional write
//! is what keeps two workers from ever holding the same claim.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::QueueError;
use crate::record::{EnrichedFields, Enrichment, EnrichmentStatus, JobRecord};
use crate::sanitize::truncate_error;
use crate::store::{CasOutcome, RecordStore, StatusCounts};

/// Optimistic retries for a single record before giving up.
const MAX_CAS_RETRIES: usize = 8;

/// Extra candidate rounds `claim_batch` runs when races left the batch short.
const MAX_CLAIM_ROUNDS: usize = 3;

/// What `enqueue_one` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "camelCase")]
pub enum EnqueueOutcome {
    /// The record moved to `pending`.
    Queued,
    /// The record was already `pending`, `processing` or `enriched`.
    AlreadyActive(EnrichmentStatus),
}

/// Result of one pass through the read/decide/write loop.
enum Transition {
    Applied(JobRecord),
    Unchanged(JobRecord),
}

/// State machine over the enrichment sub-record of stored job postings.
///
/// Cheap to clone; clones share the store and the clock.
#[derive(Clone)]
pub struct EnrichmentQueue {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl EnrichmentQueue {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Looks up a single record.
    pub fn get(&self, id: &str) -> Result<JobRecord, QueueError> {
        self.store
            .get(id)?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    /// Moves an `unenriched` or `failed` record to `pending`.
    ///
    /// Records that are already `pending`, `processing` or `enriched` are
    /// left alone and reported as [`EnqueueOutcome::AlreadyActive`].
    pub fn enqueue_one(&self, id: &str) -> Result<EnqueueOutcome, QueueError> {
        let _span = info_span!("queue.enqueue_one", job_id = %id).entered();

        let transition = self.transition(id, None, |record| match record.status() {
            EnrichmentStatus::Unenriched | EnrichmentStatus::Failed => {
                Ok(Some(enqueue(record, "enqueue")?))
            }
            _ => Ok(None),
        })?;

        Ok(match transition {
            Transition::Applied(_) => {
                info!("Job record queued for enrichment");
                EnqueueOutcome::Queued
            }
            Transition::Unchanged(record) => {
                debug!(status = %record.status(), "Job record already active");
                EnqueueOutcome::AlreadyActive(record.status())
            }
        })
    }

    /// Moves every `unenriched` record to `pending`. Returns how many moved.
    pub fn enqueue_all_unenriched(&self) -> Result<usize, QueueError> {
        let _span = info_span!("queue.enqueue_all").entered();
        let queued = self.move_all(EnrichmentStatus::Unenriched, "enqueue")?;
        info!(queued, "Queued unenriched job records");
        Ok(queued)
    }

    /// Moves every `failed` record back to `pending`, clearing its error.
    /// Returns how many moved.
    pub fn reset_failed(&self) -> Result<usize, QueueError> {
        let _span = info_span!("queue.reset_failed").entered();
        let reset = self.move_all(EnrichmentStatus::Failed, "reset")?;
        info!(reset, "Reset failed job records");
        Ok(reset)
    }

    fn move_all(
        &self,
        from: EnrichmentStatus,
        operation: &'static str,
    ) -> Result<usize, QueueError> {
        let candidates = self.store.list_by_status(from, None)?;
        let mut moved = 0;
        for candidate in candidates {
            let id = candidate.id.clone();
            let transition = self.transition(&id, Some(candidate), |record| {
                if record.status() == from {
                    Ok(Some(enqueue(record, operation)?))
                } else {
                    Ok(None)
                }
            });
            match transition {
                Ok(Transition::Applied(_)) => moved += 1,
                Ok(Transition::Unchanged(_)) => {}
                // Deleted out from under us; nothing to move.
                Err(QueueError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(moved)
    }

    /// Claims up to `limit` `pending` records for processing.
    ///
    /// Each claim is its own compare-and-swap, so concurrent callers split
    /// the pending set between them without overlap. A record lost to
    /// another caller is skipped.
    pub fn claim_batch(&self, limit: usize) -> Result<Vec<JobRecord>, QueueError> {
        let _span = info_span!("queue.claim_batch", limit).entered();
        let mut claimed = Vec::new();

        for round in 0..MAX_CLAIM_ROUNDS {
            let wanted = limit - claimed.len();
            if wanted == 0 {
                break;
            }
            let candidates = self
                .store
                .list_by_status(EnrichmentStatus::Pending, Some(wanted))?;
            if candidates.is_empty() {
                break;
            }

            let mut lost = 0;
            for candidate in candidates {
                let id = candidate.id.clone();
                let now = self.clock.now();
                let transition = self.transition(&id, Some(candidate), |record| {
                    if record.status() != EnrichmentStatus::Pending {
                        return Ok(None);
                    }
                    record
                        .enrichment
                        .claim(now)
                        .map(Some)
                        .map_err(|_| invalid_state(record, "claim"))
                });
                match transition {
                    Ok(Transition::Applied(record)) => claimed.push(record),
                    Ok(Transition::Unchanged(_)) | Err(QueueError::NotFound(_)) => lost += 1,
                    Err(QueueError::Contention { id, attempts }) => {
                        warn!(job_id = %id, attempts, "Skipping contended job record");
                        lost += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            if lost == 0 {
                break;
            }
            debug!(round, lost, "Claim round lost records to other workers");
        }

        if !claimed.is_empty() {
            info!(claimed = claimed.len(), "Claimed job records");
        }
        Ok(claimed)
    }

    /// `processing -> enriched`, storing the provider output.
    pub fn complete_success(
        &self,
        id: &str,
        fields: EnrichedFields,
    ) -> Result<JobRecord, QueueError> {
        let _span = info_span!("queue.complete_success", job_id = %id).entered();
        let now = self.clock.now();

        let record = into_record(self.transition(id, None, |record| {
            record
                .enrichment
                .succeed(fields.clone(), now)
                .map(Some)
                .map_err(|_| invalid_state(record, "complete"))
        })?);
        debug!("Job record enriched");
        Ok(record)
    }

    /// `processing -> failed`, recording a bounded copy of `reason`.
    pub fn complete_failure(&self, id: &str, reason: &str) -> Result<JobRecord, QueueError> {
        let _span = info_span!("queue.complete_failure", job_id = %id).entered();
        let reason = truncate_error(reason);

        let record = into_record(self.transition(id, None, |record| {
            record
                .enrichment
                .fail(reason.clone())
                .map(Some)
                .map_err(|_| invalid_state(record, "fail"))
        })?);
        debug!(reason = %reason, "Job record failed");
        Ok(record)
    }

    /// Counts per status plus total attempts, from one store read.
    pub fn stats(&self) -> Result<StatusCounts, QueueError> {
        Ok(self.store.status_counts()?)
    }

    /// `processing` records whose last claim is strictly older than
    /// `timeout`. Read-only.
    pub fn stuck_jobs(&self, timeout: Duration) -> Result<Vec<JobRecord>, QueueError> {
        match stuck_cutoff(self.clock.now(), timeout) {
            Some(cutoff) => Ok(self.store.list_processing_before(cutoff)?),
            None => Ok(Vec::new()),
        }
    }

    /// Operator recovery: `processing -> pending` for a record that is stuck
    /// under `timeout`. The stuck check is repeated inside the write loop, so
    /// a record re-claimed in the meantime is never taken from its worker.
    pub fn requeue_stuck(&self, id: &str, timeout: Duration) -> Result<JobRecord, QueueError> {
        let _span = info_span!("queue.requeue_stuck", job_id = %id).entered();
        let now = self.clock.now();
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);

        let record = into_record(self.transition(id, None, |record| {
            if !record.enrichment.is_stuck(now, timeout) {
                return Err(invalid_state(record, "requeue"));
            }
            record
                .enrichment
                .requeue()
                .map(Some)
                .map_err(|_| invalid_state(record, "requeue"))
        })?);
        warn!(attempts = record.enrichment.attempts, "Stuck job record requeued");
        Ok(record)
    }

    /// Read, decide, conditionally write; retried on version conflicts.
    ///
    /// `decide` returns `Ok(None)` to leave the record as it is. `seed` is a
    /// record the caller already read, used for the first attempt.
    fn transition<F>(
        &self,
        id: &str,
        mut seed: Option<JobRecord>,
        mut decide: F,
    ) -> Result<Transition, QueueError>
    where
        F: FnMut(&JobRecord) -> Result<Option<Enrichment>, QueueError>,
    {
        for attempt in 0..MAX_CAS_RETRIES {
            let record = match seed.take() {
                Some(record) => record,
                None => self.get(id)?,
            };

            let Some(next) = decide(&record)? else {
                return Ok(Transition::Unchanged(record));
            };

            match self.store.compare_and_swap(id, record.version, &next)? {
                CasOutcome::Applied { version } => {
                    return Ok(Transition::Applied(JobRecord {
                        enrichment: next,
                        version,
                        ..record
                    }));
                }
                CasOutcome::Conflict => {
                    debug!(job_id = %id, attempt, "Version conflict, re-reading");
                }
                CasOutcome::NotFound => return Err(QueueError::NotFound(id.to_string())),
            }
        }

        Err(QueueError::Contention {
            id: id.to_string(),
            attempts: MAX_CAS_RETRIES,
        })
    }
}

fn into_record(transition: Transition) -> JobRecord {
    match transition {
        Transition::Applied(record) | Transition::Unchanged(record) => record,
    }
}

fn enqueue(record: &JobRecord, operation: &'static str) -> Result<Enrichment, QueueError> {
    record
        .enrichment
        .enqueue()
        .map_err(|_| invalid_state(record, operation))
}

fn invalid_state(record: &JobRecord, operation: &'static str) -> QueueError {
    QueueError::InvalidState {
        id: record.id.clone(),
        status: record.status(),
        operation,
    }
}

/// Latest `last_attempt_at` that still counts as stuck, exclusive.
/// `None` when `timeout` reaches past the start of representable time.
fn stuck_cutoff(now: DateTime<Utc>, timeout: Duration) -> Option<DateTime<Utc>> {
    let timeout = chrono::Duration::from_std(timeout).ok()?;
    now.checked_sub_signed(timeout)
}
