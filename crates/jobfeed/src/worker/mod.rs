//! Drives claimed records through the enrichment provider.

mod provider;

pub use provider::{EnrichmentProvider, HttpProvider, ProviderError};

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{ErrorKind, QueueError};
use crate::queue::EnrichmentQueue;
use crate::record::JobRecord;

/// Counts from one or more worker batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReport {
    pub claimed: usize,
    pub enriched: usize,
    pub failed: usize,
    /// Completions rejected because the record was no longer `processing`.
    pub stale: usize,
}

impl WorkerReport {
    pub fn merge(&mut self, other: WorkerReport) {
        self.claimed += other.claimed;
        self.enriched += other.enriched;
        self.failed += other.failed;
        self.stale += other.stale;
    }
}

enum Completion {
    Enriched,
    Failed,
    Stale,
}

pub struct EnrichmentWorker {
    queue: EnrichmentQueue,
    provider: Arc<dyn EnrichmentProvider>,
    batch_size: usize,
    concurrency: usize,
}

impl EnrichmentWorker {
    pub fn new(
        queue: EnrichmentQueue,
        provider: Arc<dyn EnrichmentProvider>,
        batch_size: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            provider,
            batch_size,
            concurrency: concurrency.max(1),
        }
    }

    /// Claims one batch and completes every record in it.
    ///
    /// Provider errors become `failed` records, never errors of this call.
    /// A store failure during completion is returned once the rest of the
    /// batch has finished; the affected record stays `processing` until an
    /// operator recovers it.
    pub async fn run_once(&self) -> Result<WorkerReport, QueueError> {
        let batch = self.queue.claim_batch(self.batch_size)?;
        let mut report = WorkerReport {
            claimed: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }

        let span = info_span!("enrich_batch", claimed = batch.len());
        let completions: Vec<Result<Completion, QueueError>> = stream::iter(batch)
            .map(|record| self.process(record))
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .instrument(span)
            .await;

        let mut first_error = None;
        for completion in completions {
            match completion {
                Ok(Completion::Enriched) => report.enriched += 1,
                Ok(Completion::Failed) => report.failed += 1,
                Ok(Completion::Stale) => report.stale += 1,
                Err(e) => {
                    error!(error = %e, "Failed to record enrichment outcome");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(
                    enriched = report.enriched,
                    failed = report.failed,
                    stale = report.stale,
                    "Enrichment batch finished"
                );
                Ok(report)
            }
        }
    }

    /// Runs batches until one claims nothing or `max_batches` have run.
    pub async fn drain(&self, max_batches: usize) -> Result<WorkerReport, QueueError> {
        let mut total = WorkerReport::default();
        for _ in 0..max_batches {
            let report = self.run_once().await?;
            total.merge(report);
            if report.claimed == 0 {
                break;
            }
        }
        Ok(total)
    }

    async fn process(&self, record: JobRecord) -> Result<Completion, QueueError> {
        let span = info_span!("enrich_record", job_id = %record.id, attempt = record.enrichment.attempts);
        async {
            let outcome = self.provider.enrich(&record).await;
            let completed = match outcome {
                Ok(fields) => self
                    .queue
                    .complete_success(&record.id, fields)
                    .map(|_| Completion::Enriched),
                Err(e) => {
                    debug!(error = %e, "Provider failed");
                    self.queue
                        .complete_failure(&record.id, &e.to_string())
                        .map(|_| Completion::Failed)
                }
            };

            match completed {
                Err(e) if matches!(e.kind(), ErrorKind::InvalidState | ErrorKind::NotFound) => {
                    warn!(error = %e, "Discarding stale completion");
                    Ok(Completion::Stale)
                }
                other => other,
            }
        }
        .instrument(span)
        .await
    }
}
