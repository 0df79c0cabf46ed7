//! Periodic pipeline loop: scrape, queue, enrich.
//!
//! Optional. Deployments with an external cron can call the scraper and the
//! worker directly instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tracing::{error, info, info_span, Instrument};

use crate::error::QueueError;
use crate::queue::EnrichmentQueue;
use crate::scraper::{ScrapeResult, Scraper};
use crate::worker::{EnrichmentWorker, WorkerReport};

/// What one pass of the loop did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub scrape: ScrapeResult,
    /// Records moved to `pending` by auto-enqueue.
    pub queued: usize,
    pub enrichment: WorkerReport,
}

pub struct Scheduler {
    scraper: Arc<Scraper>,
    queue: EnrichmentQueue,
    worker: Arc<EnrichmentWorker>,
    interval: Duration,
    auto_enqueue: bool,
    max_batches: usize,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Scheduler {
    pub fn new(
        scraper: Arc<Scraper>,
        queue: EnrichmentQueue,
        worker: Arc<EnrichmentWorker>,
        interval: Duration,
    ) -> Self {
        Self {
            scraper,
            queue,
            worker,
            interval,
            auto_enqueue: true,
            max_batches: 10,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn with_auto_enqueue(mut self, auto_enqueue: bool) -> Self {
        self.auto_enqueue = auto_enqueue;
        self
    }

    /// Caps the worker batches run per tick so one tick cannot run forever.
    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.max_batches = max_batches;
        self
    }

    /// Runs one pass: scrape, optionally enqueue everything new, then drain.
    pub async fn tick(&self) -> Result<TickReport, QueueError> {
        let span = info_span!("scheduler.tick");
        async {
            let scrape = self.scraper.run().await;
            let queued = if self.auto_enqueue {
                self.queue.enqueue_all_unenriched()?
            } else {
                0
            };
            let enrichment = self.worker.drain(self.max_batches).await?;

            Ok(TickReport {
                scrape,
                queued,
                enrichment,
            })
        }
        .instrument(span)
        .await
    }

    /// Ticks on the interval or on a manual trigger until [`stop`] is called.
    /// The immediate first interval tick is skipped.
    ///
    /// [`stop`]: Scheduler::stop
    pub async fn run(&self, mut trigger_rx: broadcast::Receiver<()>) {
        let mut timer = tokio::time::interval(self.interval);
        timer.tick().await;

        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            tokio::select! {
                _ = timer.tick() => {},
                Ok(()) = trigger_rx.recv() => {
                    info!("Manual pipeline run triggered");
                },
                _ = self.wake.notified() => {},
            }

            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            match self.tick().await {
                Ok(report) => info!(
                    scraped = report.scrape.scraped,
                    inserted = report.scrape.inserted,
                    queued = report.queued,
                    enriched = report.enrichment.enriched,
                    failed = report.enrichment.failed,
                    "Pipeline tick finished"
                ),
                Err(e) => error!(error = %e, "Pipeline tick failed"),
            }
        }
        info!("Scheduler stopped");
    }

    /// Signals the loop to stop; it exits before starting another tick.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}
