//! Test harness for isolated pipeline runs.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use jobfeed::{
    ControlSurface, EnrichmentProvider, EnrichmentQueue, EnrichmentStatus, EnrichmentWorker,
    JobRecord, ManualClock, MemoryStore, RecordStore, Scraper, Source, SqliteStore,
};

use super::builders::StaticSource;

/// 2026-01-01T00:00:00Z, the harness clock's starting point.
pub const EPOCH: i64 = 1_767_225_600;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH + secs, 0).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Sqlite,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Memory, Backend::Sqlite];
}

/// An isolated store, clock and queue.
pub struct TestHarness {
    temp_dir: TempDir,
    pub backend: Backend,
    pub store: Arc<dyn RecordStore>,
    pub clock: Arc<ManualClock>,
    pub queue: EnrichmentQueue,
}

impl TestHarness {
    pub fn new(backend: Backend) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store: Arc<dyn RecordStore> = match backend {
            Backend::Memory => Arc::new(MemoryStore::new()),
            Backend::Sqlite => Arc::new(
                SqliteStore::open(&temp_dir.path().join("data").join("jobfeed.db"))
                    .expect("Failed to open SQLite store"),
            ),
        };
        let clock = Arc::new(ManualClock::new(at(0)));
        let queue = EnrichmentQueue::with_clock(store.clone(), clock.clone());

        Self {
            temp_dir,
            backend,
            store,
            clock,
            queue,
        }
    }

    pub fn memory() -> Self {
        Self::new(Backend::Memory)
    }

    pub fn sqlite() -> Self {
        Self::new(Backend::Sqlite)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn scraper(&self, sources: Vec<Arc<dyn Source>>) -> Scraper {
        Scraper::with_clock(self.store.clone(), sources, self.clock.clone())
    }

    pub fn worker(
        &self,
        provider: Arc<dyn EnrichmentProvider>,
        batch_size: usize,
    ) -> EnrichmentWorker {
        EnrichmentWorker::new(self.queue.clone(), provider, batch_size, 4)
    }

    pub fn control(&self, stuck_timeout: Duration) -> ControlSurface {
        ControlSurface::new(self.queue.clone(), stuck_timeout)
    }

    /// Scrapes `count` distinct postings from one static source.
    pub async fn seed(&self, count: usize) -> Vec<JobRecord> {
        let source: Arc<dyn Source> = Arc::new(StaticSource::numbered("board", count));
        let result = self.scraper(vec![source]).run().await;
        assert_eq!(result.inserted, count, "seed should insert every posting");
        self.records(EnrichmentStatus::Unenriched)
    }

    pub fn records(&self, status: EnrichmentStatus) -> Vec<JobRecord> {
        self.store
            .list_by_status(status, None)
            .expect("Failed to list records")
    }

    /// Every record in the store, regardless of status.
    pub fn all_records(&self) -> Vec<JobRecord> {
        EnrichmentStatus::ALL
            .iter()
            .flat_map(|status| self.records(*status))
            .collect()
    }

    pub fn record(&self, id: &str) -> JobRecord {
        self.store
            .get(id)
            .expect("Failed to read record")
            .expect("Record should exist")
    }
}
