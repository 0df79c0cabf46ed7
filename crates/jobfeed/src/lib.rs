//! Job posting ingestion with a crash-tolerant enrichment queue.
//!
//! The [`Scraper`] inserts deduplicated postings as `unenriched` records, the
//! [`EnrichmentQueue`] moves them through `pending -> processing ->
//! enriched | failed`, and the [`EnrichmentWorker`] calls an
//! [`EnrichmentProvider`] for each claimed record. Operators observe and
//! steer the queue through the [`ControlSurface`].

pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod queue;
pub mod record;
pub mod sanitize;
pub mod scheduler;
pub mod scraper;
pub mod secrets;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, Config};
pub use control::{ControlSurface, QueueSnapshot, TriggerAction, TriggerRequest, TriggerResponse};
pub use error::{ConfigError, ErrorKind, JobfeedError, QueueError, Result};
pub use queue::{EnqueueOutcome, EnrichmentQueue};
pub use record::{EnrichedFields, Enrichment, EnrichmentStatus, JobRecord, Posting};
pub use scheduler::{Scheduler, TickReport};
pub use scraper::{
    FileSource, HttpSource, RawPosting, ScrapeResult, Scraper, Source, SourceError, SourceFailure,
};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use store::{MemoryStore, RecordStore, SqliteStore, StatusCounts, StoreError};
pub use telemetry::init_logging;
pub use worker::{EnrichmentProvider, EnrichmentWorker, HttpProvider, ProviderError, WorkerReport};
