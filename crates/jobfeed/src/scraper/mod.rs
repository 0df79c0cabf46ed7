//! Ingestion: pull postings from every source and insert the new ones.
//!
//! Deduplication is by fingerprint and is enforced by the store's insert, so
//! two scrapers racing over the same feed still produce one record per
//! posting.

mod file;
mod http;
mod source;

pub use file::FileSource;
pub use http::HttpSource;
pub use source::{parse_feed, RawPosting, Source, SourceError};

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, SourceKind};
use crate::record::JobRecord;
use crate::secrets::expand_home;
use crate::store::{InsertOutcome, RecordStore, StoreError};

/// Why one source contributed nothing (or only part of its feed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    /// `fetch`, `decode`, `config` or `store`.
    pub kind: String,
    pub message: String,
}

/// Totals for one scraper run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    /// Raw postings observed across all sources.
    pub scraped: usize,
    pub inserted: usize,
    /// Postings whose fingerprint was already stored.
    pub skipped: usize,
    pub per_source_errors: Vec<SourceFailure>,
}

#[derive(Debug, Default)]
struct SourceTally {
    inserted: usize,
    skipped: usize,
}

pub struct Scraper {
    store: Arc<dyn RecordStore>,
    sources: Vec<Arc<dyn Source>>,
    clock: Arc<dyn Clock>,
}

impl Scraper {
    pub fn new(store: Arc<dyn RecordStore>, sources: Vec<Arc<dyn Source>>) -> Self {
        Self::with_clock(store, sources, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn RecordStore>,
        sources: Vec<Arc<dyn Source>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            sources,
            clock,
        }
    }

    /// Builds a scraper over every enabled source in `config`.
    pub fn from_config(store: Arc<dyn RecordStore>, config: &Config) -> Result<Self, SourceError> {
        Ok(Self::new(store, build_sources(config)?))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Fetches all sources concurrently, then ingests each feed.
    ///
    /// Existing records are never modified. A failing source is reported in
    /// [`ScrapeResult::per_source_errors`] and the others carry on.
    pub async fn run(&self) -> ScrapeResult {
        let span = info_span!("scrape", source_count = self.sources.len());
        async {
            let fetches = self.sources.iter().map(|source| {
                let span = info_span!("scrape_source", name = %source.name());
                async move { (source.name().to_string(), source.fetch().await) }.instrument(span)
            });
            let feeds = join_all(fetches).await;

            let mut result = ScrapeResult::default();
            for (name, feed) in feeds {
                let postings = match feed {
                    Ok(postings) => postings,
                    Err(e) => {
                        warn!(source = %name, error = %e, "Source fetch failed");
                        result.per_source_errors.push(SourceFailure {
                            source: name,
                            kind: e.kind().to_string(),
                            message: e.to_string(),
                        });
                        continue;
                    }
                };

                result.scraped += postings.len();
                let mut tally = SourceTally::default();
                let outcome = self.ingest(&name, postings, &mut tally);
                result.inserted += tally.inserted;
                result.skipped += tally.skipped;

                if let Err(e) = outcome {
                    warn!(source = %name, error = %e, "Store failure while ingesting source");
                    result.per_source_errors.push(SourceFailure {
                        source: name,
                        kind: "store".to_string(),
                        message: e.to_string(),
                    });
                } else {
                    debug!(
                        source = %name,
                        inserted = tally.inserted,
                        skipped = tally.skipped,
                        "Source ingested"
                    );
                }
            }

            info!(
                scraped = result.scraped,
                inserted = result.inserted,
                skipped = result.skipped,
                failed_sources = result.per_source_errors.len(),
                "Scrape finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    fn ingest(
        &self,
        source_name: &str,
        postings: Vec<RawPosting>,
        tally: &mut SourceTally,
    ) -> Result<(), StoreError> {
        for raw in postings {
            let record = JobRecord::new(source_name, raw.source_id, raw.posting, self.clock.now());
            match self.store.insert(&record)? {
                InsertOutcome::Inserted => tally.inserted += 1,
                InsertOutcome::DuplicateFingerprint => tally.skipped += 1,
            }
        }
        Ok(())
    }
}

/// Instantiates every enabled source in `config`.
pub fn build_sources(config: &Config) -> Result<Vec<Arc<dyn Source>>, SourceError> {
    config
        .enabled_sources()
        .map(|source| -> Result<Arc<dyn Source>, SourceError> {
            let built: Arc<dyn Source> = match &source.kind {
                SourceKind::Http(http) => Arc::new(HttpSource::from_config(&source.name, http)?),
                SourceKind::File(file) => {
                    Arc::new(FileSource::new(&source.name, expand_home(&file.path)))
                }
            };
            Ok(built)
        })
        .collect()
}
