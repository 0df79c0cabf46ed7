//! Job posting records and their enrichment state.

mod fingerprint;
mod status;

pub use fingerprint::fingerprint;
pub use status::{Enrichment, EnrichmentStatus, ParseStatusError, TransitionError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provider output for one record. Opaque to the queue.
pub type EnrichedFields = Value;

/// Raw scraped fields of a posting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub company: String,
    #[serde(alias = "role")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, alias = "postedAt", skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<String>,
    /// Anything else the source delivered, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One ingested job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub fingerprint: String,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub posting: Posting,
    pub enrichment: Enrichment,
    pub created_at: DateTime<Utc>,
    /// Bumped on every enrichment write; the compare-and-swap token.
    pub version: u64,
}

impl JobRecord {
    /// Creates a fresh `unenriched` record with a new id.
    pub fn new(
        source_name: impl Into<String>,
        source_id: Option<String>,
        posting: Posting,
        created_at: DateTime<Utc>,
    ) -> Self {
        let source_name = source_name.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprint: fingerprint(&source_name, &posting),
            source_name,
            source_id,
            posting,
            enrichment: Enrichment::default(),
            created_at,
            version: 0,
        }
    }

    pub fn status(&self) -> EnrichmentStatus {
        self.enrichment.status
    }
}
