//! Posting sources the scraper pulls from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::Posting;

/// A posting as delivered by a source, before fingerprinting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    /// Identifier in the originating system, if it has one.
    #[serde(
        default,
        alias = "id",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_id: Option<String>,
    #[serde(flatten)]
    pub posting: Posting,
}

impl RawPosting {
    pub fn new(posting: Posting) -> Self {
        Self {
            source_id: None,
            posting,
        }
    }

    pub fn with_source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }
}

/// Accepts `"42"` and `42` alike; feeds disagree on id types.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Wire shapes a feed may use: a bare array or `{ "jobs": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Feed {
    List(Vec<RawPosting>),
    Wrapped { jobs: Vec<RawPosting> },
}

/// Decodes a feed body in either accepted shape.
pub fn parse_feed(body: &str) -> Result<Vec<RawPosting>, SourceError> {
    match serde_json::from_str::<Feed>(body) {
        Ok(Feed::List(postings)) | Ok(Feed::Wrapped { jobs: postings }) => Ok(postings),
        Err(e) => Err(SourceError::Decode(e.to_string())),
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// Never carries the request URL; see the `From` impl.
    #[error("Request failed: {0}")]
    Http(reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed feed: {0}")]
    Decode(String),

    #[error("Invalid source configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for SourceError {
    /// Drops the URL, which may hold credentials in its userinfo or query.
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

impl SourceError {
    /// Short category for per-source error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) | Self::Status { .. } | Self::Io { .. } => "fetch",
            Self::Decode(_) => "decode",
            Self::Config(_) => "config",
        }
    }
}

/// Something the scraper can pull raw postings from.
#[async_trait]
pub trait Source: Send + Sync {
    /// Name recorded on every record this source produces.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<RawPosting>, SourceError>;
}
