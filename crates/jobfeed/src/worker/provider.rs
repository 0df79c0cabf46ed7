//! The enrichment provider seam.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::record::{EnrichedFields, JobRecord, Posting};
use crate::sanitize::{redact_url, truncate_error};
use crate::secrets::{resolve_secret_optional, SecretError};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Http(reqwest::Error),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider response was not usable: {0}")]
    InvalidResponse(String),

    #[error("Provider credentials: {0}")]
    Secret(#[from] SecretError),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for ProviderError {
    /// Drops the URL; the message ends up in logs and in `last_error`.
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

/// Computes derived fields for one record.
///
/// Implementations see the whole record but must not write to the store; the
/// worker turns their result into a queue completion.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn enrich(&self, record: &JobRecord) -> Result<EnrichedFields, ProviderError>;
}

#[derive(Serialize)]
struct EnrichRequest<'a> {
    id: &'a str,
    fingerprint: &'a str,
    posting: &'a Posting,
}

/// POSTs each record to an HTTP endpoint and takes the JSON reply as the
/// enriched fields.
pub struct HttpProvider {
    endpoint: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("endpoint", &redact_url(&self.endpoint))
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .finish()
    }
}

impl HttpProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }

    /// Builds a provider, resolving the API key from the configured source.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = resolve_secret_optional(
            config.api_key.as_deref(),
            config.api_key_file.as_deref(),
            config.api_key_env_var.as_deref(),
        )?;
        Self::new(
            config.endpoint.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl EnrichmentProvider for HttpProvider {
    async fn enrich(&self, record: &JobRecord) -> Result<EnrichedFields, ProviderError> {
        let mut request = self.client.post(&self.endpoint).json(&EnrichRequest {
            id: &record.id,
            fingerprint: &record.fingerprint,
            posting: &record.posting,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate_error(&body),
            });
        }

        let fields: EnrichedFields = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        if !fields.is_object() {
            return Err(ProviderError::InvalidResponse(
                "expected a JSON object".to_string(),
            ));
        }
        Ok(fields)
    }
}
