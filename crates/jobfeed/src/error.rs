use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::record::EnrichmentStatus;
use crate::store::StoreError;

/// Failures while assembling the pipeline from a config file.
#[derive(Error, Debug)]
pub enum JobfeedError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Source error: {0}")]
    Source(#[from] crate::scraper::SourceError),

    #[error("Provider error: {0}")]
    Provider(#[from] crate::worker::ProviderError),

    #[error("Logging setup failed: {0}")]
    Telemetry(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid source '{name}': {reason}")]
    InvalidSource { name: String, reason: String },
}

/// Coarse category of a queue failure, stable enough for clients to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The referenced record does not exist.
    NotFound,
    /// The record's status does not permit the requested transition.
    InvalidState,
    /// The request itself was malformed.
    Validation,
    /// Storage failures and exhausted retries.
    Internal,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job record not found: {0}")]
    NotFound(String),

    #[error("Cannot {operation} job record '{id}' while it is {status}")]
    InvalidState {
        id: String,
        status: EnrichmentStatus,
        operation: &'static str,
    },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Gave up on job record '{id}' after {attempts} conflicting writes")]
    Contention { id: String, attempts: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Contention { .. } | Self::Store(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, JobfeedError>;
