//! Command implementations for the `jobfeed` binary.
//!
//! Commands are organized by concern:
//! - `scrape`: one scraper run
//! - `enrich`: drain the queue through the configured provider
//! - `control`: queue stats and operator triggers
//! - `run`: the scheduler loop

pub mod control;
pub mod enrich;
pub mod run;
pub mod scrape;

use std::path::Path;
use std::sync::Arc;

use jobfeed::{
    init_logging, load_config, Config, ConfigError, EnrichmentQueue, ErrorKind, JobfeedError,
    QueueError, RecordStore, SqliteStore,
};
use serde::Serialize;

/// Response wrapper printed by every command.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            kind: None,
        }
    }

    pub fn queue_err(error: &QueueError) -> Self {
        Self {
            kind: Some(error.kind()),
            ..Self::err(error.to_string())
        }
    }

    /// Config errors are reported as `validation`, everything else as
    /// `internal`.
    pub fn setup_err(error: &JobfeedError) -> Self {
        let kind = match error {
            JobfeedError::Config(_) => ErrorKind::Validation,
            _ => ErrorKind::Internal,
        };
        Self {
            kind: Some(kind),
            ..Self::err(error.to_string())
        }
    }

    /// `Ok` payloads become success responses, queue errors failure ones.
    pub fn from_result(result: Result<T, QueueError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::queue_err(&e),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Prints the response as one JSON document on stdout.
    pub fn print(&self) -> anyhow::Result<bool> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(self.success)
    }
}

/// Everything a command needs: the loaded config, the opened store and a
/// queue over it.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub queue: EnrichmentQueue,
}

impl AppContext {
    /// Loads the config file, installs logging and opens the store.
    pub fn load(config_path: &Path) -> jobfeed::Result<Self> {
        let config = load_config(config_path)?;
        init_logging(&config.logging)?;
        tracing::debug!(config = %config_path.display(), "Configuration loaded");
        Self::open(config)
    }

    pub fn open(config: Config) -> jobfeed::Result<Self> {
        let path = config.database_path().ok_or_else(|| ConfigError::Validation {
            message: "No database_path configured and no home directory found".to_string(),
        })?;
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&path)?);
        let queue = EnrichmentQueue::new(store.clone());

        Ok(Self {
            config,
            store,
            queue,
        })
    }
}
