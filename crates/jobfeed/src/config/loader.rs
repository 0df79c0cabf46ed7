use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::{Config, SourceKind};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let errors: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let mut names = HashSet::new();
    for source in &config.sources {
        let name = source.name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidSource {
                name: source.name.clone(),
                reason: "Source name must not be blank".to_string(),
            });
        }
        if !names.insert(name) {
            return Err(ConfigError::InvalidSource {
                name: source.name.clone(),
                reason: "Duplicate source name".to_string(),
            });
        }

        if let SourceKind::Http(http) = &source.kind {
            validate_http_url(&http.url).map_err(|reason| ConfigError::InvalidSource {
                name: source.name.clone(),
                reason,
            })?;
            for header in http.headers.keys() {
                if reqwest::header::HeaderName::from_bytes(header.as_bytes()).is_err() {
                    return Err(ConfigError::InvalidSource {
                        name: source.name.clone(),
                        reason: format!("Invalid header name '{}'", header),
                    });
                }
            }
        }
    }

    let enrichment = &config.enrichment;
    if enrichment.batch_size == 0 || enrichment.concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "enrichment.batch_size and enrichment.concurrency must be positive"
                .to_string(),
        });
    }
    if enrichment.stuck_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "enrichment.stuck_timeout_secs must be positive".to_string(),
        });
    }
    if let Some(provider) = &enrichment.provider {
        validate_http_url(&provider.endpoint).map_err(|reason| ConfigError::Validation {
            message: format!("enrichment.provider.endpoint: {}", reason),
        })?;
    }

    if config.schedule.interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "schedule.interval_secs must be positive".to_string(),
        });
    }

    if config
        .logging
        .level
        .parse::<tracing::Level>()
        .is_err()
    {
        return Err(ConfigError::Validation {
            message: format!("Unknown log level: {}", config.logging.level),
        });
    }

    Ok(())
}

fn validate_http_url(raw: &str) -> Result<(), String> {
    let url = reqwest::Url::parse(raw).map_err(|e| format!("Invalid URL '{}': {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("Unsupported URL scheme '{}'", other)),
    }
}
