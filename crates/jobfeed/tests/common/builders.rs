//! Builders for postings, sources, providers and config files.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use jobfeed::{
    EnrichedFields, EnrichmentProvider, JobRecord, Posting, ProviderError, RawPosting, Source,
    SourceError,
};

/// Builder for `Posting` instances.
pub struct PostingBuilder {
    posting: Posting,
}

impl PostingBuilder {
    pub fn new(company: &str, title: &str) -> Self {
        Self {
            posting: Posting {
                company: company.to_string(),
                title: title.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.posting.description = description.to_string();
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        self.posting.location = Some(location.to_string());
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.posting.url = Some(url.to_string());
        self
    }

    pub fn build(self) -> Posting {
        self.posting
    }

    pub fn raw(self) -> RawPosting {
        RawPosting::new(self.posting)
    }
}

/// A source that serves a fixed feed, or a fixed error.
pub struct StaticSource {
    name: String,
    feed: Result<Vec<RawPosting>, String>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &str, postings: Vec<RawPosting>) -> Self {
        Self {
            name: name.to_string(),
            feed: Ok(postings),
            fetches: AtomicUsize::new(0),
        }
    }

    /// `count` distinct postings, `Company 0` .. `Company {count-1}`.
    pub fn numbered(name: &str, count: usize) -> Self {
        let postings = (0..count)
            .map(|i| {
                PostingBuilder::new(&format!("Company {}", i), "Backend Engineer")
                    .description("Build queues")
                    .raw()
                    .with_source_id(format!("{}-{}", name, i))
            })
            .collect();
        Self::new(name, postings)
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            feed: Err(message.to_string()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<RawPosting>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.feed {
            Ok(postings) => Ok(postings.clone()),
            Err(message) => Err(SourceError::Decode(message.clone())),
        }
    }
}

/// A provider that fails for chosen companies and succeeds for the rest.
#[derive(Default)]
pub struct ScriptedProvider {
    failing_companies: HashSet<String>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing_for(companies: &[&str]) -> Self {
        Self {
            failing_companies: companies.iter().map(|c| c.to_string()).collect(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Record ids passed to `enrich`, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnrichmentProvider for ScriptedProvider {
    async fn enrich(&self, record: &JobRecord) -> Result<EnrichedFields, ProviderError> {
        self.seen.lock().unwrap().push(record.id.clone());
        if self.failing_companies.contains(&record.posting.company) {
            return Err(ProviderError::Other(format!(
                "cannot enrich {}",
                record.posting.company
            )));
        }
        Ok(json!({
            "normalizedTitle": record.posting.title.to_lowercase(),
            "source": record.source_name,
        }))
    }
}

/// Builder for config JSON documents.
pub struct ConfigBuilder {
    value: Value,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            value: json!({ "version": "1.0", "sources": [] }),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.value["version"] = json!(version);
        self
    }

    pub fn database_path(mut self, path: &Path) -> Self {
        self.value["database_path"] = json!(path.to_string_lossy());
        self
    }

    pub fn http_source(mut self, name: &str, url: &str) -> Self {
        self.push_source(json!({ "name": name, "kind": "http", "url": url }));
        self
    }

    pub fn file_source(mut self, name: &str, path: &Path) -> Self {
        self.push_source(json!({ "name": name, "kind": "file", "path": path.to_string_lossy() }));
        self
    }

    pub fn raw_source(mut self, source: Value) -> Self {
        self.push_source(source);
        self
    }

    pub fn enrichment(mut self, enrichment: Value) -> Self {
        self.value["enrichment"] = enrichment;
        self
    }

    pub fn schedule(mut self, schedule: Value) -> Self {
        self.value["schedule"] = schedule;
        self
    }

    pub fn logging(mut self, logging: Value) -> Self {
        self.value["logging"] = logging;
        self
    }

    fn push_source(&mut self, source: Value) {
        if let Some(sources) = self.value["sources"].as_array_mut() {
            sources.push(source);
        }
    }

    pub fn build(self) -> String {
        serde_json::to_string_pretty(&self.value).unwrap()
    }

    pub fn write_to(self, dir: &Path) -> PathBuf {
        let path = dir.join("jobfeed.json");
        std::fs::write(&path, self.build()).expect("Failed to write config file");
        path
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
