//! Drains the queue through the configured HTTP provider.

use std::sync::Arc;

use jobfeed::{ConfigError, EnrichmentWorker, HttpProvider, WorkerReport};

use super::{ApiResponse, AppContext};

/// Builds the worker from `enrichment` config. Fails without a provider.
pub fn build_worker(ctx: &AppContext) -> jobfeed::Result<EnrichmentWorker> {
    let enrichment = &ctx.config.enrichment;
    let provider_config = enrichment
        .provider
        .as_ref()
        .ok_or_else(|| ConfigError::Validation {
            message: "enrichment.provider is not configured".to_string(),
        })?;
    let provider = HttpProvider::from_config(provider_config)?;

    Ok(EnrichmentWorker::new(
        ctx.queue.clone(),
        Arc::new(provider),
        enrichment.batch_size,
        enrichment.concurrency,
    ))
}

pub async fn enrich(
    ctx: &AppContext,
    batches: Option<usize>,
) -> jobfeed::Result<ApiResponse<WorkerReport>> {
    let worker = build_worker(ctx)?;
    let batches = batches.unwrap_or(ctx.config.schedule.max_batches_per_tick);

    Ok(ApiResponse::from_result(worker.drain(batches).await))
}
