//! Scheduler loop until Ctrl-C.

use std::sync::Arc;

use jobfeed::{Scheduler, Scraper, StatusCounts};
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::enrich::build_worker;
use super::{ApiResponse, AppContext};

pub async fn run(ctx: &AppContext) -> anyhow::Result<ApiResponse<StatusCounts>> {
    let schedule = &ctx.config.schedule;
    let scraper = Arc::new(Scraper::from_config(ctx.store.clone(), &ctx.config)?);
    let worker = Arc::new(build_worker(ctx)?);

    let scheduler = Arc::new(
        Scheduler::new(scraper, ctx.queue.clone(), worker, schedule.interval())
            .with_auto_enqueue(schedule.auto_enqueue)
            .with_max_batches(schedule.max_batches_per_tick),
    );

    // The sender stays alive so the loop keeps waiting on it.
    let (trigger_tx, trigger_rx) = broadcast::channel(1);

    // First pass right away rather than one interval from now.
    let _ = trigger_tx.send(());

    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(trigger_rx).await })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, stopping");
    }
    info!("Shutting down");
    scheduler.stop();
    runner.await?;
    drop(trigger_tx);

    Ok(ApiResponse::from_result(ctx.queue.stats()))
}
