//! One scraper run over every enabled source.

use jobfeed::{ScrapeResult, Scraper};
use tracing::info;

use super::{ApiResponse, AppContext};

pub async fn scrape(ctx: &AppContext) -> jobfeed::Result<ApiResponse<ScrapeResult>> {
    let scraper = Scraper::from_config(ctx.store.clone(), &ctx.config)?;
    info!(sources = scraper.source_count(), "Scraping");

    let result = scraper.run().await;
    Ok(ApiResponse::ok(result))
}
