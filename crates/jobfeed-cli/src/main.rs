//! `jobfeed`: scrape job postings and drive their enrichment queue.
//!
//! Every command prints a single JSON `ApiResponse` on stdout. Logs go to
//! stderr.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::control::TriggerFlags;
use commands::{ApiResponse, AppContext};

#[derive(Parser)]
#[command(name = "jobfeed", version)]
#[command(about = "Job posting ingestion with an enrichment queue")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, short, env = "JOBFEED_CONFIG", default_value = "jobfeed.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scraper once over every enabled source
    Scrape,

    /// Drain the queue through the enrichment provider
    Enrich {
        /// Maximum number of batches (defaults to schedule.max_batches_per_tick)
        #[arg(long)]
        batches: Option<usize>,
    },

    /// Show queue stats and stuck jobs
    Stats,

    /// Queue records or recover stuck ones
    Trigger {
        /// Queue a single record
        #[arg(long)]
        job_id: Option<String>,

        /// With --job-id: move a stuck `processing` record back to `pending`
        #[arg(long)]
        force: bool,

        /// Queue every unenriched record
        #[arg(long)]
        all: bool,

        /// Move every failed record back to pending
        #[arg(long)]
        reset: bool,
    },

    /// Scrape and enrich on the configured interval until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match AppContext::load(&cli.config) {
        Ok(ctx) => match execute(&ctx, cli.command).await {
            Ok(success) => Ok(success),
            Err(e) => ApiResponse::<()>::err(format!("{:#}", e)).print(),
        },
        Err(e) => ApiResponse::<()>::setup_err(&e).print(),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Failed to write response: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs the selected command and prints its response. Returns whether the
/// command succeeded.
async fn execute(ctx: &AppContext, command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Scrape => commands::scrape::scrape(ctx).await?.print(),
        Commands::Enrich { batches } => commands::enrich::enrich(ctx, batches).await?.print(),
        Commands::Stats => commands::control::stats(ctx).print(),
        Commands::Trigger {
            job_id,
            force,
            all,
            reset,
        } => {
            let flags = TriggerFlags {
                job_id,
                force,
                all,
                reset,
            };
            commands::control::trigger(ctx, flags).print()
        }
        Commands::Run => commands::run::run(ctx).await?.print(),
    }
}
