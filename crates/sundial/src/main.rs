//! Sundial: durable publish scheduler.
//!
//! Schedules one-shot publish triggers for social posts, fires them through
//! the downstream publishing webhook with bounded retries, and reconciles
//! missed work against the posts API after downtime.

use std::path::PathBuf;

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod daemon;

#[derive(Parser)]
#[command(name = "sundial")]
#[command(about = "Durable publish scheduler", long_about = None)]
struct Cli {
    /// Base URL of the posts API (system of record)
    #[arg(long, env = "SUNDIAL_API_URL")]
    api_url: String,

    /// URL of the downstream publishing webhook
    #[arg(long, env = "SUNDIAL_WEBHOOK_URL")]
    webhook_url: String,

    /// Path of the durable job file
    #[arg(long, env = "SUNDIAL_STORE_PATH", default_value = "sundial-jobs.json")]
    store_path: PathBuf,

    /// HTTP port for the scheduling API
    #[arg(long, env = "SUNDIAL_PORT", default_value = "8080")]
    port: u16,

    /// Number of firing workers
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Seconds between catch-up reconciliation passes
    #[arg(long, default_value = "300")]
    catchup_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sundial=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    daemon::run(daemon::DaemonConfig {
        api_url: cli.api_url,
        webhook_url: cli.webhook_url,
        store_path: cli.store_path,
        port: cli.port,
        workers: cli.workers,
        catchup_interval: cli.catchup_interval,
    })
    .await
}
