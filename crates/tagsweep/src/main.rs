//! tagsweep binary: prune unused metric tag cardinality per organization.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tagsweep::config::{self, Settings, DEFAULT_BASE_URL};
use tagsweep::orchestrator;

/// Reconciles allowed metric tags on Datadog from monitor and dashboard usage.
#[derive(Parser)]
#[command(name = "tagsweep")]
#[command(about = "Reconciles allowed metric tags on Datadog from monitor and dashboard usage")]
#[command(version)]
struct Cli {
    /// Datadog API root; version segments are appended to this.
    #[arg(long, env = "DATADOG_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Steady-state request budget per second.
    #[arg(long, default_value = "5")]
    requests_per_second: usize,

    /// Maximum 429 retries per request before giving up.
    #[arg(long, default_value = "8")]
    max_rate_limit_retries: u32,

    /// Trailing window in days for the active metric listing.
    #[arg(long, default_value = "7")]
    metrics_window_days: i64,

    /// Trailing window in seconds for the related-assets tag listing.
    #[arg(long, default_value = "2592000")]
    related_window_seconds: u64,

    /// Concurrent dashboard detail fetches.
    #[arg(long, default_value = "4")]
    dashboard_concurrency: usize,

    /// Log decisions without deleting or writing tag configurations.
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let credentials = config::credentials_from_env()?;

    let settings = Settings {
        base_url: cli.base_url,
        requests_per_second: cli.requests_per_second,
        max_rate_limit_retries: cli.max_rate_limit_retries,
        metrics_window_days: cli.metrics_window_days,
        related_window_seconds: cli.related_window_seconds,
        dashboard_concurrency: cli.dashboard_concurrency,
        dry_run: cli.dry_run,
    };

    orchestrator::run(&credentials, &settings).await
}
