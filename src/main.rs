//! txnstore server
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        txnstore                               │
//! ├──────────────────────────────────────────────────────────────┤
//! │  API server (:8080)          Ops server (:8081)               │
//! │  /transactions               /healthz /livez /readyz /metrics │
//! │        │                              │                       │
//! │        └──────────┬───────────────────┘                       │
//! │                   ▼                                           │
//! │            TransactionStore                                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use txnstore::api::{self, HealthCheck};
use txnstore::store::{
    AdmissionConfig, PageCacheConfig, StoreConfig, TransactionStore, DEFAULT_ADMISSION_TIMEOUT,
    DEFAULT_MAX_CONCURRENT, DEFAULT_PAGE_CACHE_ENTRIES,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// txnstore - in-memory transaction record store over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API server bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Health and metrics server bind address
    #[arg(long, env = "OPS_ADDR", default_value = "0.0.0.0:8081")]
    ops_addr: String,

    /// Maximum concurrently executing store operations
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value_t = DEFAULT_MAX_CONCURRENT)]
    max_concurrent_requests: usize,

    /// Slots in the timed admission tier (defaults to max-concurrent-requests)
    #[arg(long, env = "ADMISSION_SLOTS")]
    admission_slots: Option<usize>,

    /// Longest wait for an admission slot, in milliseconds
    #[arg(
        long,
        env = "ADMISSION_TIMEOUT_MS",
        default_value_t = DEFAULT_ADMISSION_TIMEOUT.as_millis() as u64
    )]
    admission_timeout_ms: u64,

    /// Maximum number of cached list pages
    #[arg(long, env = "PAGE_CACHE_ENTRIES", default_value_t = DEFAULT_PAGE_CACHE_ENTRIES)]
    page_cache_entries: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            admission: AdmissionConfig {
                max_active: self.max_concurrent_requests,
                slots: self
                    .admission_slots
                    .unwrap_or(self.max_concurrent_requests),
                timeout: Duration::from_millis(self.admission_timeout_ms),
            },
            page_cache: PageCacheConfig {
                max_entries: self.page_cache_entries,
            },
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = args.store_config();
    config.validate().context("invalid store configuration")?;

    info!("Starting txnstore");
    info!("  API address: {}", args.listen_addr);
    info!("  Ops address: {}", args.ops_addr);
    info!(
        "  Admission: max {} in flight, {} slots, {:?} timeout",
        config.admission.max_active, config.admission.slots, config.admission.timeout
    );
    info!("  Page cache entries: {}", config.page_cache.max_entries);

    let store = TransactionStore::shared(config);
    let health = Arc::new(HealthCheck::new());
    let shutdown = CancellationToken::new();

    let ops_listener = api::bind(&args.ops_addr, "ops")
        .await
        .context("starting ops server")?;
    let ops_task = tokio::spawn(api::run_ops_server(
        ops_listener,
        Arc::clone(&store),
        Arc::clone(&health),
        shutdown.clone(),
    ));

    let api_listener = api::bind(&args.listen_addr, "API")
        .await
        .context("starting API server")?;
    health.set_ready(true);

    let signal_token = shutdown.clone();
    let signal_health = Arc::clone(&health);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        signal_health.set_ready(false);
        signal_token.cancel();
    });

    api::run_api_server(api_listener, store, shutdown.clone()).await?;

    shutdown.cancel();
    match ops_task.await {
        Ok(Err(e)) => error!("Ops server error: {}", e),
        Err(e) => error!("Ops server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("txnstore shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => args.log_level.to_lowercase(),
        _ => "info".to_string(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn", level)));

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
