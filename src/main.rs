//! Tier Cache - A multi-tier in-process cache
//!
//! Standalone runner: builds the cache from configuration, keeps the expiration
//! reaper alive until shutdown and reports the final statistics.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tier_cache::{spawn_reaper, CacheConfig, CacheManager};

/// Main entry point for the cache runner.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from the JSON file named by the first argument, if any
/// 3. Create the cache manager with the configured tiers
/// 4. Start the background expiration reaper
/// 5. Wait for SIGINT/SIGTERM, then stop the reaper and log final stats
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tier_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tier Cache");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path))?;
            CacheConfig::from_json(&raw).with_context(|| format!("parsing config file {}", path))?
        }
        None => CacheConfig::default(),
    };
    for tier in &config.tiers {
        info!(
            tier = %tier.name,
            ttl_ms = tier.ttl.as_millis() as u64,
            max_entries = tier.max_entries,
            "Tier configured"
        );
    }

    let cache: Arc<CacheManager<Value>> = Arc::new(CacheManager::new(&config)?);
    info!("Cache manager initialized");

    let reaper = spawn_reaper(cache.clone(), config.reaper_interval);

    shutdown_signal().await;

    reaper.abort();
    warn!("Expiration reaper aborted");

    info!(stats = %serde_json::to_string(&cache.stats())?, "Final cache statistics");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
