mod alerts;
mod config;
mod error;
mod matcher;
mod signals;
mod slippage;
mod store;
mod types;
mod venues;
mod worker;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::alerts::{AlertEngine, AlertStore, WebhookSink};
use crate::config::Config;
use crate::error::Result;
use crate::signals::SignalEngine;
use crate::store::{Cache, KeyValueStore, MemoryStore};
use crate::venues::opinion::OpinionClient;
use crate::venues::polymarket::PolymarketClient;
use crate::worker::Worker;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let backend = MemoryStore::new();
    let cache = Cache::new(backend.clone() as Arc<dyn KeyValueStore>);

    let opinion = Arc::new(OpinionClient::new(&cfg, cache.clone()));
    let polymarket = Arc::new(PolymarketClient::new(&cfg, cache.clone()));
    let signals = Arc::new(SignalEngine::new(
        Arc::clone(&opinion),
        Arc::clone(&polymarket),
        cache.clone(),
    ));

    let alert_store = AlertStore::new(backend.clone() as Arc<dyn KeyValueStore>);
    let alerts = Arc::new(AlertEngine::new(
        alert_store,
        Arc::new(WebhookSink::new()),
        cfg.default_webhook.clone(),
        cfg.site_url.clone(),
    ));

    // --- Bootstrap: first market listing (live or synthetic) ---
    let markets = opinion.list_markets(None).await;
    info!(
        "Bootstrap complete: {} markets (refresh every {}s)",
        markets.len(),
        cfg.refresh_interval_secs,
    );
    if cfg.default_webhook.is_empty() {
        info!("ALERT_WEBHOOK not set — rules without their own webhook are stamped, not delivered");
    }

    // --- Worker cadence: warm caches + evaluate alerts ---
    let worker = Worker::new(cfg, opinion, signals, alerts, backend);
    tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.run().await }
    });

    tokio::signal::ctrl_c().await?;
    let health = worker.health();
    info!(
        last_refresh_ms = health.last_refresh_ms,
        cache_hit_rate = health.cache_hit_rate,
        "Shutting down",
    );
    Ok(())
}
