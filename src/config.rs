use std::time::Duration;

use crate::error::{AppError, Result};

pub const OPINION_API_URL: &str = "https://proxy.opinion.trade:8443/openapi";
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";
pub const CLOB_API_URL: &str = "https://clob.polymarket.com";
pub const FILLS_SUBGRAPH_URL: &str =
    "https://api.goldsky.com/api/public/project_cl6mb8i9h0003e201j6li0diw/subgraphs/activity-subgraph/0.0.4/gn";

/// HTTP timeout for all upstream venue calls (seconds).
pub const UPSTREAM_TIMEOUT_SECS: u64 = 10;

/// Cache TTL tiers. Synthetic fallback data is cached under the same tier as
/// live data so a failing upstream is not hammered on every call.
pub mod ttl {
    use std::time::Duration;

    /// Primary-venue market listings.
    pub const MARKETS: Duration = Duration::from_secs(20);
    /// Order book snapshots.
    pub const ORDER_BOOK: Duration = Duration::from_secs(15);
    /// Per-token live prices (CLOB).
    pub const LIVE_PRICE: Duration = Duration::from_secs(15);
    /// Price history series.
    pub const HISTORY: Duration = Duration::from_secs(300);
    /// Secondary-venue metadata listings (slower, broader feed).
    pub const VENUE_META: Duration = Duration::from_secs(120);
    /// Derived strategy outputs (signals, spread rows, history rings).
    pub const STRATEGY: Duration = Duration::from_secs(120);
}

/// Signals below this absolute edge are suppressed as noise.
pub const EDGE_DEAD_ZONE: f64 = 0.03;

/// At most this many primary markets are paired per evaluation cycle.
pub const MAX_SIGNAL_CANDIDATES: usize = 12;

/// Token ids at least this long are real outcome-token ids usable for live
/// price lookups. Shorter ids are condition/market ids and must be rejected.
pub const MIN_LIVE_TOKEN_ID_LEN: usize = 40;

/// Trade sizes projected by the slippage estimator.
pub const SLIPPAGE_SIZES: [f64; 3] = [100.0, 500.0, 1000.0];

/// Markets warmed (order book + history) at the top of each worker tick.
pub const WARM_TOP_MARKETS: usize = 3;

/// Alert cooldown bounds (minutes) and default.
pub const COOLDOWN_MIN_MINUTES: u64 = 1;
pub const COOLDOWN_MAX_MINUTES: u64 = 1440;
pub const COOLDOWN_DEFAULT_MINUTES: u64 = 30;

/// History fetch defaults: interval and point limit (hard cap 200).
pub const HISTORY_DEFAULT_INTERVAL: &str = "1h";
pub const HISTORY_DEFAULT_LIMIT: usize = 50;
pub const HISTORY_MAX_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct Config {
    pub opinion_api_url: String,
    /// Sent as an `apikey` header when non-empty (OPINION_API_KEY).
    pub opinion_api_key: String,
    pub gamma_api_url: String,
    pub clob_api_url: String,
    pub subgraph_url: String,
    pub log_level: String,
    /// Worker cadence in seconds (REFRESH_INTERVAL_SECS).
    pub refresh_interval_secs: u64,
    /// Fallback webhook used when a rule has none (ALERT_WEBHOOK).
    pub default_webhook: String,
    /// Link appended to alert messages (SITE_URL).
    pub site_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            opinion_api_url: std::env::var("OPINION_API_URL")
                .unwrap_or_else(|_| OPINION_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            opinion_api_key: std::env::var("OPINION_API_KEY").unwrap_or_default(),
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| GAMMA_API_URL.to_string()),
            clob_api_url: std::env::var("CLOB_API_URL")
                .unwrap_or_else(|_| CLOB_API_URL.to_string()),
            subgraph_url: std::env::var("FILLS_SUBGRAPH_URL")
                .unwrap_or_else(|_| FILLS_SUBGRAPH_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            refresh_interval_secs: std::env::var("REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    AppError::Config("REFRESH_INTERVAL_SECS must be an integer".to_string())
                })?,
            default_webhook: std::env::var("ALERT_WEBHOOK").unwrap_or_default(),
            site_url: std::env::var("SITE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(UPSTREAM_TIMEOUT_SECS)
    }
}
