//! Background cadence: refresh markets, pre-warm the hottest instruments and
//! strategy outputs, then evaluate alert rules. One tick per refresh
//! interval, first tick immediate. Every branch is best-effort — a failing
//! upstream degrades to synthetic data inside the adapters, so a tick never
//! aborts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::alerts::AlertEngine;
use crate::config::{Config, WARM_TOP_MARKETS};
use crate::signals::SignalEngine;
use crate::store::MemoryStore;
use crate::types::Market;
use crate::venues::opinion::OpinionClient;

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub ok: bool,
    pub last_refresh_ms: u64,
    pub cache_hit_rate: f64,
}

pub struct Worker {
    cfg: Config,
    opinion: Arc<OpinionClient>,
    signals: Arc<SignalEngine>,
    alerts: Arc<AlertEngine>,
    backend: Arc<MemoryStore>,
    last_refresh_ms: AtomicU64,
}

impl Worker {
    pub fn new(
        cfg: Config,
        opinion: Arc<OpinionClient>,
        signals: Arc<SignalEngine>,
        alerts: Arc<AlertEngine>,
        backend: Arc<MemoryStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            opinion,
            signals,
            alerts,
            backend,
            last_refresh_ms: AtomicU64::new(0),
        })
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.cfg.refresh_interval_secs));
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        let markets = self.opinion.list_markets(None).await;

        // Independent fetches, joined with partial-result semantics.
        join_all(
            markets
                .iter()
                .take(WARM_TOP_MARKETS)
                .map(|m| self.warm_market(m)),
        )
        .await;
        tokio::join!(self.signals.strategy_signals(), self.signals.spread_rows());

        let summary = self.alerts.evaluate(&markets, now_ms()).await;
        self.last_refresh_ms.store(now_ms(), Ordering::Relaxed);

        info!(
            markets = markets.len(),
            alerts_evaluated = summary.evaluated,
            alerts_triggered = summary.triggered,
            errors = summary.errors.len(),
            "worker tick complete",
        );
        for err in &summary.errors {
            warn!("cycle error: {err}");
        }
    }

    async fn warm_market(&self, market: &Market) {
        let (book, history) = tokio::join!(
            self.opinion.get_orderbook(&market.id),
            self.opinion.get_history(&market.id, None, None),
        );
        let bands = crate::slippage::estimate_default(&book);
        debug!(
            market_id = %market.id,
            bands = bands.len(),
            points = history.len(),
            "prewarmed"
        );
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            ok: true,
            last_refresh_ms: self.last_refresh_ms.load(Ordering::Relaxed),
            cache_hit_rate: self.backend.hit_rate(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
