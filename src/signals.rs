//! Cross-venue signal derivation.
//!
//! Two outputs per cycle, both recomputed wholesale on cache miss: strategy
//! signals (dead-zoned, confidence-scored, with a persisted per-market
//! sample ring) and the raw spread-comparison table (unconditional, no
//! ring). Scoring combines spread, depth, and volatility.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::info;

use crate::config::{ttl, EDGE_DEAD_ZONE, MAX_SIGNAL_CANDIDATES, MIN_LIVE_TOKEN_ID_LEN};
use crate::matcher::{self, MatchConfidence, MatchedPair};
use crate::store::Cache;
use crate::types::{
    clamp_compare_prob, clamp_market_prob, round_to, Direction, Market, PriceSource,
    SignalSample, SpreadDirection, SpreadRow, StrategySignal, VenueMarket,
};
use crate::venues::opinion::OpinionClient;
use crate::venues::polymarket::PolymarketClient;
use crate::venues::now_ms;

const SIGNALS_KEY: &str = "strategy:signals";
const SPREADS_KEY: &str = "strategy:spreads";
const HISTORY_RING_KEY: &str = "strategy:history";

/// Samples retained per market across evaluation cycles.
const RING_CAP: usize = 5;

/// market_id → recent samples, read-modify-written through the cache.
type HistoryRing = HashMap<String, Vec<SignalSample>>;

pub struct SignalEngine {
    opinion: Arc<OpinionClient>,
    polymarket: Arc<PolymarketClient>,
    cache: Cache,
}

impl SignalEngine {
    pub fn new(
        opinion: Arc<OpinionClient>,
        polymarket: Arc<PolymarketClient>,
        cache: Cache,
    ) -> Self {
        Self { opinion, polymarket, cache }
    }

    /// Confidence-scored directional signals for matched pairs clearing the
    /// dead zone.
    pub async fn strategy_signals(&self) -> Vec<StrategySignal> {
        if let Some(cached) = self.cache.get::<Vec<StrategySignal>>(SIGNALS_KEY) {
            // Only trust a warm set that already carries ring history.
            if cached.first().is_some_and(|s| !s.history.is_empty()) {
                return cached;
            }
        }

        let (primary, secondary) = self.fetch_both_venues().await;
        let pairs = matcher::match_markets(&primary, &secondary, MAX_SIGNAL_CANDIDATES);
        let now = now_ms();

        let evaluated = join_all(pairs.iter().map(|p| self.evaluate_pair(p, now))).await;

        let mut ring: HistoryRing = self.cache.get(HISTORY_RING_KEY).unwrap_or_default();
        let mut signals = Vec::new();
        for mut sig in evaluated.into_iter().flatten() {
            let samples = ring.entry(sig.market_id.clone()).or_default();
            push_sample(
                samples,
                SignalSample { ts_ms: now, edge: sig.edge, confidence: sig.confidence },
            );
            sig.history = samples.clone();
            signals.push(sig);
        }

        self.cache.set(HISTORY_RING_KEY, &ring, ttl::STRATEGY);
        self.cache.set(SIGNALS_KEY, &signals, ttl::STRATEGY);
        let positional = pairs
            .iter()
            .filter(|p| p.confidence == MatchConfidence::Positional)
            .count();
        info!(
            count = signals.len(),
            pairs = pairs.len(),
            positional,
            "strategy signals refreshed",
        );
        signals
    }

    /// Raw spread rows for every matched pair — no dead zone, no ring.
    pub async fn spread_rows(&self) -> Vec<SpreadRow> {
        if let Some(cached) = self.cache.get::<Vec<SpreadRow>>(SPREADS_KEY) {
            return cached;
        }

        let (primary, secondary) = self.fetch_both_venues().await;
        let pairs = matcher::match_markets(&primary, &secondary, MAX_SIGNAL_CANDIDATES);

        let rows = join_all(pairs.iter().map(|p| self.spread_row(p))).await;

        self.cache.set(SPREADS_KEY, &rows, ttl::STRATEGY);
        info!(count = rows.len(), "spread comparison refreshed");
        rows
    }

    async fn fetch_both_venues(&self) -> (Vec<Market>, Vec<VenueMarket>) {
        let (primary, secondary) =
            tokio::join!(self.opinion.list_markets(None), self.polymarket.list_markets());
        let secondary = secondary
            .into_iter()
            .filter(|p| p.probability > 0.0 && !p.id.is_empty())
            .collect();
        (primary, secondary)
    }

    async fn evaluate_pair(
        &self,
        pair: &MatchedPair<'_>,
        now_ms: u64,
    ) -> Option<StrategySignal> {
        let primary_prob = clamp_market_prob(pair.market.probability);
        let secondary_prob = self.secondary_prob(pair.counterpart).await.0;

        // Skip the depth/volatility fetches entirely inside the dead zone.
        if (primary_prob - secondary_prob).abs() < EDGE_DEAD_ZONE {
            return None;
        }

        let native = native_token_id(pair.counterpart);
        let top_depth = match native {
            Some(token_id) => {
                let book = self.opinion.get_orderbook(token_id).await;
                book.best_bid().map_or(0.0, |l| l.size) + book.best_ask().map_or(0.0, |l| l.size)
            }
            None => 0.0,
        };
        let depth = depth_score(top_depth, pair.counterpart.volume_24h);

        let prices = self.price_series(pair.counterpart, native).await;
        let vol = vol_score(&prices);

        signal_from_components(pair.market, primary_prob, secondary_prob, depth, vol, now_ms)
    }

    async fn spread_row(&self, pair: &MatchedPair<'_>) -> SpreadRow {
        let primary_prob = clamp_market_prob(pair.market.probability);
        let (secondary_raw, source) = self.secondary_prob(pair.counterpart).await;
        build_spread_row(
            pair.market,
            pair.counterpart,
            primary_prob,
            clamp_compare_prob(secondary_raw),
            source,
        )
    }

    /// Live per-token price when the counterpart carries a usable token id,
    /// else the metadata feed's price.
    async fn secondary_prob(&self, counterpart: &VenueMarket) -> (f64, PriceSource) {
        let live = match counterpart.yes_token_id.as_deref() {
            Some(token_id) => self.polymarket.live_price(token_id).await,
            None => None,
        };
        match live {
            Some(price) => (price, PriceSource::Live),
            None => (
                counterpart.yes_price.unwrap_or(counterpart.probability),
                PriceSource::Fallback,
            ),
        }
    }

    /// Volatility input: fills by condition id, else the primary venue's
    /// native history for short token ids, else nothing.
    async fn price_series(
        &self,
        counterpart: &VenueMarket,
        native: Option<&str>,
    ) -> Vec<f64> {
        let history = if let Some(condition_id) = counterpart.condition_id.as_deref() {
            self.polymarket.fill_history(condition_id).await
        } else if let Some(token_id) = native {
            self.opinion.get_history(token_id, None, None).await
        } else {
            Vec::new()
        };
        history.iter().map(|h| h.price).filter(|p| p.is_finite()).collect()
    }
}

/// Counterpart token id usable against the primary venue's own book —
/// i.e. a short (native) id, not a long outcome-token id.
fn native_token_id(counterpart: &VenueMarket) -> Option<&str> {
    counterpart
        .yes_token_id
        .as_deref()
        .filter(|t| t.len() < MIN_LIVE_TOKEN_ID_LEN)
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Top-of-book depth saturating at 10, else a log-volume liquidity proxy.
fn depth_score(top_depth: f64, volume_24h: f64) -> f64 {
    if top_depth > 0.0 {
        (top_depth / 10.0).min(1.0)
    } else {
        ((volume_24h + 1.0).log10() / 3.0).min(1.0)
    }
}

/// Coefficient of variation normalized so 50% maps to full score. Fewer
/// than 6 points defaults to a fixed small volatility.
fn vol_score(prices: &[f64]) -> f64 {
    let vol = if prices.len() >= 6 {
        stdev(prices) / mean(prices).max(0.01)
    } else {
        0.1
    };
    (vol / 0.5).min(1.0)
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation; 0 for fewer than two points.
fn stdev(xs: &[f64]) -> f64 {
    if xs.len() <= 1 {
        return 0.0;
    }
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    variance.sqrt()
}

/// Dead-zoned, confidence-scored signal. Weights: 50% spread, 30% depth,
/// 20% volatility.
fn signal_from_components(
    market: &Market,
    primary_prob: f64,
    secondary_prob: f64,
    depth_score: f64,
    vol_score: f64,
    now_ms: u64,
) -> Option<StrategySignal> {
    let edge = primary_prob - secondary_prob;
    if edge.abs() < EDGE_DEAD_ZONE {
        return None;
    }

    let spread_score = (edge.abs() / 0.2).min(1.0);
    let confidence = (0.5 * spread_score + 0.3 * depth_score + 0.2 * vol_score).clamp(0.5, 0.95);

    Some(StrategySignal {
        market_id: market.id.clone(),
        title: market.title.clone(),
        direction: if edge > 0.0 { Direction::Long } else { Direction::Short },
        confidence,
        edge: round_to(edge, 3),
        updated_at_ms: now_ms,
        history: Vec::new(),
    })
}

fn build_spread_row(
    market: &Market,
    counterpart: &VenueMarket,
    primary_prob: f64,
    secondary_prob: f64,
    price_source: PriceSource,
) -> SpreadRow {
    let edge = round_to(primary_prob - secondary_prob, 3);
    let liquidity_score = ((counterpart.volume_24h + 10.0).log10() / 3.0).min(1.0);
    let hint = if liquidity_score >= 0.66 {
        "Good liquidity, split 500-1k"
    } else if liquidity_score >= 0.40 {
        "Moderate liquidity, prefer small probes"
    } else {
        "Weak liquidity, mind slippage"
    };

    SpreadRow {
        market_id: market.id.clone(),
        title: market.title.clone(),
        primary_prob,
        secondary_prob,
        edge,
        ev_pct: round_to(edge * 100.0, 1),
        direction: if edge >= 0.0 {
            SpreadDirection::PrimaryLong
        } else {
            SpreadDirection::SecondaryLong
        },
        volume_24h: counterpart.volume_24h,
        liquidity_score,
        action: if edge >= 0.0 {
            "Buy Opinion / Sell Polymarket"
        } else {
            "Buy Polymarket / Sell Opinion"
        }
        .to_string(),
        hint: hint.to_string(),
        price_source,
    }
}

/// Append to a market's sample ring, dropping the oldest past the cap.
fn push_sample(ring: &mut Vec<SignalSample>, sample: SignalSample) {
    ring.push(sample);
    if ring.len() > RING_CAP {
        let excess = ring.len() - RING_CAP;
        ring.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(id: &str) -> Market {
        Market {
            id: id.to_string(),
            title: format!("market {id}"),
            category: "General".to_string(),
            probability: 0.5,
            updated_at_ms: 0,
        }
    }

    fn counterpart(volume_24h: f64) -> VenueMarket {
        VenueMarket {
            id: "c".to_string(),
            title: "counterpart".to_string(),
            category: "General".to_string(),
            probability: 0.5,
            yes_token_id: None,
            no_token_id: None,
            condition_id: None,
            yes_price: None,
            no_price: None,
            volume_24h,
        }
    }

    #[test]
    fn dead_zone_suppresses_small_edges() {
        let m = market("m1");
        assert!(signal_from_components(&m, 0.52, 0.50, 1.0, 1.0, 0).is_none());
        assert!(signal_from_components(&m, 0.50, 0.529, 1.0, 1.0, 0).is_none());
        // Exactly at the threshold the signal survives.
        let sig = signal_from_components(&m, 0.53, 0.50, 1.0, 1.0, 0).unwrap();
        assert_eq!(sig.direction, Direction::Long);
        assert_eq!(sig.edge, 0.03);
    }

    #[test]
    fn direction_follows_edge_sign() {
        let m = market("m1");
        let short = signal_from_components(&m, 0.40, 0.50, 0.0, 0.0, 0).unwrap();
        assert_eq!(short.direction, Direction::Short);
        assert_eq!(short.edge, -0.1);
    }

    #[test]
    fn confidence_stays_in_band() {
        let m = market("m1");
        // Weak components floor at 0.5.
        let weak = signal_from_components(&m, 0.54, 0.50, 0.0, 0.0, 0).unwrap();
        assert_eq!(weak.confidence, 0.5);
        // Saturated components cap at 0.95.
        let strong = signal_from_components(&m, 0.90, 0.10, 1.0, 1.0, 0).unwrap();
        assert_eq!(strong.confidence, 0.95);
    }

    #[test]
    fn depth_score_prefers_real_book_depth() {
        assert_eq!(depth_score(5.0, 1_000_000.0), 0.5);
        assert_eq!(depth_score(40.0, 0.0), 1.0);
        // No book depth: log-volume proxy.
        assert!((depth_score(0.0, 999.0) - 1.0).abs() < 1e-9);
        assert_eq!(depth_score(0.0, 0.0), 0.0);
    }

    #[test]
    fn vol_score_defaults_below_six_points() {
        assert!((vol_score(&[0.5; 5]) - 0.2).abs() < 1e-9);
        // Six identical prices: zero stdev, zero score.
        assert_eq!(vol_score(&[0.5; 6]), 0.0);
        assert!(vol_score(&[0.1, 0.9, 0.1, 0.9, 0.1, 0.9]) > 0.5);
    }

    #[test]
    fn ring_never_exceeds_cap() {
        let mut ring = Vec::new();
        for i in 0..8u64 {
            push_sample(
                &mut ring,
                SignalSample { ts_ms: i, edge: 0.1, confidence: 0.6 },
            );
        }
        assert_eq!(ring.len(), RING_CAP);
        // Oldest dropped, most recent retained in order.
        assert_eq!(ring.first().unwrap().ts_ms, 3);
        assert_eq!(ring.last().unwrap().ts_ms, 7);
    }

    #[test]
    fn spread_row_buckets_hint_and_action() {
        let m = market("m1");

        let liquid = build_spread_row(&m, &counterpart(1_000_000.0), 0.6, 0.5, PriceSource::Live);
        assert_eq!(liquid.hint, "Good liquidity, split 500-1k");
        assert_eq!(liquid.direction, SpreadDirection::PrimaryLong);
        assert_eq!(liquid.action, "Buy Opinion / Sell Polymarket");
        assert_eq!(liquid.edge, 0.1);
        assert_eq!(liquid.ev_pct, 10.0);

        let thin = build_spread_row(&m, &counterpart(0.0), 0.45, 0.5, PriceSource::Fallback);
        assert_eq!(thin.hint, "Weak liquidity, mind slippage");
        assert_eq!(thin.direction, SpreadDirection::SecondaryLong);
        assert_eq!(thin.action, "Buy Polymarket / Sell Opinion");

        let mid = build_spread_row(&m, &counterpart(50.0), 0.5, 0.5, PriceSource::Fallback);
        assert_eq!(mid.hint, "Moderate liquidity, prefer small probes");
        // Zero edge counts as primary-long, same as the action wording.
        assert_eq!(mid.direction, SpreadDirection::PrimaryLong);
    }
}
