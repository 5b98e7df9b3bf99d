use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

/// Immutable snapshot of a two-sided book. Bids sorted descending by price,
/// asks ascending; `mid` and `spread` are 0.0 when either side is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub token_id: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub mid: f64,
    pub spread: f64,
    pub updated_at_ms: u64,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

/// Canonical market shape for the primary venue. Recomputed on every cache
/// miss, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub title: String,
    pub category: String,
    /// Clamped to [0.05, 0.95] at normalization.
    pub probability: f64,
    pub updated_at_ms: u64,
}

/// Secondary-venue market metadata. Token ids shorter than 40 characters are
/// condition/market ids, not outcome-token ids — unusable for live pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueMarket {
    pub id: String,
    pub title: String,
    pub category: String,
    pub probability: f64,
    pub yes_token_id: Option<String>,
    pub no_token_id: Option<String>,
    pub condition_id: Option<String>,
    pub yes_price: Option<f64>,
    pub no_price: Option<f64>,
    pub volume_24h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub ts_ms: u64,
    pub price: f64,
    pub volume: f64,
}

// ---------------------------------------------------------------------------
// Slippage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Projected fill for one (side, size) pair against a book snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlippageBand {
    pub side: Side,
    pub size: f64,
    pub avg_price: f64,
    /// Absolute distance from mid; positive means paying through the book.
    pub impact: f64,
    pub impact_pct: f64,
}

// ---------------------------------------------------------------------------
// Strategy signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    pub ts_ms: u64,
    pub edge: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySignal {
    pub market_id: String,
    pub title: String,
    pub direction: Direction,
    /// Clamped to [0.5, 0.95].
    pub confidence: f64,
    pub edge: f64,
    pub updated_at_ms: u64,
    /// Last 5 samples for this market, persisted across cycles.
    pub history: Vec<SignalSample>,
}

// ---------------------------------------------------------------------------
// Spread comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadDirection {
    #[serde(rename = "primary-long")]
    PrimaryLong,
    #[serde(rename = "secondary-long")]
    SecondaryLong,
}

/// Where the secondary-venue probability came from: the live per-token feed
/// or the slower metadata feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Live,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadRow {
    pub market_id: String,
    pub title: String,
    pub primary_prob: f64,
    pub secondary_prob: f64,
    pub edge: f64,
    pub ev_pct: f64,
    pub direction: SpreadDirection,
    pub volume_24h: f64,
    pub liquidity_score: f64,
    pub action: String,
    pub hint: String,
    pub price_source: PriceSource,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    Above,
    Below,
}

impl std::fmt::Display for AlertDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertDirection::Above => write!(f, "above"),
            AlertDirection::Below => write!(f, "below"),
        }
    }
}

/// Threshold rule owned by the alert store. `last_triggered_ms` is stamped
/// by the evaluation cycle only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub market_id: String,
    pub title: String,
    pub direction: AlertDirection,
    pub threshold: f64,
    pub webhook: Option<String>,
    pub cooldown_minutes: u64,
    pub last_triggered_ms: Option<u64>,
}

/// User-submitted rule body, validated before any store mutation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub market_id: String,
    pub title: String,
    pub direction: AlertDirection,
    pub threshold: f64,
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub cooldown_minutes: Option<u64>,
}

// ---------------------------------------------------------------------------
// Fetch provenance
// ---------------------------------------------------------------------------

/// Whether a fetch produced live upstream data or the deterministic
/// synthetic fallback. Callers treat both uniformly; adapters log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Synthetic,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Live => write!(f, "live"),
            DataSource::Synthetic => write!(f, "synthetic"),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared numeric helpers
// ---------------------------------------------------------------------------

/// Round to `decimals` places at the point of external exposure.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

pub fn clamp_market_prob(p: f64) -> f64 {
    p.clamp(0.05, 0.95)
}

pub fn clamp_compare_prob(p: f64) -> f64 {
    p.clamp(0.01, 0.99)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_behaves_at_exposure_precision() {
        assert_eq!(round_to(0.61666, 3), 0.617);
        assert_eq!(round_to(1.6393, 1), 1.6);
        assert_eq!(round_to(0.016393, 4), 0.0164);
    }

    #[test]
    fn probability_clamps() {
        assert_eq!(clamp_market_prob(1.2), 0.95);
        assert_eq!(clamp_market_prob(-0.4), 0.05);
        assert_eq!(clamp_compare_prob(0.999), 0.99);
        assert_eq!(clamp_compare_prob(0.005), 0.01);
        assert_eq!(clamp_compare_prob(0.5), 0.5);
    }
}
