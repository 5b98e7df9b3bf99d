//! Deterministic placeholder data for failed upstream fetches.
//!
//! Seeded from the instrument id so repeated failures produce repeatable
//! output and derived computations keep functioning on stable (if
//! fictitious) numbers.

use crate::types::{round_to, HistoryPoint, Market, OrderBook, PriceLevel};

/// Stable hash of the seed mapped into [0.1, 0.9].
pub fn deterministic_probability(seed: &str) -> f64 {
    let hash = seed
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    0.1 + (hash % 81) as f64 / 100.0
}

/// Ten sample markets with a gently rising probability ladder.
pub fn markets(now_ms: u64) -> Vec<Market> {
    (0..10)
        .map(|idx| Market {
            id: format!("mock-{idx}"),
            title: format!("Sample market {}", idx + 1),
            category: if idx % 2 == 0 { "Macro" } else { "Crypto" }.to_string(),
            probability: 0.35 + idx as f64 * 0.02,
            updated_at_ms: now_ms,
        })
        .collect()
}

/// Eight levels a side, one cent apart, widening ask size and thinning bid
/// size away from the seeded mid.
pub fn order_book(token_id: &str, now_ms: u64) -> OrderBook {
    let base = deterministic_probability(token_id);
    let bids: Vec<PriceLevel> = (0..8)
        .map(|i| PriceLevel {
            price: round_to(base - i as f64 * 0.01, 3),
            size: round_to((2.5 - i as f64 * 0.2).max(0.2), 2),
        })
        .collect();
    let asks: Vec<PriceLevel> = (0..8)
        .map(|i| PriceLevel {
            price: round_to(base + i as f64 * 0.01, 3),
            size: round_to((2.0 + i as f64 * 0.25).max(0.2), 2),
        })
        .collect();
    let spread = round_to(asks[0].price - bids[0].price, 3);
    OrderBook {
        token_id: token_id.to_string(),
        bids,
        asks,
        mid: round_to(base, 3),
        spread,
        updated_at_ms: now_ms,
    }
}

/// One point per minute ending at `now_ms`, drifting sinusoidally around the
/// seeded start price.
pub fn history(token_id: &str, limit: usize, now_ms: u64) -> Vec<HistoryPoint> {
    let start = deterministic_probability(token_id);
    (0..limit)
        .map(|idx| {
            let i = idx as f64;
            let sign = if idx % 2 == 0 { 1.0 } else { -1.0 };
            let drift = ((i / 5.0).sin() * 0.05 + i * 0.002) * sign;
            let price = (start + drift).clamp(0.05, 0.95);
            let volume = (50.0 + i.sin().abs() * 40.0 + i * 2.0).round();
            HistoryPoint {
                ts_ms: now_ms - ((limit - 1 - idx) as u64) * 60_000,
                price: round_to(price, 3),
                volume,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_is_pure_and_in_range() {
        let long = "x".repeat(64);
        for seed in ["", "a", "token-123", "0x4f2a", long.as_str()] {
            let first = deterministic_probability(seed);
            assert_eq!(first, deterministic_probability(seed), "seed {seed:?}");
            assert!((0.1..=0.9).contains(&first), "seed {seed:?} → {first}");
        }
        assert_ne!(
            deterministic_probability("alpha"),
            deterministic_probability("beta"),
        );
    }

    #[test]
    fn order_book_is_deterministic_and_sane() {
        let a = order_book("tok", 1_000);
        let b = order_book("tok", 1_000);
        assert_eq!(a.bids, b.bids);
        assert_eq!(a.asks, b.asks);

        assert_eq!(a.bids.len(), 8);
        assert_eq!(a.asks.len(), 8);
        assert!(a.bids.windows(2).all(|w| w[0].price >= w[1].price));
        assert!(a.asks.windows(2).all(|w| w[0].price <= w[1].price));
        assert!(a.mid >= 0.0);
        assert!(a.spread >= 0.0);
        assert!(a.bids.iter().chain(&a.asks).all(|l| l.size >= 0.2));
    }

    #[test]
    fn history_is_minute_spaced_and_clamped() {
        let points = history("tok", 50, 3_000_000);
        assert_eq!(points.len(), 50);
        assert_eq!(points.last().unwrap().ts_ms, 3_000_000);
        assert!(points.windows(2).all(|w| w[1].ts_ms - w[0].ts_ms == 60_000));
        assert!(points.iter().all(|p| (0.05..=0.95).contains(&p.price)));
    }
}
