//! Depth-based fill projection.
//!
//! Pure function of a book snapshot and a size set: walking it twice on the
//! same inputs always yields identical bands.

use crate::config::SLIPPAGE_SIZES;
use crate::types::{round_to, OrderBook, Side, SlippageBand};

/// Projected average fill price and impact for each (side, size) pair.
/// Books with an empty side produce no bands — there is no mid to measure
/// impact against.
pub fn estimate(book: &OrderBook, sizes: &[f64]) -> Vec<SlippageBand> {
    if book.bids.is_empty() || book.asks.is_empty() {
        return Vec::new();
    }

    let mut bands = Vec::with_capacity(sizes.len() * 2);
    for &size in sizes {
        bands.push(walk(book, Side::Buy, size));
        bands.push(walk(book, Side::Sell, size));
    }
    bands
}

pub fn estimate_default(book: &OrderBook) -> Vec<SlippageBand> {
    estimate(book, &SLIPPAGE_SIZES)
}

fn walk(book: &OrderBook, side: Side, size: f64) -> SlippageBand {
    // A buy consumes asks, a sell consumes bids; levels are already in
    // price priority (best first).
    let levels = match side {
        Side::Buy => &book.asks,
        Side::Sell => &book.bids,
    };

    let mut remaining = size;
    let mut cost = 0.0;
    for level in levels {
        if remaining <= 0.0 {
            break;
        }
        let take = remaining.min(level.size);
        cost += take * level.price;
        remaining -= take;
    }

    let filled = size - remaining;
    let (avg_price, impact) = if filled <= 0.0 {
        (book.mid, 0.0)
    } else {
        let avg = cost / filled;
        let impact = match side {
            Side::Buy => avg - book.mid,
            Side::Sell => book.mid - avg,
        };
        (avg, impact)
    };
    let impact_pct = if book.mid != 0.0 { impact / book.mid } else { 0.0 };

    SlippageBand {
        side,
        size,
        avg_price: round_to(avg_price, 4),
        impact: round_to(impact, 4),
        impact_pct: round_to(impact_pct, 4),
    }
}
