//! Pairs primary-venue markets with their best-guess secondary counterparts.
//!
//! Matching is normalized-title containment in either direction: every token
//! of the shorter title must appear in the longer one, with prefix tolerance
//! so inflections ("hold"/"holds") still line up. When no textual match
//! exists the pair falls back to a positional pick so signal computation
//! never collapses — a known approximation, not a precision matcher. The two
//! cases are distinguished so downstream consumers can tell a confident
//! match from a guess.

use tracing::debug;

use crate::types::{Market, VenueMarket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConfidence {
    /// Normalized titles contain one another.
    Title,
    /// Positional fallback: `secondary[idx % len]`.
    Positional,
}

#[derive(Debug)]
pub struct MatchedPair<'a> {
    pub market: &'a Market,
    pub counterpart: &'a VenueMarket,
    pub confidence: MatchConfidence,
}

/// Lowercase, keep only alphanumerics (any script) and whitespace, collapse
/// runs of whitespace.
pub fn normalize_title(s: &str) -> String {
    let lowered = s.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Either normalized title contains the other, token-wise.
pub fn titles_match(a: &str, b: &str) -> bool {
    let a: Vec<&str> = a.split_whitespace().collect();
    let b: Vec<&str> = b.split_whitespace().collect();
    contains_tokens(&a, &b) || contains_tokens(&b, &a)
}

fn contains_tokens(longer: &[&str], shorter: &[&str]) -> bool {
    shorter.iter().all(|t| {
        longer.iter().any(|l| l.starts_with(t) || t.starts_with(l))
    })
}

/// Pair each of the top `max` primary markets with a secondary counterpart.
/// Returns nothing when the secondary venue returned no entries.
pub fn match_markets<'a>(
    primary: &'a [Market],
    secondary: &'a [VenueMarket],
    max: usize,
) -> Vec<MatchedPair<'a>> {
    if secondary.is_empty() {
        return Vec::new();
    }

    primary
        .iter()
        .take(max)
        .enumerate()
        .map(|(idx, market)| {
            let base = normalize_title(&market.title);
            let textual = secondary
                .iter()
                .find(|p| titles_match(&base, &normalize_title(&p.title)));
            let (counterpart, confidence) = match textual {
                Some(p) => (p, MatchConfidence::Title),
                None => {
                    let p = &secondary[idx % secondary.len()];
                    debug!(
                        market_id = %market.id,
                        counterpart_id = %p.id,
                        "no title match, positional pairing"
                    );
                    (p, MatchConfidence::Positional)
                }
            };
            MatchedPair { market, counterpart, confidence }
        })
        .collect()
}
