pub mod fallback;
pub mod opinion;
pub mod polymarket;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Declarative field lookup
// ---------------------------------------------------------------------------
//
// Venue payloads vary in shape, so each canonical field is read through an
// ordered list of candidate keys evaluated once per normalization call.

/// First candidate key holding a non-empty string.
pub(crate) fn pick_str<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| v.get(k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

/// First candidate key holding a number, or a string that parses as one.
pub(crate) fn pick_f64(v: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| numeric(v.get(k)?))
}

/// Number or numeric-string coercion for a single value.
pub(crate) fn numeric(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .filter(|n| n.is_finite())
}
