//! Primary quoting venue adapter.
//!
//! Normalizes raw listings, order books, and price history into the
//! canonical shapes. Every operation is infallible for callers: upstream
//! failures degrade to deterministic synthetic data, cached under the same
//! TTL tier as live data.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{
    ttl, Config, HISTORY_DEFAULT_INTERVAL, HISTORY_DEFAULT_LIMIT, HISTORY_MAX_LIMIT,
};
use crate::error::{AppError, Result};
use crate::store::Cache;
use crate::types::{
    clamp_market_prob, round_to, DataSource, HistoryPoint, Market, OrderBook, PriceLevel,
};

use super::{fallback, http_client, now_ms, numeric, pick_f64, pick_str};

pub struct OpinionClient {
    http: reqwest::Client,
    cache: Cache,
    base: String,
    api_key: String,
}

impl OpinionClient {
    pub fn new(cfg: &Config, cache: Cache) -> Self {
        Self {
            http: http_client(cfg.upstream_timeout()),
            cache,
            base: cfg.opinion_api_url.clone(),
            api_key: cfg.opinion_api_key.clone(),
        }
    }

    async fn fetch_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{path}", self.base);
        let mut req = self
            .http
            .get(&url)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json");
        if !self.api_key.is_empty() {
            req = req.header("apikey", &self.api_key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("GET {url} returned {status}")));
        }
        Ok(resp.json::<Value>().await?)
    }

    /// Active market listing, optionally filtered by category.
    pub async fn list_markets(&self, category: Option<&str>) -> Vec<Market> {
        let key = match category {
            Some(c) => format!("markets:q:{c}"),
            None => "markets:all".to_string(),
        };
        if let Some(hit) = self.cache.get::<Vec<Market>>(&key) {
            return hit;
        }

        let mut query = vec![
            ("status", "activated".to_string()),
            ("limit", "50".to_string()),
        ];
        if let Some(c) = category {
            query.push(("category", c.to_string()));
        }

        let (markets, source) = match self.fetch_json("/market", &query).await {
            Ok(body) => (normalize_markets(extract_list(&body), now_ms()), DataSource::Live),
            Err(e) => {
                warn!("market listing upstream failed, synthesizing: {e}");
                (fallback::markets(now_ms()), DataSource::Synthetic)
            }
        };

        self.cache.set(&key, &markets, ttl::MARKETS);
        debug!(count = markets.len(), source = %source, "market listing ready");
        markets
    }

    /// Order book snapshot for one token.
    pub async fn get_orderbook(&self, token_id: &str) -> OrderBook {
        let key = format!("orderbook:{token_id}");
        if let Some(hit) = self.cache.get::<OrderBook>(&key) {
            return hit;
        }

        let query = [("tokenId", token_id.to_string())];
        let (book, source) = match self.fetch_json("/token/orderbook", &query).await {
            Ok(body) => (normalize_order_book(token_id, &body, now_ms()), DataSource::Live),
            Err(e) => {
                warn!(token_id, "order book upstream failed, synthesizing: {e}");
                (fallback::order_book(token_id, now_ms()), DataSource::Synthetic)
            }
        };

        self.cache.set(&key, &book, ttl::ORDER_BOOK);
        debug!(
            token_id,
            source = %source,
            bids = book.bids.len(),
            asks = book.asks.len(),
            "order book ready"
        );
        book
    }

    /// Price history, sorted ascending by timestamp. `limit` is capped at 200.
    pub async fn get_history(
        &self,
        token_id: &str,
        interval: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<HistoryPoint> {
        let interval = interval.unwrap_or(HISTORY_DEFAULT_INTERVAL);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(HISTORY_DEFAULT_LIMIT)
            .min(HISTORY_MAX_LIMIT);
        let key = format!("history:{token_id}:{interval}:{limit}");
        if let Some(hit) = self.cache.get::<Vec<HistoryPoint>>(&key) {
            return hit;
        }

        let query = [
            ("tokenId", token_id.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let (points, source) = match self.fetch_json("/token/price-history", &query).await {
            Ok(body) => (normalize_history(&body, now_ms()), DataSource::Live),
            Err(e) => {
                warn!(token_id, "history upstream failed, synthesizing: {e}");
                (fallback::history(token_id, limit, now_ms()), DataSource::Synthetic)
            }
        };

        self.cache.set(&key, &points, ttl::HISTORY);
        debug!(token_id, count = points.len(), source = %source, "history ready");
        points
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// The listing endpoint has been seen wrapping the array three ways.
fn extract_list(body: &Value) -> &[Value] {
    body.get("result")
        .and_then(|r| r.get("list"))
        .and_then(Value::as_array)
        .or_else(|| body.get("data").and_then(Value::as_array))
        .or_else(|| body.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn normalize_markets(list: &[Value], now_ms: u64) -> Vec<Market> {
    list.iter()
        .enumerate()
        .map(|(idx, m)| {
            let id = pick_str(m, &["yesTokenId", "tokenId", "marketId"])
                .map(str::to_string)
                .or_else(|| m.get("marketId").and_then(Value::as_u64).map(|n| n.to_string()))
                .unwrap_or_else(|| format!("m-{idx}"));
            let probability = pick_f64(m, &["lastPrice", "price"])
                .unwrap_or_else(|| fallback::deterministic_probability(&idx.to_string()));
            Market {
                id,
                title: pick_str(m, &["marketTitle", "title", "name"])
                    .unwrap_or("Untitled market")
                    .to_string(),
                category: pick_str(m, &["category", "tag"]).unwrap_or("General").to_string(),
                probability: clamp_market_prob(probability),
                updated_at_ms: now_ms,
            }
        })
        .collect()
}

/// Levels arrive either as `{price, size}` objects or `[price, size]` pairs.
fn parse_level(v: &Value) -> Option<PriceLevel> {
    let price = pick_f64(v, &["price"]).or_else(|| v.get(0).and_then(numeric));
    let size = pick_f64(v, &["size"]).or_else(|| v.get(1).and_then(numeric));
    Some(PriceLevel { price: price?, size: size? })
}

fn side_levels(body: &Value, side: &str) -> Vec<PriceLevel> {
    body.get("data")
        .and_then(|d| d.get(side))
        .and_then(Value::as_array)
        .or_else(|| body.get(side).and_then(Value::as_array))
        .map(|levels| levels.iter().filter_map(parse_level).collect())
        .unwrap_or_default()
}

fn normalize_order_book(token_id: &str, body: &Value, now_ms: u64) -> OrderBook {
    let mut bids = side_levels(body, "bids");
    let mut asks = side_levels(body, "asks");
    bids.sort_by(|a, b| b.price.total_cmp(&a.price));
    asks.sort_by(|a, b| a.price.total_cmp(&b.price));

    let (mid, spread) = match (bids.first(), asks.first()) {
        (Some(bid), Some(ask)) => (
            round_to((ask.price + bid.price) / 2.0, 3),
            round_to(ask.price - bid.price, 3),
        ),
        _ => (0.0, 0.0),
    };

    OrderBook {
        token_id: token_id.to_string(),
        bids,
        asks,
        mid,
        spread,
        updated_at_ms: now_ms,
    }
}

fn normalize_history(body: &Value, now_ms: u64) -> Vec<HistoryPoint> {
    let list = body
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| body.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut points: Vec<HistoryPoint> = list
        .iter()
        .map(|p| HistoryPoint {
            ts_ms: pick_f64(p, &["ts", "time"]).map(|t| t as u64).unwrap_or(now_ms),
            price: pick_f64(p, &["price", "close", "last"]).unwrap_or(0.0),
            volume: pick_f64(p, &["volume", "vol"]).unwrap_or(0.0),
        })
        .collect();
    // Callers must not assume the venue pre-sorts the series.
    points.sort_by_key(|p| p.ts_ms);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn markets_normalize_through_candidate_keys() {
        let body = json!({
            "result": { "list": [
                { "yesTokenId": "tok-yes", "marketTitle": "Rates hold", "lastPrice": 0.64 },
                { "marketId": 77, "name": "Untitled soon", "tag": "Macro", "price": "0.41" },
                { }
            ]}
        });
        let markets = normalize_markets(extract_list(&body), 1_000);

        assert_eq!(markets.len(), 3);
        assert_eq!(markets[0].id, "tok-yes");
        assert_eq!(markets[0].title, "Rates hold");
        assert_eq!(markets[0].probability, 0.64);

        assert_eq!(markets[1].id, "77");
        assert_eq!(markets[1].category, "Macro");
        assert_eq!(markets[1].probability, 0.41);

        assert_eq!(markets[2].id, "m-2");
        assert_eq!(markets[2].title, "Untitled market");
        assert!((0.1..=0.9).contains(&markets[2].probability));
    }

    #[test]
    fn market_probability_is_clamped() {
        let body = json!([{ "tokenId": "t", "title": "x", "lastPrice": 1.4 }]);
        let markets = normalize_markets(extract_list(&body), 0);
        assert_eq!(markets[0].probability, 0.95);
    }

    #[test]
    fn order_book_accepts_objects_and_pairs() {
        let body = json!({
            "data": {
                "bids": [ { "price": "0.60", "size": 10 } ],
                "asks": [ [0.62, 10.0], [0.65, 4.0] ]
            }
        });
        let book = normalize_order_book("tok", &body, 0);
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.asks.len(), 2);
        assert_eq!(book.mid, 0.61);
        assert_eq!(book.spread, 0.02);
    }

    #[test]
    fn order_book_sorts_sides_and_zeroes_empty_mid() {
        let body = json!({
            "bids": [ [0.50, 1.0], [0.55, 2.0] ],
            "asks": []
        });
        let book = normalize_order_book("tok", &body, 0);
        assert_eq!(book.bids[0].price, 0.55);
        assert_eq!(book.mid, 0.0);
        assert_eq!(book.spread, 0.0);
    }

    #[test]
    fn history_sorts_ascending() {
        let body = json!({ "data": [
            { "ts": 3_000, "close": 0.5, "vol": 2 },
            { "time": 1_000, "price": 0.4, "volume": 1 }
        ]});
        let points = normalize_history(&body, 9_999);
        assert_eq!(points[0].ts_ms, 1_000);
        assert_eq!(points[0].price, 0.4);
        assert_eq!(points[1].volume, 2.0);
    }
}
