//! Secondary public venue adapter, built from three sub-sources: a slow
//! metadata listing (Gamma), a fast per-token price feed (CLOB), and a
//! GraphQL fills subgraph for historical prices.
//!
//! Live price lookups are only valid for real outcome-token ids (long
//! opaque strings); condition/market ids are rejected before any request.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ttl, Config, MIN_LIVE_TOKEN_ID_LEN};
use crate::error::{AppError, Result};
use crate::store::Cache;
use crate::types::{clamp_compare_prob, clamp_market_prob, HistoryPoint, VenueMarket};

use super::{http_client, now_ms, numeric, pick_f64, pick_str};

const MARKETS_KEY: &str = "poly:markets";

pub struct PolymarketClient {
    http: reqwest::Client,
    cache: Cache,
    gamma_base: String,
    clob_base: String,
    subgraph_url: String,
}

impl PolymarketClient {
    pub fn new(cfg: &Config, cache: Cache) -> Self {
        Self {
            http: http_client(cfg.upstream_timeout()),
            cache,
            gamma_base: cfg.gamma_api_url.clone(),
            clob_base: cfg.clob_api_url.clone(),
            subgraph_url: cfg.subgraph_url.clone(),
        }
    }

    async fn fetch_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("GET {url} returned {status}")));
        }
        Ok(resp.json::<Value>().await?)
    }

    /// Metadata listing. Errors degrade to an empty list (not cached, so the
    /// next cycle retries); there is no synthetic fallback for this venue.
    pub async fn list_markets(&self) -> Vec<VenueMarket> {
        if let Some(hit) = self.cache.get::<Vec<VenueMarket>>(MARKETS_KEY) {
            return hit;
        }

        let url = format!("{}/markets", self.gamma_base);
        let query = [
            ("active", "true".to_string()),
            ("closed", "false".to_string()),
            ("limit", "100".to_string()),
            ("offset", "0".to_string()),
        ];
        match self.fetch_json(&url, &query).await {
            Ok(body) => {
                let markets = normalize_markets(extract_list(&body));
                self.cache.set(MARKETS_KEY, &markets, ttl::VENUE_META);
                debug!(count = markets.len(), "metadata listing ready");
                markets
            }
            Err(e) => {
                warn!("metadata listing failed: {e}");
                Vec::new()
            }
        }
    }

    /// Live price for one outcome token, clamped to [0.01, 0.99]. Returns
    /// `None` for structural (short) ids and on any upstream failure.
    pub async fn live_price(&self, token_id: &str) -> Option<f64> {
        if token_id.len() < MIN_LIVE_TOKEN_ID_LEN {
            return None;
        }
        let key = format!("poly:price:{token_id}");
        if let Some(hit) = self.cache.get::<f64>(&key) {
            return Some(hit);
        }

        let url = format!("{}/price", self.clob_base);
        let body = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .json::<Value>()
            .await
            .ok()?;

        let prob = clamp_compare_prob(body.get("price").and_then(numeric)?);
        self.cache.set(&key, &prob, ttl::LIVE_PRICE);
        Some(prob)
    }

    /// Historical fills for a condition id, oldest first. Errors degrade to
    /// an empty series.
    pub async fn fill_history(&self, condition_id: &str) -> Vec<HistoryPoint> {
        let key = format!("poly:history:{condition_id}");
        if let Some(hit) = self.cache.get::<Vec<HistoryPoint>>(&key) {
            return hit;
        }

        let query = format!(
            "query {{ fills(where: {{conditionId: \"{condition_id}\"}}, \
             orderBy: timestamp, orderDirection: desc, first: 100) \
             {{ timestamp price outcomeIndex }} }}"
        );
        let resp = self
            .http
            .post(&self.subgraph_url)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await;

        let points = match resp {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(body) => normalize_fills(&body, now_ms()),
                Err(e) => {
                    warn!(condition_id, "fills decode failed: {e}");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(condition_id, "fills request failed: {e}");
                Vec::new()
            }
        };

        self.cache.set(&key, &points, ttl::HISTORY);
        points
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn extract_list(body: &Value) -> &[Value] {
    body.get("markets")
        .and_then(Value::as_array)
        .or_else(|| body.get("events").and_then(Value::as_array))
        .or_else(|| body.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn token_id_by_outcome<'a>(tokens: &'a [Value], label: &str) -> Option<&'a str> {
    tokens
        .iter()
        .find(|t| {
            t.get("outcome")
                .and_then(Value::as_str)
                .is_some_and(|o| o.eq_ignore_ascii_case(label))
        })
        .and_then(|t| t.get("token_id"))
        .and_then(Value::as_str)
}

fn positional_token_id(tokens: &[Value], idx: usize) -> Option<&str> {
    tokens.get(idx).and_then(|t| t.get("token_id")).and_then(Value::as_str)
}

fn normalize_markets(list: &[Value]) -> Vec<VenueMarket> {
    list.iter()
        .enumerate()
        .map(|(idx, m)| {
            let tokens = m.get("tokens").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
            let yes_token_id = token_id_by_outcome(tokens, "yes")
                .or_else(|| positional_token_id(tokens, 0))
                .or_else(|| {
                    m.get("outcome_tokens")
                        .and_then(Value::as_array)
                        .and_then(|a| a.first())
                        .and_then(Value::as_str)
                });
            let no_token_id =
                token_id_by_outcome(tokens, "no").or_else(|| positional_token_id(tokens, 1));

            let outcome_prices = m.get("outcome_prices").and_then(Value::as_array);
            let yes_price = outcome_prices
                .and_then(|p| p.first())
                .and_then(numeric)
                .or_else(|| pick_f64(m, &["price"]));
            let no_price = outcome_prices.and_then(|p| p.get(1)).and_then(numeric);

            VenueMarket {
                id: pick_str(m, &["id", "condition_id"])
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("poly-{idx}")),
                title: pick_str(m, &["question", "title", "slug"])
                    .unwrap_or("Polymarket market")
                    .to_string(),
                category: pick_str(m, &["category", "tag"]).unwrap_or("General").to_string(),
                probability: clamp_market_prob(yes_price.unwrap_or(0.5)),
                yes_token_id: yes_token_id.map(str::to_string),
                no_token_id: no_token_id.map(str::to_string),
                condition_id: pick_str(m, &["condition_id", "id"]).map(str::to_string),
                yes_price,
                no_price,
                volume_24h: pick_f64(m, &["volume", "liquidity"]).unwrap_or(0.0),
            }
        })
        .collect()
}

fn normalize_fills(body: &Value, now_ms: u64) -> Vec<HistoryPoint> {
    let fills = body
        .get("data")
        .and_then(|d| d.get("fills"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut points: Vec<HistoryPoint> = fills
        .iter()
        .map(|f| HistoryPoint {
            ts_ms: f
                .get("timestamp")
                .and_then(numeric)
                .map(|ts| (ts * 1000.0) as u64)
                .unwrap_or(now_ms),
            price: f.get("price").and_then(numeric).unwrap_or(0.0),
            volume: 0.0,
        })
        .collect();
    points.sort_by_key(|p| p.ts_ms);
    points
}
