//! Threshold alert rules: validation, whole-list storage, cadence-driven
//! evaluation, and webhook dispatch.
//!
//! Each rule is a two-state machine — armed, or cooling since its last
//! delivered trigger — re-evaluated lazily on every tick. Read paths
//! degrade to empty; writes fail loudly so alert state never silently
//! vanishes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{
    COOLDOWN_DEFAULT_MINUTES, COOLDOWN_MAX_MINUTES, COOLDOWN_MIN_MINUTES, UPSTREAM_TIMEOUT_SECS,
};
use crate::error::{AppError, Result};
use crate::store::KeyValueStore;
use crate::types::{AlertDirection, AlertPayload, AlertRule, Market};

const ALERT_LIST_KEY: &str = "alerts:list";

/// Rules outlive every cache tier; the backend contract only offers TTL, so
/// persist them far beyond any realistic process lifetime.
const ALERT_PERSIST_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a submission and mint a rule. Rejects before any store mutation.
pub fn validate_payload(payload: AlertPayload) -> Result<AlertRule> {
    if payload.market_id.trim().is_empty() {
        return Err(AppError::InvalidAlert("marketId must be a non-empty string".to_string()));
    }
    if payload.title.trim().is_empty() {
        return Err(AppError::InvalidAlert("title must be a non-empty string".to_string()));
    }
    if !payload.threshold.is_finite() || !(0.0..=1.0).contains(&payload.threshold) {
        return Err(AppError::InvalidAlert("threshold must be within [0, 1]".to_string()));
    }
    let cooldown_minutes = payload.cooldown_minutes.unwrap_or(COOLDOWN_DEFAULT_MINUTES);
    if !(COOLDOWN_MIN_MINUTES..=COOLDOWN_MAX_MINUTES).contains(&cooldown_minutes) {
        return Err(AppError::InvalidAlert(format!(
            "cooldownMinutes must be within [{COOLDOWN_MIN_MINUTES}, {COOLDOWN_MAX_MINUTES}]"
        )));
    }

    Ok(AlertRule {
        id: Uuid::new_v4().to_string(),
        market_id: payload.market_id,
        title: payload.title,
        direction: payload.direction,
        threshold: payload.threshold,
        webhook: payload.webhook.filter(|w| !w.trim().is_empty()),
        cooldown_minutes,
        last_triggered_ms: None,
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Whole-list read/write over the key-value backend. No partial updates.
#[derive(Clone)]
pub struct AlertStore {
    backend: Arc<dyn KeyValueStore>,
}

impl AlertStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Backend or decode failures degrade to an empty list.
    pub fn list(&self) -> Vec<AlertRule> {
        let raw = match self.backend.get(ALERT_LIST_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("alert list read failed: {e}");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(rules) => rules,
            Err(e) => {
                warn!("alert list decode failed: {e}");
                Vec::new()
            }
        }
    }

    pub fn save(&self, rules: &[AlertRule]) -> Result<()> {
        let raw = serde_json::to_string(rules)?;
        self.backend
            .set(ALERT_LIST_KEY, raw, ALERT_PERSIST_TTL)
            .map_err(|e| AppError::Store(format!("alert list write failed: {e}")))
    }

    /// Validate and persist, replacing any rule with the same id.
    pub fn add(&self, payload: AlertPayload) -> Result<AlertRule> {
        let rule = validate_payload(payload)?;
        let mut rules = self.list();
        rules.retain(|r| r.id != rule.id);
        rules.push(rule.clone());
        self.save(&rules)?;
        Ok(rule)
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Fire-and-forget delivery; true only when the sink accepted the post.
    async fn deliver(&self, webhook: &str, text: &str) -> bool;
}

/// Posts `{content: text}` to any chat-ops style endpoint. No retry.
pub struct WebhookSink {
    http: reqwest::Client,
}

impl WebhookSink {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }
}

/// Manual verification helper: posts a test message through any sink.
pub async fn send_test(
    sink: &dyn AlertSink,
    webhook: &str,
    title: &str,
    message: Option<&str>,
) -> bool {
    let text = match message {
        Some(m) => m.to_string(),
        None => format!("Test alert: {title}"),
    };
    sink.deliver(webhook, &text).await
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, webhook: &str, text: &str) -> bool {
        let result = self
            .http
            .post(webhook)
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await
            .and_then(|resp| resp.error_for_status());
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!("webhook delivery failed: {e}");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CycleSummary {
    pub evaluated: usize,
    pub triggered: usize,
    pub errors: Vec<String>,
}

pub struct AlertEngine {
    store: AlertStore,
    sink: Arc<dyn AlertSink>,
    default_webhook: String,
    site_url: String,
}

impl AlertEngine {
    pub fn new(
        store: AlertStore,
        sink: Arc<dyn AlertSink>,
        default_webhook: String,
        site_url: String,
    ) -> Self {
        Self { store, sink, default_webhook, site_url }
    }

    /// One cadence tick: evaluate every rule against the given market
    /// probabilities. Per-rule failures are isolated into the summary and
    /// never abort sibling rules.
    pub async fn evaluate(&self, markets: &[Market], now_ms: u64) -> CycleSummary {
        let mut rules = self.store.list();
        let mut summary = CycleSummary { evaluated: rules.len(), ..Default::default() };
        let mut dirty = false;

        for rule in rules.iter_mut() {
            let Some(market) = markets.iter().find(|m| m.id == rule.market_id) else {
                continue;
            };
            let prob = sanitize_prob(market.probability);
            if !should_trigger(rule, prob, now_ms) {
                continue;
            }

            let webhook = rule
                .webhook
                .clone()
                .unwrap_or_else(|| self.default_webhook.clone());
            let text = format_alert(&market.title, rule, prob, &self.site_url);

            let delivered = if webhook.is_empty() {
                false
            } else {
                self.sink.deliver(&webhook, &text).await
            };

            // Stamp on delivery, and also when no webhook exists at all so a
            // deliberately sink-less rule does not re-fire every tick.
            if delivered || webhook.is_empty() {
                rule.last_triggered_ms = Some(now_ms);
                dirty = true;
            }
            if delivered {
                summary.triggered += 1;
                info!(rule_id = %rule.id, market_id = %rule.market_id, "alert delivered: {text}");
            } else if !webhook.is_empty() {
                summary.errors.push(format!("delivery failed for rule {}", rule.id));
            }
        }

        if dirty {
            if let Err(e) = self.store.save(&rules) {
                summary.errors.push(e.to_string());
            }
        }
        summary
    }
}

/// Armed ∧ hit: threshold crossed in the rule's direction while outside the
/// cooldown window of the last delivered trigger.
pub fn should_trigger(rule: &AlertRule, prob: f64, now_ms: u64) -> bool {
    let hit = match rule.direction {
        AlertDirection::Above => prob >= rule.threshold,
        AlertDirection::Below => prob <= rule.threshold,
    };
    let last = rule.last_triggered_ms.unwrap_or(0);
    let cooled = now_ms.saturating_sub(last) >= rule.cooldown_minutes * 60_000;
    hit && cooled
}

fn sanitize_prob(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

fn format_alert(market_title: &str, rule: &AlertRule, prob: f64, site_url: &str) -> String {
    let symbol = match rule.direction {
        AlertDirection::Above => "≥",
        AlertDirection::Below => "≤",
    };
    format!(
        "🚨 {market_title} {symbol} {:.0}% · Current {:.0}%\nView: {site_url}",
        rule.threshold * 100.0,
        prob * 100.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Mutex;

    struct RecordingSink {
        accept: bool,
        delivered: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        fn new(accept: bool) -> Arc<Self> {
            Arc::new(Self { accept, delivered: Mutex::new(Vec::new()) })
        }

        fn count(&self) -> usize {
            self.delivered.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn deliver(&self, webhook: &str, text: &str) -> bool {
            self.delivered
                .lock()
                .unwrap()
                .push((webhook.to_string(), text.to_string()));
            self.accept
        }
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> crate::error::Result<Option<String>> {
            Ok(None)
        }
        fn set(&self, _key: &str, _value: String, _ttl: Duration) -> crate::error::Result<()> {
            Err(AppError::Store("backend unreachable".to_string()))
        }
    }

    fn payload(market_id: &str) -> AlertPayload {
        AlertPayload {
            market_id: market_id.to_string(),
            title: "Fed holds".to_string(),
            direction: AlertDirection::Above,
            threshold: 0.7,
            webhook: Some("https://hooks.example/abc".to_string()),
            cooldown_minutes: Some(30),
        }
    }

    fn market(id: &str, probability: f64) -> Market {
        Market {
            id: id.to_string(),
            title: "Fed holds rates in March".to_string(),
            category: "Macro".to_string(),
            probability,
            updated_at_ms: 0,
        }
    }

    #[test]
    fn rejects_invalid_payloads_before_mutation() {
        let empty_market = AlertPayload { market_id: "  ".to_string(), ..payload("x") };
        assert!(matches!(
            validate_payload(empty_market),
            Err(AppError::InvalidAlert(_))
        ));

        let bad_threshold = AlertPayload { threshold: 1.2, ..payload("m1") };
        assert!(validate_payload(bad_threshold).is_err());

        let bad_cooldown = AlertPayload { cooldown_minutes: Some(0), ..payload("m1") };
        assert!(validate_payload(bad_cooldown).is_err());

        let store = AlertStore::new(MemoryStore::new());
        let bad = AlertPayload { market_id: String::new(), ..payload("x") };
        assert!(store.add(bad).is_err());
        assert!(store.list().is_empty());
    }

    #[test]
    fn cooldown_defaults_when_omitted() {
        let rule =
            validate_payload(AlertPayload { cooldown_minutes: None, ..payload("m1") }).unwrap();
        assert_eq!(rule.cooldown_minutes, 30);
        assert!(rule.last_triggered_ms.is_none());
    }

    #[test]
    fn add_surfaces_backend_write_failure() {
        let store = AlertStore::new(Arc::new(BrokenStore));
        assert!(matches!(store.add(payload("m1")), Err(AppError::Store(_))));
    }

    #[tokio::test]
    async fn triggers_once_within_cooldown_window() {
        let store = AlertStore::new(MemoryStore::new());
        store.add(payload("m1")).unwrap();
        let sink = RecordingSink::new(true);
        let engine = AlertEngine::new(
            store.clone(),
            sink.clone(),
            String::new(),
            "https://example.test".to_string(),
        );

        // Three ticks ten minutes apart: below, above, still above. The
        // never-triggered rule reads `last = 0`, so start well past one
        // cooldown period.
        let t0 = 10_000_000u64;
        let ten_min = 10 * 60_000;

        let s1 = engine.evaluate(&[market("m1", 0.65)], t0).await;
        assert_eq!((s1.evaluated, s1.triggered), (1, 0));

        let s2 = engine.evaluate(&[market("m1", 0.72)], t0 + ten_min).await;
        assert_eq!(s2.triggered, 1);

        // Cooldown (30m) has not elapsed — no second delivery.
        let s3 = engine.evaluate(&[market("m1", 0.73)], t0 + 2 * ten_min).await;
        assert_eq!(s3.triggered, 0);
        assert_eq!(sink.count(), 1);

        // Once cooled it re-arms.
        let s4 = engine.evaluate(&[market("m1", 0.73)], t0 + ten_min + 31 * 60_000).await;
        assert_eq!(s4.triggered, 1);
        assert_eq!(sink.count(), 2);
    }

    #[tokio::test]
    async fn failed_delivery_leaves_rule_armed() {
        let store = AlertStore::new(MemoryStore::new());
        store.add(payload("m1")).unwrap();
        let sink = RecordingSink::new(false);
        let engine =
            AlertEngine::new(store.clone(), sink.clone(), String::new(), String::new());

        let summary = engine.evaluate(&[market("m1", 0.8)], 10_000_000).await;
        assert_eq!(summary.triggered, 0);
        assert_eq!(summary.errors.len(), 1);
        // Not stamped — the next tick retries.
        assert!(store.list()[0].last_triggered_ms.is_none());
    }

    #[tokio::test]
    async fn webhookless_rule_is_stamped_without_counting() {
        let store = AlertStore::new(MemoryStore::new());
        store
            .add(AlertPayload { webhook: None, ..payload("m1") })
            .unwrap();
        let sink = RecordingSink::new(true);
        let engine = AlertEngine::new(store.clone(), sink.clone(), String::new(), String::new());

        let summary = engine.evaluate(&[market("m1", 0.9)], 10_000_000).await;
        assert_eq!(summary.triggered, 0);
        assert_eq!(sink.count(), 0);
        assert_eq!(store.list()[0].last_triggered_ms, Some(10_000_000));
    }

    #[tokio::test]
    async fn absent_market_is_skipped_without_error() {
        let store = AlertStore::new(MemoryStore::new());
        store.add(payload("m1")).unwrap();
        let engine = AlertEngine::new(
            store,
            RecordingSink::new(true),
            String::new(),
            String::new(),
        );

        let summary = engine.evaluate(&[market("other", 0.99)], 0).await;
        assert_eq!((summary.evaluated, summary.triggered), (1, 0));
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_message_defaults_from_title() {
        let sink = RecordingSink::new(true);
        assert!(send_test(sink.as_ref(), "https://hooks.example/t", "Fed holds", None).await);
        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered[0].1, "Test alert: Fed holds");
    }

    #[test]
    fn below_direction_and_sanitized_probability() {
        let mut rule = validate_payload(AlertPayload {
            direction: AlertDirection::Below,
            threshold: 0.3,
            ..payload("m1")
        })
        .unwrap();
        let t0 = 10_000_000u64;
        assert!(should_trigger(&rule, 0.25, t0));
        assert!(!should_trigger(&rule, 0.35, t0));

        rule.last_triggered_ms = Some(t0);
        // 29 minutes in: still cooling.
        assert!(!should_trigger(&rule, 0.1, t0 + 29 * 60_000));
        assert!(should_trigger(&rule, 0.1, t0 + 30 * 60_000));

        assert_eq!(sanitize_prob(f64::NAN), 0.5);
        assert_eq!(sanitize_prob(1.7), 1.0);
    }
}
