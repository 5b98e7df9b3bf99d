use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Key-value backend contract
// ---------------------------------------------------------------------------

/// External key-value collaborator: string values, per-key TTL, last writer
/// wins. Absence is indistinguishable from "never set" and from "backend
/// unreachable".
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process backend. Expiry is lazy on read, with an opportunistic sweep
/// every `PURGE_EVERY_WRITES` writes so dead keys don't accumulate.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    writes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

const PURGE_EVERY_WRITES: u64 = 256;

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            writes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Fraction of reads served from a live entry; 0.0 before any read.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.value.clone()));
            }
        }
        // Expired or absent — drop the dead entry outside the read guard.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry { value, expires_at: Instant::now() + ttl },
        );
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY_WRITES == 0 {
            self.purge_expired();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cache — typed facade
// ---------------------------------------------------------------------------

/// JSON-typed memoization layer over the backend. Reads degrade to `None` on
/// any backend or decode failure; writes are logged and swallowed so they
/// never fail the caller's primary operation.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn KeyValueStore>,
}

impl Cache {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!("cache get {key}: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("cache decode {key}: {e}");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("cache encode {key}: {e}");
                return;
            }
        };
        if let Err(e) = self.backend.set(key, raw, ttl) {
            warn!("cache set {key}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_none_after_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", "\"v\"".to_string(), Duration::ZERO)
            .unwrap();
        assert_eq!(store.get("k").unwrap(), None);

        store
            .set("k", "\"v\"".to_string(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(store.get("k").unwrap(), Some("\"v\"".to_string()));
    }

    #[test]
    fn last_writer_wins() {
        let store = MemoryStore::new();
        store
            .set("k", "\"a\"".to_string(), Duration::from_secs(60))
            .unwrap();
        store
            .set("k", "\"b\"".to_string(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(store.get("k").unwrap(), Some("\"b\"".to_string()));
    }

    #[test]
    fn typed_roundtrip_and_decode_degradation() {
        let store = MemoryStore::new();
        let cache = Cache::new(store.clone());

        cache.set("nums", &vec![1u32, 2, 3], Duration::from_secs(60));
        assert_eq!(cache.get::<Vec<u32>>("nums"), Some(vec![1, 2, 3]));

        // Garbage in the backend reads as a miss, not an error.
        store
            .set("nums", "not json".to_string(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get::<Vec<u32>>("nums"), None);
    }

    #[test]
    fn hit_rate_tracks_reads() {
        let store = MemoryStore::new();
        store
            .set("k", "\"v\"".to_string(), Duration::from_secs(60))
            .unwrap();
        store.get("k").unwrap();
        store.get("missing").unwrap();
        assert!((store.hit_rate() - 0.5).abs() < 1e-9);
    }
}
