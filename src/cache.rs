//! Two-tier cache (C7, spec.md §4.7): direction-selection results and POI
//! pools, each keyed by a deterministic hash of its canonical inputs and
//! expired by a TTL that depends on how specific the request was.
//!
//! Cache-backend failures never propagate (spec.md §7): a read error is a
//! miss, a write error is a no-op, and both are logged once via `tracing`.
//! A hashing failure (an input that can't round-trip through
//! `serde_json`) skips the cache entirely and falls through to a fresh
//! compute, per the same table.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::CacheConfig;
use crate::hashing::hash_value;
use crate::traits::CacheBackend;

/// One cache "tier": a namespace prefix (`direction` or `poi`) over a
/// shared [`CacheBackend`].
pub struct TieredCache<'a> {
    backend: &'a dyn CacheBackend,
    namespace: &'static str,
}

impl<'a> TieredCache<'a> {
    pub fn new(backend: &'a dyn CacheBackend, namespace: &'static str) -> Self {
        Self { backend, namespace }
    }

    fn namespaced_key(&self, hash: &str) -> String {
        format!("{}:{}", self.namespace, hash)
    }

    /// Returns `None` on a hashing failure, a cache miss, or a backend
    /// error — all three are indistinguishable to the caller by design.
    pub async fn get<T: DeserializeOwned>(&self, key_input: &Value) -> Option<T> {
        let hash = hash_value(key_input)?;
        let key = self.namespaced_key(&hash);
        match self.backend.get(&key).await {
            Ok(Some(value)) => serde_json::from_value(value).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(cache = self.namespace, %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// A hashing or backend failure is swallowed; the caller already has
    /// the freshly computed value and proceeds without caching it.
    pub async fn set<T: Serialize>(&self, key_input: &Value, value: &T, ttl_sec: u64) {
        let Some(hash) = hash_value(key_input) else {
            warn!(cache = self.namespace, "cache key hashing failed, skipping write");
            return;
        };
        let key = self.namespaced_key(&hash);
        let Ok(serialized) = serde_json::to_value(value) else {
            warn!(cache = self.namespace, "cache value serialization failed, skipping write");
            return;
        };
        if let Err(err) = self.backend.set(&key, serialized, ttl_sec).await {
            warn!(cache = self.namespace, %err, "cache write failed, ignoring");
        }
    }
}

/// Key inputs for the direction-selection cache (spec.md §4.7): `hash =
/// hash(country, month, sorted(preferences), pace, risk, duration)`.
pub fn direction_cache_key(
    country_code: &str,
    month: Option<u8>,
    preferences: &[String],
    pace: &str,
    risk_tolerance: &str,
    duration_days: u32,
) -> Value {
    let mut sorted_preferences = preferences.to_vec();
    sorted_preferences.sort();
    json!({
        "country": country_code,
        "month": month,
        "preferences": sorted_preferences,
        "pace": pace,
        "risk": risk_tolerance,
        "duration": duration_days,
    })
}

/// TTL for the direction-selection cache: 6h when `month` is known, 1h
/// otherwise (spec.md §4.7).
pub fn direction_cache_ttl(config: &CacheConfig, month: Option<u8>) -> u64 {
    if month.is_some() {
        config.direction_ttl_with_month_sec
    } else {
        config.direction_ttl_without_month_sec
    }
}

/// Key inputs for the POI-pool cache (spec.md §4.4, §4.7): `hash =
/// hash(directionId, bufferMeters, canonicalise(signaturePois))`.
pub fn poi_cache_key(direction_id: &str, buffer_meters: f64, signature_pois: &Value) -> Value {
    json!({
        "directionId": direction_id,
        "bufferMeters": buffer_meters,
        "signaturePois": signature_pois,
    })
}

/// A signature-POI payload counts as "non-trivial" once it names at
/// least one type or example, which is the only signal spec.md gives for
/// picking between the two POI-pool TTLs.
pub fn signature_pois_is_trivial(signature_pois: &Value) -> bool {
    let types_empty = signature_pois
        .get("types")
        .and_then(Value::as_array)
        .is_none_or(|a| a.is_empty());
    let examples_empty = signature_pois
        .get("examples")
        .and_then(Value::as_array)
        .is_none_or(|a| a.is_empty());
    types_empty && examples_empty
}

/// TTL for the POI-pool cache: 24h when `signaturePois` is non-trivial,
/// 6h otherwise (spec.md §4.7).
pub fn poi_cache_ttl(config: &CacheConfig, signature_pois: &Value) -> u64 {
    if signature_pois_is_trivial(signature_pois) {
        config.poi_ttl_default_sec
    } else {
        config.poi_ttl_signature_sec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct InMemoryBackend {
        store: Mutex<HashMap<String, Value>>,
        fail_reads: bool,
        fail_writes: bool,
    }

    #[async_trait]
    impl CacheBackend for InMemoryBackend {
        async fn get(&self, key: &str) -> Result<Option<Value>, String> {
            if self.fail_reads {
                return Err("boom".to_string());
            }
            Ok(self.store.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: Value, _ttl_sec: u64) -> Result<(), String> {
            if self.fail_writes {
                return Err("boom".to_string());
            }
            self.store.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
    }

    #[tokio::test]
    async fn round_trips_through_a_working_backend() {
        let backend = InMemoryBackend::default();
        let cache = TieredCache::new(&backend, "direction");
        let key = direction_cache_key("VN", Some(7), &["hiking".to_string()], "moderate", "low", 1);
        cache.set(&key, &vec!["rd-1".to_string(), "rd-2".to_string()], 3600).await;
        let hit: Option<Vec<String>> = cache.get(&key).await;
        assert_eq!(hit, Some(vec!["rd-1".to_string(), "rd-2".to_string()]));
    }

    #[tokio::test]
    async fn read_failure_is_treated_as_miss() {
        let backend = InMemoryBackend {
            fail_reads: true,
            ..InMemoryBackend::default()
        };
        let cache = TieredCache::new(&backend, "poi");
        let key = poi_cache_key("rd-1", 50_000.0, &json!({}));
        let hit: Option<Vec<String>> = cache.get(&key).await;
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn write_failure_never_panics_or_propagates() {
        let backend = InMemoryBackend {
            fail_writes: true,
            ..InMemoryBackend::default()
        };
        let cache = TieredCache::new(&backend, "poi");
        let key = poi_cache_key("rd-1", 50_000.0, &json!({}));
        cache.set(&key, &vec!["a".to_string()], 60).await;
    }

    #[test]
    fn ttl_depends_on_month_presence() {
        let config = CacheConfig::default();
        assert_eq!(direction_cache_ttl(&config, Some(7)), config.direction_ttl_with_month_sec);
        assert_eq!(direction_cache_ttl(&config, None), config.direction_ttl_without_month_sec);
    }

    #[test]
    fn ttl_depends_on_signature_poi_triviality() {
        let config = CacheConfig::default();
        let trivial = json!({"types": [], "examples": []});
        let rich = json!({"types": ["temple"], "examples": []});
        assert_eq!(poi_cache_ttl(&config, &trivial), config.poi_ttl_default_sec);
        assert_eq!(poi_cache_ttl(&config, &rich), config.poi_ttl_signature_sec);
    }

    #[test]
    fn cache_keys_are_order_independent_on_preferences() {
        let a = direction_cache_key("VN", Some(7), &["hiking".to_string(), "food".to_string()], "moderate", "low", 1);
        let b = direction_cache_key("VN", Some(7), &["food".to_string(), "hiking".to_string()], "moderate", "low", 1);
        assert_eq!(hash_value(&a), hash_value(&b));
    }
}
