//! Deterministic hashing for string-keyed caches and the gray-release
//! rollout gate (spec.md §9 "string-keyed JSON caches" redesign flag).
//!
//! Both [`cache`](crate::cache) keys and [`direction::rollout`](crate::direction::rollout)
//! user-hash buckets go through the same canonicalization + FNV-1a path,
//! so a given input always maps to the same key across process restarts
//! without pulling in a hashing crate the rest of the stack doesn't need.

use serde_json::Value;
use std::collections::BTreeMap;

/// Recursively re-sorts every object's keys (`BTreeMap` ordering) and
/// re-serializes, so two semantically-equal JSON values with differently
/// ordered keys hash identically.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical, stably-ordered JSON string for `value`. `None` only if
/// serialization itself fails (e.g. non-finite floats), which the caller
/// treats as a cache-key hashing failure (spec.md §7): skip the cache
/// operation and fall through to computing the value directly.
pub fn canonical_string(value: &Value) -> Option<String> {
    serde_json::to_string(&canonicalize(value)).ok()
}

/// FNV-1a, 64-bit. Simple, dependency-free, stable across releases —
/// exactly what a reproducible cache key / rollout bucket needs.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Hex-encoded FNV-1a of `value`'s canonical JSON form. Used as a cache
/// key; `None` propagates a hashing failure to the caller.
pub fn hash_value(value: &Value) -> Option<String> {
    canonical_string(value).map(|s| format!("{:016x}", fnv1a64(s.as_bytes())))
}

/// `hash(userId) mod 100` for the gray-release rollout check (spec.md
/// §4.5). The modulus is taken on the full 64-bit hash, not on a
/// truncated prefix, so the bucket distribution stays uniform.
pub fn stable_user_bucket(user_id: &str) -> u8 {
    (fnv1a64(user_id.as_bytes()) % 100) as u8
}
