//! Cross-request result cache for the hot "latest month, no filters" path.
//!
//! Entries are written wholesale after a complete computation; there are no
//! read-modify-write races. The cache is purely an optimization: swapping in
//! [`NoopCache`] changes latency, never results.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;

pub trait SummaryCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value, ttl: Duration);
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SummaryCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop the stale entry on this read path.
        self.entries.write().remove(key);
        None
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.to_string(), entry);
    }
}

/// Disabled cache: every request recomputes.
pub struct NoopCache;

impl SummaryCache for NoopCache {
    fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn set(&self, _key: &str, _value: Value, _ttl: Duration) {}
}
