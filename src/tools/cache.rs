//! Per-tool result cache.

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use voyage_common::StepArgs;

/// Cache key over the tool name and canonical (key-sorted) arguments.
pub fn cache_key(tool_name: &str, args: &StepArgs) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(b":");
    hasher.update(args.to_value().to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

/// Successful tool results, shared by concurrent calls to the same tool.
///
/// Calls with the same key are serialized through a per-key lock so only
/// the first one reaches the tool; the rest find its result cached.
#[derive(Debug)]
pub struct ToolCache {
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    ttl: Duration,
}

impl ToolCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            ttl,
        }
    }

    /// Lock shared by every in-flight call for `key`.
    pub fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.in_flight.entry(key.to_string()).or_default().value())
    }

    /// Drop the lock for `key` once no other call holds a handle to it.
    pub fn release_key(&self, key: &str, lock: Arc<Mutex<()>>) {
        self.in_flight
            .remove_if(key, |_, held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2);
    }

    /// Fresh entry for `key`; an expired one is evicted.
    pub fn get(&self, key: &str) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: String, value: Value) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
