//! Response cache for list/retrieve payloads.
//!
//! Entries are keyed by (resource name, request URL including query string,
//! caller-or-anonymous) and live until invalidated; there is no TTL. Every
//! mutation of a resource type invalidates all of that type's entries. A
//! side index from resource name to live keys makes the invalidation exact
//! instead of a prefix scan over the whole cache.
//!
//! Reads are best-effort: a read racing a concurrent write can serve stale
//! data until the write's invalidation lands. Resources on the configured
//! exclusion list are never cached at all.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use moka::future::Cache;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;
use crate::types::UserId;

#[derive(Clone)]
pub struct ResponseCache {
    enabled: bool,
    never_cached: Arc<HashSet<String>>,
    entries: Cache<String, Value>,
    keys_by_resource: Arc<DashMap<String, HashSet<String>>>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            never_cached: Arc::new(config.never_cached.iter().cloned().collect()),
            entries: Cache::new(config.max_entries),
            keys_by_resource: Arc::new(DashMap::new()),
        }
    }

    /// Whether responses for this resource are cached at all.
    pub fn is_cacheable(&self, resource: &str) -> bool {
        self.enabled && !self.never_cached.contains(resource)
    }

    /// Build the cache key for a request. The URL is hashed so keys stay
    /// bounded regardless of query-string size.
    pub fn key(resource: &str, url: &str, caller: Option<UserId>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let digest = hasher.finalize();
        let url_hash = hex_prefix(&digest, 16);

        match caller {
            Some(user_id) => format!("{resource}:{url_hash}:{}", user_id.simple()),
            None => format!("{resource}:{url_hash}:anon"),
        }
    }

    pub async fn get(&self, resource: &str, key: &str) -> Option<Value> {
        if !self.is_cacheable(resource) {
            return None;
        }
        self.entries.get(key).await
    }

    pub async fn insert(&self, resource: &str, key: String, value: Value) {
        if !self.is_cacheable(resource) {
            return;
        }

        self.keys_by_resource
            .entry(resource.to_string())
            .or_default()
            .insert(key.clone());
        self.entries.insert(key, value).await;
    }

    /// Drop every cached response for a resource type, across all callers
    /// and URLs. Called after any create/update/destroy of that type.
    pub async fn invalidate_resource(&self, resource: &str) {
        let Some((_, keys)) = self.keys_by_resource.remove(resource) else {
            return;
        };

        for key in keys {
            self.entries.invalidate(&key).await;
        }
    }
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for byte in bytes {
        if out.len() >= len {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(len);
    out
}
