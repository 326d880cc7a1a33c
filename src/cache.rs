//! Result cache
//!
//! Process-local expiring map from a content hash to a finished analysis
//! result. Expired entries are dropped when they are looked up, when the map
//! grows past its bound, or by the periodic maintenance sweep.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Stable cache key for an analysis input: SHA-256 of `type|text|params`.
/// Jobs without text are analyzed from their document URL, so `url:<fileUrl>`
/// takes the text's place in the digest.
pub fn cache_key(
    job_type: &str,
    text: Option<&str>,
    file_url: Option<&str>,
    params: Option<&Value>,
) -> String {
    let params = params.map(Value::to_string).unwrap_or_else(|| "null".to_string());
    let content = match (text.filter(|t| !t.is_empty()), file_url) {
        (Some(text), _) => text.to_string(),
        (None, Some(url)) => format!("url:{}", url),
        (None, None) => String::new(),
    };

    let mut hasher = Sha256::new();
    hasher.update(job_type.as_bytes());
    hasher.update(b"|");
    hasher.update(content.as_bytes());
    hasher.update(b"|");
    hasher.update(params.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub expires: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires
    }
}

#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl ResultCache {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut guard = self.inner.write().await;
        match guard.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                guard.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let expires = Instant::now() + ttl.unwrap_or(self.default_ttl);
        let mut guard = self.inner.write().await;
        guard.insert(key.into(), CacheEntry { value, expires });

        if guard.len() > self.max_entries {
            let now = Instant::now();
            guard.retain(|_, entry| !entry.is_expired(now));
        }
        while guard.len() > self.max_entries {
            let victim = guard
                .iter()
                .min_by_key(|(_, entry)| entry.expires)
                .map(|(k, _)| k.clone());
            match victim {
                Some(k) => {
                    debug!(key = %k, "Evicting cache entry closest to expiry");
                    guard.remove(&k);
                }
                None => break,
            }
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired(now));
        before - guard.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
