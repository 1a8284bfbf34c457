//! In-memory key-value store with per-entry expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use steward_core::error::HostError;
use steward_core::host::KeyValueStore;
use tokio::sync::RwLock;
use tracing::debug;

struct Entry {
    value: serde_json::Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A TTL-bearing key-value store held in a `HashMap`.
///
/// Expired entries are dropped lazily, on the first read that finds them.
pub struct InMemoryKvStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, HostError> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        debug!(key = %key, "Dropping expired entry");
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), HostError> {
        let expires_at = match ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| HostError::Storage(format!("TTL out of range: {e}")))?;
                let expires_at = Utc::now()
                    .checked_add_signed(ttl)
                    .ok_or_else(|| HostError::Storage(format!("TTL of {}s overflows the clock", ttl.num_seconds())))?;
                Some(expires_at)
            }
            None => None,
        };

        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, HostError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_and_get() {
        let kv = InMemoryKvStore::new();
        kv.set("conv-1", json!([{"role": "user", "content": "hi"}]), None)
            .await
            .unwrap();

        let value = kv.get("conv-1").await.unwrap().unwrap();
        assert_eq!(value[0]["content"], "hi");
        assert_eq!(kv.len().await, 1);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let kv = InMemoryKvStore::new();
        assert!(kv.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_reads_as_missing() {
        let kv = InMemoryKvStore::new();
        kv.set("short", json!("x"), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(kv.get("short").await.unwrap().is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(kv.get("short").await.unwrap().is_none());
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn overwrite_replaces_value_and_ttl() {
        let kv = InMemoryKvStore::new();
        kv.set("k", json!(1), Some(Duration::from_millis(10))).await.unwrap();
        kv.set("k", json!(2), None).await.unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(kv.get("k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let kv = InMemoryKvStore::new();
        kv.set("k", json!(true), None).await.unwrap();
        assert!(kv.delete("k").await.unwrap());
        assert!(!kv.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn oversized_ttl_is_rejected() {
        let kv = InMemoryKvStore::new();
        let err = kv
            .set("conv-1", json!([]), Some(Duration::from_secs(1_000_000_000_000_000)))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Storage(_)));
        assert!(kv.get("conv-1").await.unwrap().is_none());
    }
}
