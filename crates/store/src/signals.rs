//! In-memory signal store, for tests and ephemeral runs.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use steward_core::error::HostError;
use steward_core::host::SignalStore;
use tokio::sync::RwLock;

pub struct InMemorySignalStore {
    snapshots: Arc<RwLock<BTreeMap<String, serde_json::Value>>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemorySignalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, resource: &str) -> Result<Option<serde_json::Value>, HostError> {
        Ok(self.snapshots.read().await.get(resource).cloned())
    }

    async fn save(&self, resource: &str, snapshot: serde_json::Value) -> Result<(), HostError> {
        self.snapshots
            .write()
            .await
            .insert(resource.to_string(), snapshot);
        Ok(())
    }

    async fn remove(&self, resource: &str) -> Result<bool, HostError> {
        Ok(self.snapshots.write().await.remove(resource).is_some())
    }

    async fn resources(&self) -> Result<Vec<String>, HostError> {
        Ok(self.snapshots.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_load_remove() {
        let store = InMemorySignalStore::new();
        assert!(store.load("assistant:docs").await.unwrap().is_none());

        store
            .save("assistant:docs", json!({"lifecycle": "ready"}))
            .await
            .unwrap();
        assert_eq!(
            store.load("assistant:docs").await.unwrap().unwrap()["lifecycle"],
            "ready"
        );
        assert_eq!(store.resources().await.unwrap(), vec!["assistant:docs".to_string()]);

        assert!(store.remove("assistant:docs").await.unwrap());
        assert!(!store.remove("assistant:docs").await.unwrap());
    }
}
