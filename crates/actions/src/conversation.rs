//! Conversation history kept in the host key-value store.
//!
//! A missing, expired or undecodable record reads as "no conversation";
//! callers start a fresh history in that case.

use std::sync::Arc;
use std::time::Duration;
use steward_core::error::Result;
use steward_core::host::KeyValueStore;
use steward_core::message::{ChatMessage, ConversationId};
use tracing::warn;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

pub struct ConversationStore {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn key(id: &ConversationId) -> String {
        format!("conversation:{id}")
    }

    pub async fn get(&self, id: &ConversationId) -> Result<Option<Vec<ChatMessage>>> {
        let Some(value) = self.kv.get(&Self::key(id)).await? else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(messages) => Ok(Some(messages)),
            Err(e) => {
                warn!(conversation_id = %id, error = %e, "Discarding undecodable conversation record");
                Ok(None)
            }
        }
    }

    /// Persist the full history, resetting its expiry.
    pub async fn set(&self, id: &ConversationId, messages: &[ChatMessage]) -> Result<()> {
        let value = serde_json::to_value(messages)?;
        self.kv.set(&Self::key(id), value, Some(self.ttl)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_store::InMemoryKvStore;

    #[tokio::test]
    async fn absent_conversation_is_none() {
        let store = ConversationStore::new(Arc::new(InMemoryKvStore::new()), DEFAULT_TTL);
        assert!(store.get(&ConversationId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_round_trips_in_order() {
        let store = ConversationStore::new(Arc::new(InMemoryKvStore::new()), DEFAULT_TTL);
        let id = ConversationId::new();
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        store.set(&id, &history).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(history));
    }

    #[tokio::test]
    async fn undecodable_record_reads_as_absent() {
        let kv = Arc::new(InMemoryKvStore::new());
        kv.set("conversation:broken", serde_json::json!({"not": "a list"}), None)
            .await
            .unwrap();
        let store = ConversationStore::new(kv, DEFAULT_TTL);
        assert!(store.get(&ConversationId::from("broken")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_history_reads_as_absent() {
        let store = ConversationStore::new(Arc::new(InMemoryKvStore::new()), Duration::from_millis(10));
        let id = ConversationId::new();
        store.set(&id, &[ChatMessage::user("hi")]).await.unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(store.get(&id).await.unwrap().is_none());
    }
}
