//! Trigger-driven operations against the remote assistant.
//!
//! An action accepts a trigger event, opens a pending event on its output,
//! and resolves it exactly once. Work that outlives one invocation is
//! handed back to the host:
//! - chat goes through an internal message (accept stage, then perform stage)
//! - file upload polls through timers until processing finishes
//!
//! Message bodies and timer payloads are the only resumption state; an
//! action instance keeps nothing between invocations.

pub mod chat;
pub mod context;
pub mod conversation;
pub mod files;
pub mod update;
pub mod upload;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use steward_core::error::{Error, Result};
use steward_core::host::{
    EventId, InternalMessage, KeyValueStore, Messaging, PendingEvents, PendingId, TimerRequest, Timers,
};
use steward_core::remote::AssistantService;

pub use chat::{RawChatAction, RawChatOptions, SimpleChatAction};
pub use context::RetrieveSnippetsAction;
pub use conversation::ConversationStore;
pub use files::{DeleteFileAction, ListFilesAction};
pub use update::UpdateAssistantAction;
pub use upload::UploadFileAction;

/// Output name simple chat reports failures on.
pub const ASSISTANT_ERROR_OUTPUT: &str = "assistantError";

/// The host capabilities an action runs against.
#[derive(Clone)]
pub struct ActionContext {
    pub remote: Arc<dyn AssistantService>,
    pub pending: Arc<dyn PendingEvents>,
    pub timers: Arc<dyn Timers>,
    pub messaging: Arc<dyn Messaging>,
    pub kv: Arc<dyn KeyValueStore>,
}

/// An incoming trigger: the event id (for causal threading) and the
/// action-specific input as JSON.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub event_id: EventId,
    pub input: serde_json::Value,
}

impl Trigger {
    pub fn new(input: serde_json::Value) -> Self {
        Self {
            event_id: EventId::new(),
            input,
        }
    }
}

/// A trigger-driven operation.
#[async_trait]
pub trait Action: Send + Sync {
    /// Unique name; internal messages and timers are routed by it.
    fn name(&self) -> &str;

    /// Accept a trigger. Returns the pending event opened for it, if any.
    async fn on_event(&self, ctx: &ActionContext, trigger: Trigger) -> Result<Option<PendingId>>;

    /// Perform stage, reached through an internal message.
    async fn on_message(&self, _ctx: &ActionContext, _body: serde_json::Value) -> Result<()> {
        Err(Error::Internal(format!("{} does not take internal messages", self.name())))
    }

    /// Continuation, reached through a timer.
    async fn on_timer(&self, _ctx: &ActionContext, _payload: serde_json::Value) -> Result<()> {
        Err(Error::Internal(format!("{} does not set timers", self.name())))
    }
}

/// Decode an action input, reporting malformed input as a validation error.
pub(crate) fn parse_input<T: DeserializeOwned>(action: &str, input: serde_json::Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| Error::Validation(format!("Invalid input for {action}: {e}")))
}

/// A registry of available actions, keyed by name.
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Register an action. Replaces any existing action with the same name.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.name().to_string(), action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    fn lookup(&self, name: &str) -> Result<&Arc<dyn Action>> {
        self.actions
            .get(name)
            .ok_or_else(|| Error::Internal(format!("No action named '{name}'")))
    }

    pub async fn trigger(&self, name: &str, ctx: &ActionContext, trigger: Trigger) -> Result<Option<PendingId>> {
        self.lookup(name)?.on_event(ctx, trigger).await
    }

    /// Route an internal message to its target action.
    pub async fn deliver(&self, ctx: &ActionContext, message: InternalMessage) -> Result<()> {
        self.lookup(&message.target)?.on_message(ctx, message.body).await
    }

    /// Route a fired timer to its target action.
    pub async fn fire(&self, ctx: &ActionContext, timer: TimerRequest) -> Result<()> {
        self.lookup(&timer.target)?.on_timer(ctx, timer.payload).await
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Harness;
    use super::*;
    use steward_remote::MockAssistantService;

    #[test]
    fn registry_lists_sorted_names() {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(UpdateAssistantAction::new("docs")));
        registry.register(Arc::new(ListFilesAction::new("docs")));
        assert_eq!(registry.names(), vec!["list_files", "update_assistant"]);
        assert!(registry.get("list_files").is_some());
        assert!(registry.get("chat").is_none());
    }

    #[tokio::test]
    async fn unknown_target_is_an_error() {
        let harness = Harness::new(MockAssistantService::new());
        let registry = ActionRegistry::new();
        let err = registry
            .deliver(
                &harness.ctx,
                InternalMessage {
                    target: "ghost".into(),
                    body: serde_json::json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn actions_without_timers_reject_them() {
        let harness = Harness::new(MockAssistantService::new());
        let action = ListFilesAction::new("docs");
        assert!(action.on_timer(&harness.ctx, serde_json::json!({})).await.is_err());
    }
}
