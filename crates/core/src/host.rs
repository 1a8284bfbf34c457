//! Host substrate traits: the scheduling and storage primitives the
//! reconcilers and actions run on top of.
//!
//! The host provides:
//! - pending events (an output event that will be completed or cancelled later)
//! - timers (re-invoke a handler after N seconds with a payload)
//! - internal messaging (one-shot delivery from an accept stage to a perform stage)
//! - a TTL-bearing key-value store
//! - a per-resource signal store
//!
//! Nothing survives between invocations except what goes through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::HostError;

/// Opaque token for an output event that is not complete yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingId(pub String);

impl PendingId {
    pub fn new() -> Self {
        Self(format!("pending-{}", Uuid::new_v4()))
    }
}

impl Default for PendingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PendingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an emitted (or triggering) event, used for causal threading.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        Self(format!("evt-{}", Uuid::new_v4()))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of the primary output of every action.
pub const DEFAULT_OUTPUT: &str = "default";

/// Request to open a pending event on an output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub output_id: String,
    pub status_description: String,
    #[serde(default)]
    pub event: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<EventId>,
}

impl PendingRequest {
    pub fn new(status_description: impl Into<String>, event: serde_json::Value) -> Self {
        Self {
            output_id: DEFAULT_OUTPUT.into(),
            status_description: status_description.into(),
            event,
            parent_event_id: None,
        }
    }
}

/// An event to emit on an output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emission {
    pub output_id: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<EventId>,
}

impl Emission {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            output_id: DEFAULT_OUTPUT.into(),
            payload,
            parent_event_id: None,
        }
    }

    pub fn on_output(mut self, output_id: impl Into<String>) -> Self {
        self.output_id = output_id.into();
        self
    }

    pub fn with_parent(mut self, parent: Option<EventId>) -> Self {
        self.parent_event_id = parent;
        self
    }
}

/// What a complete/cancel call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// This call resolved the pending event.
    Resolved,
    /// The event was already resolved; nothing happened.
    AlreadyResolved,
}

/// Pending-event primitives.
///
/// Completion and cancellation are idempotent: once an event is resolved,
/// further attempts return [`Resolution::AlreadyResolved`] and have no
/// observable effect.
#[async_trait]
pub trait PendingEvents: Send + Sync {
    async fn create_pending(&self, request: PendingRequest) -> Result<PendingId, HostError>;

    /// Refresh an open event's progress. `Ok(false)` when the event is
    /// already resolved; nothing is published then.
    async fn update_pending(&self, id: &PendingId, status_description: &str) -> Result<bool, HostError>;

    async fn complete_pending(&self, id: &PendingId, emission: Emission) -> Result<Resolution, HostError>;

    async fn cancel_pending(&self, id: &PendingId, reason: &str) -> Result<Resolution, HostError>;

    /// Emit an event that was never pending.
    async fn emit(&self, emission: Emission) -> Result<EventId, HostError>;
}

/// A timer to fire later; `payload` is the only state the handler gets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRequest {
    /// Handler the timer is routed to
    pub target: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_event_id: Option<PendingId>,
    pub description: String,
}

#[async_trait]
pub trait Timers: Send + Sync {
    async fn set_timer(&self, delay: Duration, request: TimerRequest) -> Result<(), HostError>;
}

/// A one-shot message from an accept stage to a perform stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalMessage {
    pub target: String,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait Messaging: Send + Sync {
    async fn send(&self, message: InternalMessage) -> Result<(), HostError>;
}

/// Durable key-value storage with optional expiry.
///
/// An expired entry reads exactly like a missing one.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, HostError>;

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), HostError>;

    async fn delete(&self, key: &str) -> Result<bool, HostError>;
}

/// Durable per-resource slot for observed signals.
#[async_trait]
pub trait SignalStore: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self, resource: &str) -> Result<Option<serde_json::Value>, HostError>;

    async fn save(&self, resource: &str, snapshot: serde_json::Value) -> Result<(), HostError>;

    async fn remove(&self, resource: &str) -> Result<bool, HostError>;

    async fn resources(&self) -> Result<Vec<String>, HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_ids_are_unique() {
        assert_ne!(PendingId::new(), PendingId::new());
    }

    #[test]
    fn emission_defaults_to_primary_output() {
        let emission = Emission::new(serde_json::json!({"fileId": "f-1"}));
        assert_eq!(emission.output_id, DEFAULT_OUTPUT);
        let secondary = emission.on_output("assistantError");
        assert_eq!(secondary.output_id, "assistantError");
    }

    #[test]
    fn timer_request_serializes_camel_case() {
        let request = TimerRequest {
            target: "upload_file".into(),
            payload: serde_json::json!({}),
            pending_event_id: Some(PendingId("pending-1".into())),
            description: "Checking status".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["pendingEventId"], "pending-1");
    }
}
