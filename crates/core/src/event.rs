//! Output event bus: where completed, cancelled and plain emissions land.
//!
//! The in-process host publishes every resolved output here. Callers (the
//! CLI, integration tests) subscribe to wait for the event they triggered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::host::{EventId, PendingId};

/// Something an action produced on one of its outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputEvent {
    /// A pending event was completed, or a plain event was emitted
    Emitted {
        event_id: EventId,
        output_id: String,
        payload: serde_json::Value,
        completes: Option<PendingId>,
        parent_event_id: Option<EventId>,
        timestamp: DateTime<Utc>,
    },

    /// A pending event was cancelled with a reason
    Cancelled {
        pending_id: PendingId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A pending event's progress description changed
    Progress {
        pending_id: PendingId,
        status_description: String,
        timestamp: DateTime<Utc>,
    },
}

impl OutputEvent {
    /// The pending event this output resolves or updates, if any.
    pub fn pending_id(&self) -> Option<&PendingId> {
        match self {
            OutputEvent::Emitted { completes, .. } => completes.as_ref(),
            OutputEvent::Cancelled { pending_id, .. } => Some(pending_id),
            OutputEvent::Progress { pending_id, .. } => Some(pending_id),
        }
    }

    /// Whether this event ends a pending event's life.
    pub fn is_resolution(&self) -> bool {
        match self {
            OutputEvent::Emitted { completes, .. } => completes.is_some(),
            OutputEvent::Cancelled { .. } => true,
            OutputEvent::Progress { .. } => false,
        }
    }
}

/// A broadcast-based bus for output events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<OutputEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: OutputEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<OutputEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
