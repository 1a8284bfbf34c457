//! In-memory pending-event ledger.
//!
//! Every pending event is resolved at most once. The ledger remembers how
//! each one ended, so a late second completion or cancellation (a timer
//! that fires after an error path already cancelled, say) is a logged
//! no-op instead of a duplicate output.
//!
//! Only the most recently resolved events are remembered, and the output
//! history keeps only the newest events; both limits are set with
//! [`InMemoryPendingEvents::with_retention`].

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use steward_core::error::HostError;
use steward_core::event::{EventBus, OutputEvent};
use steward_core::host::{Emission, EventId, PendingEvents, PendingId, PendingRequest, Resolution};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Resolved events remembered for late completions and cancellations.
pub const DEFAULT_RESOLVED_RETENTION: usize = 1024;

/// Output events kept in the history.
pub const DEFAULT_HISTORY_RETENTION: usize = 1024;

/// Where a pending event is in its life.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingState {
    Open { status_description: String },
    Completed { event_id: EventId },
    Cancelled { reason: String },
}

impl PendingState {
    pub fn is_open(&self) -> bool {
        matches!(self, PendingState::Open { .. })
    }
}

struct PendingEntry {
    request: PendingRequest,
    state: PendingState,
}

#[derive(Default)]
struct Ledger {
    entries: HashMap<PendingId, PendingEntry>,
    /// Resolved ids, oldest first
    resolved: VecDeque<PendingId>,
}

impl Ledger {
    fn open_entry(&mut self, id: &PendingId) -> Result<Option<&mut PendingEntry>, HostError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| HostError::UnknownPending(id.to_string()))?;
        Ok(if entry.state.is_open() { Some(entry) } else { None })
    }

    fn settle(&mut self, id: &PendingId, state: PendingState, retention: usize) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.state = state;
        }
        self.resolved.push_back(id.clone());
        while self.resolved.len() > retention {
            if let Some(oldest) = self.resolved.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

#[derive(Default)]
struct History {
    events: VecDeque<OutputEvent>,
    /// Events ever recorded, including evicted ones
    recorded: usize,
}

/// Pending events held in memory, with every output published on an
/// [`EventBus`] and kept in a bounded history.
pub struct InMemoryPendingEvents {
    ledger: Arc<RwLock<Ledger>>,
    history: Arc<RwLock<History>>,
    bus: Arc<EventBus>,
    resolved_retention: usize,
    history_retention: usize,
}

impl InMemoryPendingEvents {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(Ledger::default())),
            history: Arc::new(RwLock::new(History::default())),
            bus,
            resolved_retention: DEFAULT_RESOLVED_RETENTION,
            history_retention: DEFAULT_HISTORY_RETENTION,
        }
    }

    /// How many resolved events and history entries to keep.
    pub fn with_retention(mut self, resolved: usize, history: usize) -> Self {
        self.resolved_retention = resolved.max(1);
        self.history_retention = history.max(1);
        self
    }

    /// `None` for unknown ids and for resolved events already evicted.
    pub async fn state(&self, id: &PendingId) -> Option<PendingState> {
        self.ledger.read().await.entries.get(id).map(|e| e.state.clone())
    }

    /// The request a pending event was opened with.
    pub async fn request(&self, id: &PendingId) -> Option<PendingRequest> {
        self.ledger.read().await.entries.get(id).map(|e| e.request.clone())
    }

    pub async fn open_count(&self) -> usize {
        let ledger = self.ledger.read().await;
        ledger.entries.len() - ledger.resolved.len()
    }

    /// Retained outputs, oldest first.
    pub async fn history(&self) -> Vec<OutputEvent> {
        self.history.read().await.events.iter().cloned().collect()
    }

    /// Number of outputs ever recorded; a cursor for [`Self::history_since`].
    pub async fn recorded(&self) -> usize {
        self.history.read().await.recorded
    }

    /// Retained outputs recorded at or after `cursor`, oldest first.
    pub async fn history_since(&self, cursor: usize) -> Vec<OutputEvent> {
        let history = self.history.read().await;
        let first_retained = history.recorded - history.events.len();
        let skip = cursor.saturating_sub(first_retained);
        history.events.iter().skip(skip).cloned().collect()
    }

    async fn record(&self, event: OutputEvent) {
        {
            let mut history = self.history.write().await;
            history.events.push_back(event.clone());
            history.recorded += 1;
            while history.events.len() > self.history_retention {
                history.events.pop_front();
            }
        }
        self.bus.publish(event);
    }
}

impl Default for InMemoryPendingEvents {
    fn default() -> Self {
        Self::new(Arc::new(EventBus::default()))
    }
}

#[async_trait]
impl PendingEvents for InMemoryPendingEvents {
    async fn create_pending(&self, request: PendingRequest) -> Result<PendingId, HostError> {
        let id = PendingId::new();
        debug!(pending_id = %id, output = %request.output_id, status = %request.status_description, "Pending event created");

        let state = PendingState::Open {
            status_description: request.status_description.clone(),
        };
        self.ledger
            .write()
            .await
            .entries
            .insert(id.clone(), PendingEntry { request, state });
        Ok(id)
    }

    async fn update_pending(&self, id: &PendingId, status_description: &str) -> Result<bool, HostError> {
        {
            let mut ledger = self.ledger.write().await;
            let Some(entry) = ledger.open_entry(id)? else {
                debug!(pending_id = %id, "Ignoring progress update on resolved pending event");
                return Ok(false);
            };
            entry.state = PendingState::Open {
                status_description: status_description.to_string(),
            };
        }

        self.record(OutputEvent::Progress {
            pending_id: id.clone(),
            status_description: status_description.to_string(),
            timestamp: Utc::now(),
        })
        .await;
        Ok(true)
    }

    async fn complete_pending(&self, id: &PendingId, emission: Emission) -> Result<Resolution, HostError> {
        let event_id = EventId::new();
        let parent = {
            let mut ledger = self.ledger.write().await;
            let Some(entry) = ledger.open_entry(id)? else {
                warn!(pending_id = %id, "Pending event already resolved; completion ignored");
                return Ok(Resolution::AlreadyResolved);
            };
            let parent = emission
                .parent_event_id
                .clone()
                .or_else(|| entry.request.parent_event_id.clone());
            ledger.settle(
                id,
                PendingState::Completed {
                    event_id: event_id.clone(),
                },
                self.resolved_retention,
            );
            parent
        };

        debug!(pending_id = %id, event_id = %event_id, output = %emission.output_id, "Pending event completed");
        self.record(OutputEvent::Emitted {
            event_id,
            output_id: emission.output_id,
            payload: emission.payload,
            completes: Some(id.clone()),
            parent_event_id: parent,
            timestamp: Utc::now(),
        })
        .await;
        Ok(Resolution::Resolved)
    }

    async fn cancel_pending(&self, id: &PendingId, reason: &str) -> Result<Resolution, HostError> {
        {
            let mut ledger = self.ledger.write().await;
            if ledger.open_entry(id)?.is_none() {
                warn!(pending_id = %id, "Pending event already resolved; cancellation ignored");
                return Ok(Resolution::AlreadyResolved);
            }
            ledger.settle(
                id,
                PendingState::Cancelled {
                    reason: reason.to_string(),
                },
                self.resolved_retention,
            );
        }

        debug!(pending_id = %id, reason = %reason, "Pending event cancelled");
        self.record(OutputEvent::Cancelled {
            pending_id: id.clone(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        })
        .await;
        Ok(Resolution::Resolved)
    }

    async fn emit(&self, emission: Emission) -> Result<EventId, HostError> {
        let event_id = EventId::new();
        self.record(OutputEvent::Emitted {
            event_id: event_id.clone(),
            output_id: emission.output_id,
            payload: emission.payload,
            completes: None,
            parent_event_id: emission.parent_event_id,
            timestamp: Utc::now(),
        })
        .await;
        Ok(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn complete_resolves_once() {
        let pending = InMemoryPendingEvents::default();
        let id = pending
            .create_pending(PendingRequest::new("Listing files...", json!({})))
            .await
            .unwrap();
        assert_eq!(pending.open_count().await, 1);

        let first = pending
            .complete_pending(&id, Emission::new(json!({"files": []})))
            .await
            .unwrap();
        assert_eq!(first, Resolution::Resolved);

        let second = pending
            .complete_pending(&id, Emission::new(json!({"files": ["late"]})))
            .await
            .unwrap();
        assert_eq!(second, Resolution::AlreadyResolved);

        let cancel = pending.cancel_pending(&id, "too late").await.unwrap();
        assert_eq!(cancel, Resolution::AlreadyResolved);

        // Only the first resolution is visible
        let history = pending.history().await;
        assert_eq!(history.len(), 1);
        assert!(matches!(pending.state(&id).await, Some(PendingState::Completed { .. })));
        assert_eq!(pending.open_count().await, 0);
    }

    #[tokio::test]
    async fn cancel_then_complete_is_ignored() {
        let pending = InMemoryPendingEvents::default();
        let id = pending
            .create_pending(PendingRequest::new("Checking file status...", json!({})))
            .await
            .unwrap();

        pending.cancel_pending(&id, "Failed to check file status: boom").await.unwrap();
        let late = pending.complete_pending(&id, Emission::new(json!({}))).await.unwrap();
        assert_eq!(late, Resolution::AlreadyResolved);

        match pending.state(&id).await.unwrap() {
            PendingState::Cancelled { reason } => assert!(reason.contains("boom")),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn progress_updates_are_published() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let pending = InMemoryPendingEvents::new(bus);

        let id = pending
            .create_pending(PendingRequest::new("Checking file status...", json!({})))
            .await
            .unwrap();
        assert!(
            pending
                .update_pending(&id, "Processing file... 40.0% complete")
                .await
                .unwrap()
        );

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.as_ref(), OutputEvent::Progress { status_description, .. } if status_description.contains("40.0%")));
        assert_eq!(
            pending.state(&id).await,
            Some(PendingState::Open {
                status_description: "Processing file... 40.0% complete".into()
            })
        );
    }

    #[tokio::test]
    async fn completion_inherits_request_parent() {
        let pending = InMemoryPendingEvents::default();
        let parent = EventId::new();
        let mut request = PendingRequest::new("Assistant response in progress", json!({}));
        request.parent_event_id = Some(parent.clone());
        let id = pending.create_pending(request).await.unwrap();

        pending.complete_pending(&id, Emission::new(json!({"response": "ok"}))).await.unwrap();

        match &pending.history().await[0] {
            OutputEvent::Emitted { parent_event_id, completes, .. } => {
                assert_eq!(parent_event_id.as_ref(), Some(&parent));
                assert_eq!(completes.as_ref(), Some(&id));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_pending_is_an_error() {
        let pending = InMemoryPendingEvents::default();
        let err = pending
            .cancel_pending(&PendingId("pending-missing".into()), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::UnknownPending(_)));
    }

    #[tokio::test]
    async fn plain_emit_does_not_touch_ledger() {
        let pending = InMemoryPendingEvents::default();
        pending
            .emit(Emission::new(json!({"fileId": "file-1"})))
            .await
            .unwrap();
        assert_eq!(pending.open_count().await, 0);
        assert_eq!(pending.history().await.len(), 1);
    }

    #[tokio::test]
    async fn progress_after_resolution_is_refused() {
        let pending = InMemoryPendingEvents::default();
        let id = pending
            .create_pending(PendingRequest::new("Checking file status...", json!({})))
            .await
            .unwrap();
        pending.complete_pending(&id, Emission::new(json!({}))).await.unwrap();

        let open = pending.update_pending(&id, "Processing file... 90.0% complete").await.unwrap();

        assert!(!open);
        assert_eq!(pending.history().await.len(), 1);
    }

    #[tokio::test]
    async fn resolved_entries_and_history_are_bounded() {
        let pending = InMemoryPendingEvents::default().with_retention(2, 3);
        let mut ids = Vec::new();
        for n in 0..4 {
            let id = pending
                .create_pending(PendingRequest::new("Listing files...", json!({})))
                .await
                .unwrap();
            pending.complete_pending(&id, Emission::new(json!({"n": n}))).await.unwrap();
            ids.push(id);
        }
        let still_open = pending
            .create_pending(PendingRequest::new("Checking file status...", json!({})))
            .await
            .unwrap();

        // Oldest resolved entries are forgotten; the open one never is
        assert!(pending.state(&ids[0]).await.is_none());
        assert!(pending.state(&ids[1]).await.is_none());
        assert!(matches!(pending.state(&ids[3]).await, Some(PendingState::Completed { .. })));
        assert_eq!(pending.open_count().await, 1);
        assert!(pending.state(&still_open).await.unwrap().is_open());

        // Late resolution of a remembered event stays idempotent
        let late = pending.cancel_pending(&ids[3], "too late").await.unwrap();
        assert_eq!(late, Resolution::AlreadyResolved);

        let history = pending.history().await;
        assert_eq!(history.len(), 3);
        assert_eq!(pending.recorded().await, 4);
        match &history[0] {
            OutputEvent::Emitted { payload, .. } => assert_eq!(payload["n"], 1),
            other => panic!("unexpected event {other:?}"),
        }

        // A cursor older than the retained window yields what is left
        assert_eq!(pending.history_since(0).await.len(), 3);
        assert_eq!(pending.history_since(3).await.len(), 1);
        assert!(pending.history_since(4).await.is_empty());
    }
}
