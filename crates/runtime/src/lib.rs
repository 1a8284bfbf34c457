//! Local runtime for Steward.
//!
//! Hosts reconcilers and actions in a single process:
//! - [`ResourceDriver`] runs reconciliation cycles and drains against a
//!   signal store
//! - [`LocalRuntime`] triggers actions and dispatches their timers and
//!   internal messages until the invocation goes idle
//! - [`Reconciliation`] turns the application config into reconcilers
//!   and runs a whole sync pass

pub mod driver;
pub mod host;
pub mod wiring;

use std::sync::Arc;
use steward_actions::{ActionContext, ActionRegistry, Trigger};
use steward_core::error::Result;
use steward_core::event::{EventBus, OutputEvent};
use steward_core::host::{KeyValueStore, PendingId};
use steward_core::remote::AssistantService;
use steward_store::{InMemoryKvStore, InMemoryPendingEvents};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use driver::ResourceDriver;
pub use host::{Job, JobQueue, LocalHost, local_host};
pub use wiring::{DesiredState, Reconciliation, ResourceReport, raw_chat_action, recorded_status, registry_from_config};

/// What one action invocation produced.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The pending event the trigger opened, if any
    pub pending: Option<PendingId>,
    /// Every output published while the invocation ran, in order
    pub events: Vec<OutputEvent>,
}

impl Invocation {
    /// The event that resolved the invocation's pending event.
    pub fn resolution(&self) -> Option<&OutputEvent> {
        let pending = self.pending.as_ref()?;
        self.events
            .iter()
            .find(|e| e.is_resolution() && e.pending_id() == Some(pending))
    }

    /// Payloads emitted on `output_id`.
    pub fn emitted_on<'a>(&'a self, output_id: &'a str) -> impl Iterator<Item = &'a serde_json::Value> + 'a {
        self.events.iter().filter_map(move |e| match e {
            OutputEvent::Emitted { output_id: out, payload, .. } if out == output_id => Some(payload),
            _ => None,
        })
    }
}

/// Actions wired to in-memory stores and the local job queue.
pub struct LocalRuntime {
    registry: ActionRegistry,
    ctx: ActionContext,
    pending: Arc<InMemoryPendingEvents>,
    bus: Arc<EventBus>,
    queue: JobQueue,
}

impl LocalRuntime {
    pub fn new(remote: Arc<dyn AssistantService>, registry: ActionRegistry) -> Self {
        Self::with_kv(remote, registry, Arc::new(InMemoryKvStore::new()))
    }

    pub fn with_kv(remote: Arc<dyn AssistantService>, registry: ActionRegistry, kv: Arc<dyn KeyValueStore>) -> Self {
        let bus = Arc::new(EventBus::default());
        let pending = Arc::new(InMemoryPendingEvents::new(bus.clone()));
        let (host, queue) = local_host();
        let host = Arc::new(host);

        let ctx = ActionContext {
            remote,
            pending: pending.clone(),
            timers: host.clone(),
            messaging: host,
            kv,
        };

        Self {
            registry,
            ctx,
            pending,
            bus,
            queue,
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Swap or add actions between invocations.
    pub fn registry_mut(&mut self) -> &mut ActionRegistry {
        &mut self.registry
    }

    /// Live output events, including progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<OutputEvent>> {
        self.bus.subscribe()
    }

    /// Trigger an action and run its continuations to completion.
    ///
    /// A trigger that is rejected outright returns its error. Errors from
    /// continuations are logged; they show up as cancellations or error
    /// outputs in the returned events.
    pub async fn invoke(&mut self, action: &str, input: serde_json::Value) -> Result<Invocation> {
        let start = self.pending.recorded().await;
        let trigger = Trigger::new(input);
        info!(action, event_id = %trigger.event_id, "Triggering action");

        let pending = self.registry.trigger(action, &self.ctx, trigger).await?;
        self.run_until_idle().await;

        let events = self.pending.history_since(start).await;
        Ok(Invocation { pending, events })
    }

    /// Dispatch queued jobs until nothing is scheduled.
    pub async fn run_until_idle(&mut self) {
        while let Some(job) = self.queue.next().await {
            let target = job.target().to_string();
            debug!(target_action = %target, "Dispatching job");

            let result = match job {
                Job::Timer(timer) => self.registry.fire(&self.ctx, timer).await,
                Job::Message(message) => self.registry.deliver(&self.ctx, message).await,
            };
            if let Err(e) = result {
                warn!(target_action = %target, error = %e, "Continuation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steward_actions::{ListFilesAction, SimpleChatAction, UploadFileAction};
    use steward_remote::mock::{FileProgress, MockAssistantService};

    fn runtime(remote: Arc<MockAssistantService>) -> LocalRuntime {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(UploadFileAction::new("docs")));
        registry.register(Arc::new(SimpleChatAction::new("docs")));
        registry.register(Arc::new(ListFilesAction::new("docs")));
        LocalRuntime::new(remote, registry)
    }

    #[tokio::test(start_paused = true)]
    async fn upload_runs_until_available() {
        let remote = Arc::new(MockAssistantService::new());
        remote.script_file_progress(vec![
            FileProgress::processing(0.4),
            FileProgress::processing(0.9),
            FileProgress::available(),
        ]);
        let mut runtime = runtime(remote.clone());

        let invocation = runtime
            .invoke("upload_file", json!({"content": "Runbook", "filename": "runbook.md"}))
            .await
            .unwrap();

        let resolution = invocation.resolution().unwrap();
        match resolution {
            OutputEvent::Emitted { payload, .. } => {
                assert_eq!(payload["fileId"], "file-1");
                assert_eq!(payload["status"], "Available");
            }
            other => panic!("unexpected resolution {other:?}"),
        }
        let progress = invocation
            .events
            .iter()
            .filter(|e| matches!(e, OutputEvent::Progress { .. }))
            .count();
        assert_eq!(progress, 2);
        assert_eq!(remote.call_count("describe_file"), 3);
    }

    #[tokio::test]
    async fn chat_resolves_through_internal_message() {
        let remote = Arc::new(MockAssistantService::new());
        let mut runtime = runtime(remote);

        let invocation = runtime.invoke("chat", json!({"userMessage": "hi"})).await.unwrap();
        let reply: Vec<_> = invocation.emitted_on("default").collect();
        assert_eq!(reply.len(), 1);
        assert_eq!(reply[0]["response"], "echo: hi");
        assert_eq!(reply[0]["continued"], false);
        assert!(invocation.resolution().is_some());
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let mut runtime = runtime(Arc::new(MockAssistantService::new()));
        assert!(runtime.invoke("ghost", json!({})).await.is_err());
        assert_eq!(runtime.registry().names().len(), 3);
    }
}
