//! Resource driver: runs reconciliation cycles for one resource until it
//! settles, persisting the observed snapshot after every cycle.

use std::sync::Arc;
use steward_core::error::{Error, Result};
use steward_core::host::SignalStore;
use steward_core::lifecycle::{DrainOutcome, LifecycleStatus, Observed, Signals, SyncOutcome};
use steward_reconcile::Reconciler;
use tracing::{debug, info, warn};

/// Upper bound on cycles in one `drive` call.
pub const DEFAULT_MAX_CYCLES: usize = 120;

pub struct ResourceDriver {
    store: Arc<dyn SignalStore>,
    max_cycles: usize,
}

impl ResourceDriver {
    pub fn new(store: Arc<dyn SignalStore>) -> Self {
        Self {
            store,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles.max(1);
        self
    }

    /// Read a resource's snapshot. A missing or unreadable one starts over
    /// from the default.
    pub async fn load<S: Signals>(&self, key: &str) -> Result<Observed<S>> {
        let Some(raw) = self.store.load(key).await? else {
            return Ok(Observed::default());
        };
        match serde_json::from_value(raw) {
            Ok(observed) => Ok(observed),
            Err(e) => {
                warn!(resource = %key, error = %e, "Discarding unreadable snapshot");
                Ok(Observed::default())
            }
        }
    }

    async fn save<S: Signals>(&self, key: &str, observed: &Observed<S>) -> Result<()> {
        self.store.save(key, serde_json::to_value(observed)?).await?;
        Ok(())
    }

    /// Run exactly one cycle and persist its outcome.
    pub async fn step<R: Reconciler>(&self, reconciler: &R) -> Result<(Observed<R::Signals>, SyncOutcome<R::Signals>)> {
        let key = reconciler.resource_key();
        let mut observed = self.load::<R::Signals>(&key).await?;
        let outcome = reconciler.sync(&observed).await;
        observed.apply(&outcome);
        if let Some(owner) = reconciler.owner() {
            observed.owner = Some(owner);
        }
        self.save(&key, &observed).await?;
        Ok((observed, outcome))
    }

    /// Cycle until the reconciler stops asking to be re-invoked, sleeping
    /// for each requested delay in between.
    pub async fn drive<R: Reconciler>(&self, reconciler: &R) -> Result<Observed<R::Signals>> {
        let key = reconciler.resource_key();

        for cycle in 1..=self.max_cycles {
            let (observed, outcome) = self.step(reconciler).await?;
            info!(
                resource = %key,
                cycle,
                status = observed.lifecycle.map(|s| s.as_str()).unwrap_or("uninitialized"),
                description = observed.description.as_deref().unwrap_or(""),
                "Reconciliation cycle finished"
            );

            let terminal = observed.lifecycle.is_some_and(|s| s.is_terminal());
            match outcome.next_schedule_delay {
                Some(delay) if !terminal => {
                    debug!(resource = %key, delay_secs = delay.as_secs(), "Scheduling next cycle");
                    tokio::time::sleep(delay).await;
                }
                _ => return Ok(observed),
            }
        }

        Err(Error::Internal(format!(
            "{key} did not settle within {} cycles",
            self.max_cycles
        )))
    }

    /// Tear the resource down. A drained resource's snapshot is removed;
    /// a failed drain is persisted with its reason.
    pub async fn drain<R: Reconciler>(&self, reconciler: &R) -> Result<DrainOutcome> {
        let key = reconciler.resource_key();
        let mut observed = self.load::<R::Signals>(&key).await?;

        observed.lifecycle = Some(LifecycleStatus::Draining);
        self.save(&key, &observed).await?;

        let outcome = reconciler.drain(&observed).await;
        match &outcome {
            DrainOutcome::Drained => {
                self.store.remove(&key).await?;
                info!(resource = %key, "Resource drained");
            }
            DrainOutcome::DrainingFailed { reason } => {
                observed.apply_drain(&outcome);
                self.save(&key, &observed).await?;
                warn!(resource = %key, reason = %reason, "Drain failed");
            }
        }
        Ok(outcome)
    }

    /// Persist a drain that failed before any reconciler could run.
    pub async fn record_drain_failure<S: Signals>(&self, key: &str, reason: impl Into<String>) -> Result<DrainOutcome> {
        let outcome = DrainOutcome::DrainingFailed { reason: reason.into() };
        let mut observed = self.load::<S>(key).await?;
        observed.apply_drain(&outcome);
        self.save(key, &observed).await?;
        warn!(resource = %key, reason = outcome.reason().unwrap_or(""), "Drain failed");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::error::RemoteError;
    use steward_core::remote::{AssistantStatus, FileStatus, Metadata, Region};
    use steward_reconcile::{AssistantReconciler, AssistantSignals, DataFileReconciler, DataFileSignals, DesiredAssistant, DesiredDataFile};
    use steward_remote::mock::{FileProgress, MockAssistantService};
    use steward_store::InMemorySignalStore;

    fn assistant(remote: Arc<MockAssistantService>) -> AssistantReconciler {
        AssistantReconciler::new(
            DesiredAssistant {
                name: "docs".into(),
                instructions: "Answer from the docs".into(),
                metadata: Metadata::new(),
                region: Region::Us,
            },
            remote,
        )
    }

    fn data_file(remote: Arc<MockAssistantService>, content: &str) -> DataFileReconciler {
        DataFileReconciler::new(
            DesiredDataFile {
                key: "handbook".into(),
                assistant: "docs".into(),
                content: content.into(),
                filename: Some("handbook.md".into()),
                metadata: Metadata::new(),
            },
            remote,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn drive_converges_after_create() {
        let remote = Arc::new(MockAssistantService::new());
        remote.script_assistant_statuses(vec![AssistantStatus::Initializing, AssistantStatus::Ready]);
        let store = Arc::new(InMemorySignalStore::new());
        let driver = ResourceDriver::new(store.clone());

        let observed = driver.drive(&assistant(remote.clone())).await.unwrap();

        assert_eq!(observed.lifecycle, Some(LifecycleStatus::Ready));
        assert_eq!(observed.signals.status, Some(AssistantStatus::Ready));
        assert_eq!(remote.call_count("create_assistant"), 1);
        assert_eq!(remote.call_count("describe_assistant"), 2);

        let persisted: Observed<AssistantSignals> = driver.load("assistant:docs").await.unwrap();
        assert_eq!(persisted.lifecycle, Some(LifecycleStatus::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn settled_file_makes_no_calls() {
        let remote = Arc::new(MockAssistantService::new());
        remote.script_file_progress(vec![FileProgress::available()]);
        let driver = ResourceDriver::new(Arc::new(InMemorySignalStore::new()));
        let reconciler = data_file(remote.clone(), "v1");

        driver.drive(&reconciler).await.unwrap();
        remote.clear_calls();

        let observed = driver.drive(&reconciler).await.unwrap();
        assert_eq!(observed.lifecycle, Some(LifecycleStatus::Ready));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drift_replaces_file() {
        let remote = Arc::new(MockAssistantService::new());
        remote.script_file_progress(vec![FileProgress::available(), FileProgress::available()]);
        let driver = ResourceDriver::new(Arc::new(InMemorySignalStore::new()));

        let first = driver.drive(&data_file(remote.clone(), "v1")).await.unwrap();
        let second = driver.drive(&data_file(remote.clone(), "v2")).await.unwrap();

        assert_eq!(first.signals.file_id.as_deref(), Some("file-1"));
        assert_eq!(second.signals.file_id.as_deref(), Some("file-2"));
        assert_ne!(first.signals.content_hash, second.signals.content_hash);
        assert_eq!(remote.call_count("delete_file"), 1);
        assert_eq!(remote.file_ids("docs"), vec!["file-2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_stops_cycling() {
        let remote = Arc::new(MockAssistantService::new());
        remote.fail_next("create_assistant", RemoteError::Network("connection refused".into()));
        let driver = ResourceDriver::new(Arc::new(InMemorySignalStore::new()));

        let observed = driver.drive(&assistant(remote.clone())).await.unwrap();
        assert_eq!(observed.lifecycle, Some(LifecycleStatus::Failed));
        assert!(observed.description.unwrap().starts_with("Creation failed:"));
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_limit_is_an_error() {
        let remote = Arc::new(MockAssistantService::new());
        let driver = ResourceDriver::new(Arc::new(InMemorySignalStore::new())).with_max_cycles(3);

        // Never leaves Initializing
        let err = driver.drive(&assistant(remote)).await.unwrap_err();
        assert!(err.to_string().contains("did not settle within 3 cycles"));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_removes_snapshot_and_tolerates_absence() {
        let remote = Arc::new(MockAssistantService::new());
        remote.script_file_progress(vec![FileProgress::available()]);
        let store = Arc::new(InMemorySignalStore::new());
        let driver = ResourceDriver::new(store.clone());
        let reconciler = data_file(remote.clone(), "v1");
        driver.drive(&reconciler).await.unwrap();

        assert_eq!(driver.drain(&reconciler).await.unwrap(), DrainOutcome::Drained);
        assert!(store.load("file:handbook").await.unwrap().is_none());
        assert!(remote.file_ids("docs").is_empty());

        // Second drain: nothing recorded, nothing to delete
        assert_eq!(driver.drain(&reconciler).await.unwrap(), DrainOutcome::Drained);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_drain_is_persisted() {
        let remote = Arc::new(MockAssistantService::new());
        remote.script_file_progress(vec![FileProgress::available()]);
        let driver = ResourceDriver::new(Arc::new(InMemorySignalStore::new()));
        let reconciler = data_file(remote.clone(), "v1");
        driver.drive(&reconciler).await.unwrap();

        remote.fail_next(
            "delete_file",
            RemoteError::ApiError {
                status_code: 500,
                message: "internal".into(),
            },
        );
        let outcome = driver.drain(&reconciler).await.unwrap();
        assert_eq!(outcome.status(), LifecycleStatus::DrainingFailed);

        let persisted: Observed<DataFileSignals> = driver.load("file:handbook").await.unwrap();
        assert_eq!(persisted.lifecycle, Some(LifecycleStatus::DrainingFailed));
        assert!(persisted.description.unwrap().starts_with("Failed to delete file:"));
        assert_eq!(persisted.signals.status, Some(FileStatus::Available));
    }
}
