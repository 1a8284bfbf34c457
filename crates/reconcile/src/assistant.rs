//! Assistant reconciler.
//!
//! Keyed on the last remote status recorded in the signals:
//! - nothing recorded: create the assistant and poll
//! - `Initializing`: describe until the remote reports `Ready`
//! - `Ready`: describe, and push a partial update if instructions or
//!   metadata drifted from the desired values
//! - anything else: fail with the unknown status
//!
//! Drift is detected by a live read rather than a fingerprint, since the
//! remote side can change the assistant out of band.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use steward_core::lifecycle::{DrainOutcome, Observed, Signals, SyncOutcome};
use steward_core::remote::{
    AssistantInfo, AssistantService, AssistantStatus, AssistantUpdate, CreateAssistant, Metadata, Region,
};
use tracing::{debug, error, info, warn};

use crate::Reconciler;

pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(10);

/// Persisted assistant signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AssistantStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl AssistantSignals {
    fn from_info(info: &AssistantInfo) -> Self {
        Self {
            status: Some(info.status.clone()),
            host: info.host.clone(),
        }
    }
}

impl Signals for AssistantSignals {
    fn merge(&mut self, update: Self) {
        if update.status.is_some() {
            self.status = update.status;
        }
        if update.host.is_some() {
            self.host = update.host;
        }
    }
}

/// Declared assistant configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredAssistant {
    pub name: String,
    pub instructions: String,
    pub metadata: Metadata,
    pub region: Region,
}

/// What one cycle is going to do.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantStep {
    Create,
    PollInitializing,
    Revalidate,
    Unknown(AssistantStatus),
}

/// Decide the step from the persisted signals alone.
pub fn plan(signals: &AssistantSignals) -> AssistantStep {
    match &signals.status {
        None => AssistantStep::Create,
        Some(AssistantStatus::Initializing) => AssistantStep::PollInitializing,
        Some(AssistantStatus::Ready) => AssistantStep::Revalidate,
        Some(other) => AssistantStep::Unknown(other.clone()),
    }
}

/// The partial update that brings `current` to `desired`. Only drifted
/// fields are set; an empty update means nothing to do.
pub fn diff(current: &AssistantInfo, desired: &DesiredAssistant) -> AssistantUpdate {
    let instructions = (current.instructions.as_deref() != Some(desired.instructions.as_str()))
        .then(|| desired.instructions.clone());

    let current_metadata = current.metadata.clone().unwrap_or_default();
    let metadata = (current_metadata != desired.metadata).then(|| desired.metadata.clone());

    AssistantUpdate { instructions, metadata }
}

pub struct AssistantReconciler {
    desired: DesiredAssistant,
    remote: Arc<dyn AssistantService>,
    poll_delay: Duration,
}

impl AssistantReconciler {
    pub fn new(desired: DesiredAssistant, remote: Arc<dyn AssistantService>) -> Self {
        Self {
            desired,
            remote,
            poll_delay: DEFAULT_POLL_DELAY,
        }
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn desired(&self) -> &DesiredAssistant {
        &self.desired
    }

    async fn create(&self) -> SyncOutcome<AssistantSignals> {
        let request = CreateAssistant {
            name: self.desired.name.clone(),
            instructions: self.desired.instructions.clone(),
            metadata: self.desired.metadata.clone(),
            region: self.desired.region,
        };

        match self.remote.create_assistant(request).await {
            Ok(info) => {
                info!(assistant = %self.desired.name, status = %info.status, "Assistant created");
                SyncOutcome::in_progress("Initializing...", self.poll_delay)
                    .with_signals(AssistantSignals::from_info(&info))
            }
            Err(e) => {
                error!(assistant = %self.desired.name, error = %e, "Failed to create assistant");
                SyncOutcome::failed(format!("Creation failed: {e}"))
            }
        }
    }

    async fn poll(&self) -> SyncOutcome<AssistantSignals> {
        let info = match self.remote.describe_assistant(&self.desired.name).await {
            Ok(info) => info,
            Err(e) => {
                error!(assistant = %self.desired.name, error = %e, "Failed to check assistant status");
                return SyncOutcome::failed(format!("Status check failed: {e}"));
            }
        };

        let signals = AssistantSignals::from_info(&info);
        match &info.status {
            AssistantStatus::Ready => {
                info!(assistant = %self.desired.name, "Assistant ready");
                SyncOutcome::ready().with_signals(signals)
            }
            AssistantStatus::Initializing => {
                debug!(assistant = %self.desired.name, "Assistant still initializing");
                SyncOutcome::in_progress("Still initializing...", self.poll_delay).with_signals(signals)
            }
            other => {
                error!(assistant = %self.desired.name, status = %other, "Assistant failed");
                SyncOutcome::failed(format!("Assistant failed: {other}")).with_signals(signals)
            }
        }
    }

    async fn revalidate(&self) -> SyncOutcome<AssistantSignals> {
        let name = &self.desired.name;
        let current = match self.remote.describe_assistant(name).await {
            Ok(info) => info,
            Err(e) => {
                error!(assistant = %name, error = %e, "Failed to read assistant for drift check");
                return SyncOutcome::failed(format!("Update failed: {e}"));
            }
        };

        let update = diff(&current, &self.desired);
        if update.is_empty() {
            return SyncOutcome::ready();
        }

        info!(
            assistant = %name,
            instructions = update.instructions.is_some(),
            metadata = update.metadata.is_some(),
            "Assistant drifted, updating"
        );
        match self.remote.update_assistant(name, update).await {
            Ok(()) => SyncOutcome::ready(),
            Err(e) => {
                error!(assistant = %name, error = %e, "Failed to update assistant");
                SyncOutcome::failed(format!("Update failed: {e}"))
            }
        }
    }
}

#[async_trait]
impl Reconciler for AssistantReconciler {
    type Signals = AssistantSignals;

    fn resource_key(&self) -> String {
        format!("assistant:{}", self.desired.name)
    }

    async fn sync(&self, observed: &Observed<AssistantSignals>) -> SyncOutcome<AssistantSignals> {
        let step = plan(&observed.signals);
        debug!(assistant = %self.desired.name, step = ?step, "Assistant cycle");

        match step {
            AssistantStep::Create => self.create().await,
            AssistantStep::PollInitializing => self.poll().await,
            AssistantStep::Revalidate => self.revalidate().await,
            AssistantStep::Unknown(status) => SyncOutcome::failed(format!("Unknown status: {status}")),
        }
    }

    async fn drain(&self, _observed: &Observed<AssistantSignals>) -> DrainOutcome {
        match self.remote.delete_assistant(&self.desired.name).await {
            Ok(()) => {
                info!(assistant = %self.desired.name, "Assistant deleted");
                DrainOutcome::Drained
            }
            Err(e) if e.is_not_found() => {
                warn!(assistant = %self.desired.name, "Assistant already absent, treating as drained");
                DrainOutcome::Drained
            }
            Err(e) => {
                error!(assistant = %self.desired.name, error = %e, "Failed to delete assistant during drain");
                DrainOutcome::DrainingFailed {
                    reason: format!("Failed to delete assistant: {e}"),
                }
            }
        }
    }
}
