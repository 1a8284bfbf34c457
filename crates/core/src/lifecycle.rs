//! Resource lifecycle: the status vocabulary shared by every reconciler
//! and the shape of what a reconciliation cycle hands back to the host.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle status of a managed resource as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Uninitialized,
    InProgress,
    Ready,
    Failed,
    Draining,
    Drained,
    DrainingFailed,
}

impl LifecycleStatus {
    /// Terminal statuses stop self-scheduled re-invocation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleStatus::Ready
                | LifecycleStatus::Failed
                | LifecycleStatus::Drained
                | LifecycleStatus::DrainingFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Uninitialized => "uninitialized",
            LifecycleStatus::InProgress => "in_progress",
            LifecycleStatus::Ready => "ready",
            LifecycleStatus::Failed => "failed",
            LifecycleStatus::Draining => "draining",
            LifecycleStatus::Drained => "drained",
            LifecycleStatus::DrainingFailed => "draining_failed",
        }
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific persisted signals.
///
/// Updates are partial: `merge` overwrites only the fields the update
/// carries, leaving the rest of the persisted snapshot untouched.
pub trait Signals: Default + Clone + Serialize + DeserializeOwned + Send + Sync {
    fn merge(&mut self, update: Self);
}

/// Everything carried between reconciliation cycles for one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observed<S> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<LifecycleStatus>,

    #[serde(default)]
    pub signals: S,

    /// Last human-readable status description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Assistant the resource lives in, for resources scoped to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl<S: Default> Default for Observed<S> {
    fn default() -> Self {
        Self {
            lifecycle: None,
            signals: S::default(),
            description: None,
            owner: None,
        }
    }
}

impl<S: Signals> Observed<S> {
    /// Fold a cycle's outcome into the snapshot, as the host does when it
    /// persists signal updates.
    pub fn apply(&mut self, outcome: &SyncOutcome<S>) {
        if let Some(status) = outcome.new_status {
            self.lifecycle = Some(status);
        }
        if let Some(update) = &outcome.signal_updates {
            self.signals.merge(update.clone());
        }
        if outcome.description.is_some() || outcome.new_status.is_some() {
            self.description = outcome.description.clone();
        }
    }

    /// Record a drain outcome.
    pub fn apply_drain(&mut self, outcome: &DrainOutcome) {
        self.lifecycle = Some(outcome.status());
        self.description = outcome.reason().map(str::to_string);
    }
}

/// Result of a single reconciliation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome<S> {
    pub new_status: Option<LifecycleStatus>,
    pub signal_updates: Option<S>,
    pub description: Option<String>,
    pub next_schedule_delay: Option<Duration>,
}

impl<S> SyncOutcome<S> {
    /// Settled; no re-invocation requested.
    pub fn ready() -> Self {
        Self {
            new_status: Some(LifecycleStatus::Ready),
            signal_updates: None,
            description: None,
            next_schedule_delay: None,
        }
    }

    /// Still converging; ask to be invoked again after `delay`.
    pub fn in_progress(description: impl Into<String>, delay: Duration) -> Self {
        Self {
            new_status: Some(LifecycleStatus::InProgress),
            signal_updates: None,
            description: Some(description.into()),
            next_schedule_delay: Some(delay),
        }
    }

    /// Failed; only an external retrigger runs another cycle.
    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            new_status: Some(LifecycleStatus::Failed),
            signal_updates: None,
            description: Some(description.into()),
            next_schedule_delay: None,
        }
    }

    pub fn with_signals(mut self, signals: S) -> Self {
        self.signal_updates = Some(signals);
        self
    }
}

/// Result of tearing a resource down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained,
    DrainingFailed { reason: String },
}

impl DrainOutcome {
    pub fn status(&self) -> LifecycleStatus {
        match self {
            DrainOutcome::Drained => LifecycleStatus::Drained,
            DrainOutcome::DrainingFailed { .. } => LifecycleStatus::DrainingFailed,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            DrainOutcome::Drained => None,
            DrainOutcome::DrainingFailed { reason } => Some(reason),
        }
    }
}
