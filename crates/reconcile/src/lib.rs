//! Reconcilers for Steward's managed resources.
//!
//! A reconciler compares one resource's desired configuration with its
//! last observed signals, makes at most a handful of remote calls, and
//! reports the new lifecycle status with an optional re-invocation delay.
//! It never keeps state of its own between cycles.

pub mod app;
pub mod assistant;
pub mod data_file;

use async_trait::async_trait;
use steward_core::lifecycle::{DrainOutcome, Observed, Signals, SyncOutcome};

pub use app::{check_connection, validate_credentials};
pub use assistant::{AssistantReconciler, AssistantSignals, AssistantStep, DesiredAssistant};
pub use data_file::{DataFileReconciler, DataFileSignals, DataFileStep, DesiredDataFile};

/// One managed resource kind.
///
/// `sync` and `drain` never fail: remote errors become `failed` or
/// `draining_failed` outcomes with a description.
#[async_trait]
pub trait Reconciler: Send + Sync {
    type Signals: Signals;

    /// Stable key under which the resource's signals are stored.
    fn resource_key(&self) -> String;

    /// Assistant the resource lives in, when it is scoped to one. Recorded
    /// with the snapshot so the resource can be drained after it leaves the
    /// config.
    fn owner(&self) -> Option<String> {
        None
    }

    /// Run one reconciliation cycle.
    async fn sync(&self, observed: &Observed<Self::Signals>) -> SyncOutcome<Self::Signals>;

    /// Tear the remote resource down.
    async fn drain(&self, observed: &Observed<Self::Signals>) -> DrainOutcome;
}
