//! Substrate store implementations for Steward.
//!
//! These back the host traits in `steward_core::host` for local runs and
//! tests. Everything lives in memory except [`FileSignalStore`], which
//! flushes resource snapshots to a JSON file.

pub mod file_signals;
pub mod kv;
pub mod pending;
pub mod signals;

pub use file_signals::FileSignalStore;
pub use kv::InMemoryKvStore;
pub use pending::{InMemoryPendingEvents, PendingState};
pub use signals::InMemorySignalStore;
