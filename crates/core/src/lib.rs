//! # Steward Core
//!
//! Domain types, traits, and error definitions for Steward, a reconciler
//! that drives a declared Pinecone assistant (and its data files) toward
//! the state held by the remote service.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here:
//! - [`remote::AssistantService`] is the remote assistant API
//! - [`host`] holds the substrate primitives (pending events, timers,
//!   internal messaging, key-value storage, signal storage)
//!
//! Implementations live in their respective crates, so the reconcilers and
//! actions can be exercised against scripted mocks and in-memory stores.

pub mod error;
pub mod event;
pub mod fingerprint;
pub mod host;
pub mod lifecycle;
pub mod message;
pub mod remote;

// Re-export key types at crate root for ergonomics
pub use error::{Error, HostError, RemoteError, Result};
pub use event::{EventBus, OutputEvent};
pub use fingerprint::fingerprint;
pub use host::{KeyValueStore, Messaging, PendingEvents, SignalStore, Timers};
pub use lifecycle::{DrainOutcome, LifecycleStatus, Observed, Signals, SyncOutcome};
pub use message::{ChatMessage, ConversationId, Role};
pub use remote::{AssistantService, AssistantStatus, FileStatus, Metadata};
