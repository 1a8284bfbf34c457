//! Remote assistant service implementations for Steward.
//!
//! All clients implement the `steward_core::AssistantService` trait.
//! The factory builds one client per credential set.

pub mod factory;
pub mod mock;
pub mod pinecone;
pub mod staging;

pub use factory::{ClientFactory, Credentials};
pub use mock::{MockAssistantService, RemoteCall};
pub use pinecone::PineconeClient;
pub use staging::StagedFile;
