//! Error types for the Steward domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Steward operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Remote assistant service ---
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    // --- Host substrate ---
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    // --- Input validation (rejected before any remote call) ---
    #[error("Validation error: {0}")]
    Validation(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Local filesystem ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by remote service, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Remote service not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Local file error: {0}")]
    LocalFile(String),
}

impl RemoteError {
    /// Whether the remote object the call addressed does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown pending event: {0}")]
    UnknownPending(String),

    #[error("Timer scheduling failed: {0}")]
    Timer(String),

    #[error("Message delivery failed: {0}")]
    Delivery(String),
}
