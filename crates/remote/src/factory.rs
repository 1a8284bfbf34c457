//! Client factory: credentials in, client handle out.
//!
//! Handlers never share a global client. They ask the factory for one,
//! keyed by API key; the factory hands back a cached handle when it has
//! already built one for those credentials.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use steward_core::error::RemoteError;
use steward_core::remote::AssistantService;

use crate::pinecone::{DEFAULT_API_URL, PineconeClient};

/// Credentials for the remote service.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("api_key", &"[REDACTED]").finish()
    }
}

/// Builds (and caches) remote clients per credential set.
pub struct ClientFactory {
    api_url: String,
    clients: Mutex<HashMap<Credentials, Arc<dyn AssistantService>>>,
}

impl ClientFactory {
    pub fn new(api_url: Option<&str>) -> Self {
        Self {
            api_url: api_url.unwrap_or(DEFAULT_API_URL).to_string(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// A client for these credentials. An empty key is rejected before any
    /// network traffic.
    pub fn client(&self, credentials: &Credentials) -> Result<Arc<dyn AssistantService>, RemoteError> {
        if credentials.api_key.trim().is_empty() {
            return Err(RemoteError::NotConfigured("Pinecone API Key is required.".into()));
        }

        let mut clients = self
            .clients
            .lock()
            .map_err(|_| RemoteError::NotConfigured("client cache poisoned".into()))?;

        if let Some(client) = clients.get(credentials) {
            return Ok(client.clone());
        }

        let client: Arc<dyn AssistantService> =
            Arc::new(PineconeClient::new(&self.api_url, &credentials.api_key)?);
        clients.insert(credentials.clone(), client.clone());
        Ok(client)
    }

    /// Number of distinct credential sets seen so far.
    pub fn cached(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new(None)
    }
}
