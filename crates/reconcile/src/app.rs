//! App-level credential check, run before any resource is reconciled.

use steward_core::lifecycle::SyncOutcome;
use steward_core::remote::AssistantService;
use steward_remote::{ClientFactory, Credentials};
use tracing::{error, info};

pub const MISSING_KEY: &str = "Pinecone API Key is required.";

/// Validate an API key by building a client and listing assistants.
pub async fn validate_credentials(factory: &ClientFactory, api_key: Option<&str>) -> SyncOutcome<()> {
    let Some(api_key) = api_key.filter(|k| !k.trim().is_empty()) else {
        return SyncOutcome::failed(MISSING_KEY);
    };

    match factory.client(&Credentials::new(api_key)) {
        Ok(client) => check_connection(client.as_ref()).await,
        Err(e) => {
            error!(error = %e, "Failed to build remote client");
            SyncOutcome::failed(MISSING_KEY)
        }
    }
}

/// Probe an already-built client.
pub async fn check_connection(remote: &dyn AssistantService) -> SyncOutcome<()> {
    match remote.list_assistants().await {
        Ok(assistants) => {
            info!(backend = remote.name(), assistants = assistants.len(), "Credentials validated");
            SyncOutcome::ready()
        }
        Err(e) => {
            error!(backend = remote.name(), error = %e, "Failed to validate API key");
            SyncOutcome::failed("Check logs for details")
        }
    }
}
