//! `steward drain`: tear one managed resource down.

use std::path::Path;
use std::sync::Arc;
use steward_config::AppConfig;
use steward_core::lifecycle::DrainOutcome;
use steward_runtime::{DesiredState, Reconciliation};
use steward_store::FileSignalStore;

use super::{CmdResult, connect, load_config};

pub async fn run(config: Option<&Path>, resource: &str) -> CmdResult {
    let app = load_config(config)?;
    let key = resource_key(&app, resource)?;

    let desired = DesiredState::from_config(&app)?;
    let remote = connect(&app)?;
    let store = Arc::new(FileSignalStore::open(app.resolved_state_path())?);
    let reconciliation = Reconciliation::new(remote, store, app.timing.clone());

    match reconciliation.drain_key(&key, &desired).await? {
        DrainOutcome::Drained => {
            println!("🗑️  Drained {key}");
            Ok(())
        }
        DrainOutcome::DrainingFailed { reason } => Err(format!("{key}: {reason}").into()),
    }
}

/// `assistant` names the configured assistant, a bare word names a data
/// file, anything with a prefix is taken as a full key.
fn resource_key(app: &AppConfig, resource: &str) -> Result<String, String> {
    if resource.contains(':') {
        return Ok(resource.to_string());
    }
    if resource == "assistant" {
        let name = app
            .default_assistant_name()
            .ok_or("No [assistant] section configured; pass assistant:<name>")?;
        return Ok(format!("assistant:{name}"));
    }
    Ok(format!("file:{resource}"))
}
