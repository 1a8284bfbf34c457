//! `steward sync`: converge every declared resource.

use std::path::Path;
use std::sync::Arc;
use steward_core::lifecycle::LifecycleStatus;
use steward_reconcile::validate_credentials;
use steward_remote::ClientFactory;
use steward_runtime::{DesiredState, Reconciliation, ResourceDriver};
use steward_store::FileSignalStore;
use tracing::info;

use super::{CmdResult, connect, load_config, print_reports};

pub async fn run(config: Option<&Path>, max_cycles: Option<usize>) -> CmdResult {
    let app = load_config(config)?;

    let factory = ClientFactory::new(app.api_url.as_deref());
    let credentials = validate_credentials(&factory, app.api_key.as_deref()).await;
    if credentials.new_status != Some(LifecycleStatus::Ready) {
        let reason = credentials.description.unwrap_or_else(|| "Credential check failed".into());
        return Err(reason.into());
    }

    let desired = DesiredState::from_config(&app)?;
    let remote = connect(&app)?;
    let store = Arc::new(FileSignalStore::open(app.resolved_state_path())?);

    let mut reconciliation = Reconciliation::new(remote, store.clone(), app.timing.clone());
    if let Some(max_cycles) = max_cycles {
        reconciliation = reconciliation.with_driver(ResourceDriver::new(store).with_max_cycles(max_cycles));
    }

    info!(
        assistant = desired.assistant.as_ref().map(|a| a.name.as_str()).unwrap_or("-"),
        files = desired.files.len(),
        "Starting sync"
    );
    let reports = reconciliation.sync_all(&desired).await?;

    println!("🔄 Sync complete\n");
    print_reports(&reports);

    let failed = reports
        .iter()
        .filter(|r| matches!(r.lifecycle, Some(LifecycleStatus::Failed | LifecycleStatus::DrainingFailed)))
        .count();
    if failed > 0 {
        return Err(format!("{failed} resource(s) failed").into());
    }
    Ok(())
}
