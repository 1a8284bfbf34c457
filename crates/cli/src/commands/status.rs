//! `steward status`: show what the last sync recorded.

use std::path::Path;
use std::sync::Arc;
use steward_runtime::recorded_status;
use steward_store::FileSignalStore;

use super::{CmdResult, load_config, print_reports};

pub async fn run(config: Option<&Path>) -> CmdResult {
    let app = load_config(config)?;
    let state_path = app.resolved_state_path();

    println!("📊 Steward Status");
    println!("=================\n");
    println!("  State:     {}", state_path.display());
    println!("  Assistant: {}", app.default_assistant_name().unwrap_or("(none)"));
    println!("  Files:     {} declared", app.data_files.len());
    println!("  API key:   {}\n", if app.has_api_key() { "configured" } else { "missing" });

    if !state_path.exists() {
        println!("  No resources recorded yet. Run `steward sync`.");
        return Ok(());
    }

    let reports = recorded_status(Arc::new(FileSignalStore::open(state_path)?)).await?;
    print_reports(&reports);

    Ok(())
}
