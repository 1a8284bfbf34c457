//! `steward doctor`: diagnose config and credentials.

use std::path::Path;
use steward_config::AppConfig;
use steward_core::lifecycle::LifecycleStatus;
use steward_reconcile::check_connection;

use super::{CmdResult, config_path, connect};

pub async fn run(config: Option<&Path>) -> CmdResult {
    println!("🩺 Steward Doctor");
    println!("=================\n");

    let mut issues = 0;
    let path = config_path(config);

    if !path.exists() {
        println!("  ⚠️  No config file at {}, run `steward onboard`", path.display());
        issues += 1;
    }

    let loaded = match config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let app = match loaded {
        Ok(app) => {
            println!("  ✅ Config valid");
            app
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  {} issue(s) found.", issues + 1);
            return Ok(());
        }
    };

    match app.default_assistant_name() {
        Some(name) => println!("  ✅ Assistant declared: {name} ({} data file(s))", app.data_files.len()),
        None => {
            println!("  ⚠️  No [assistant] section, sync will only manage explicitly targeted files");
            issues += 1;
        }
    }

    if app.has_api_key() {
        println!("  ✅ API key configured");
        match connect(&app) {
            Ok(remote) => {
                let outcome = check_connection(remote.as_ref()).await;
                if outcome.new_status == Some(LifecycleStatus::Ready) {
                    println!("  ✅ Connected to {}", remote.name());
                } else {
                    println!(
                        "  ❌ Connection failed: {}",
                        outcome.description.as_deref().unwrap_or("unknown error")
                    );
                    issues += 1;
                }
            }
            Err(e) => {
                println!("  ❌ Could not build client: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ❌ No API key: set PINECONE_API_KEY or api_key in config.toml");
        issues += 1;
    }

    let state = app.resolved_state_path();
    if state.exists() {
        println!("  ✅ State file: {}", state.display());
    } else {
        println!("  ℹ️  No state yet ({}), run `steward sync`", state.display());
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
