//! `steward upload`, `steward files`, `steward delete-file`.

use serde_json::json;
use std::path::{Path, PathBuf};
use steward_core::event::OutputEvent;
use steward_core::host::DEFAULT_OUTPUT;

use super::{CmdResult, action_runtime, load_config, outcome, parse_metadata, print_json};

pub async fn upload(
    config: Option<&Path>,
    path: PathBuf,
    filename: Option<String>,
    metadata: Vec<String>,
) -> CmdResult {
    let app = load_config(config)?;
    let metadata = parse_metadata(&metadata)?;
    let content = std::fs::read_to_string(&path).map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
    let filename = filename.or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()));

    let mut runtime = action_runtime(&app)?;

    let mut events = runtime.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.as_ref() {
                OutputEvent::Progress { status_description, .. } => println!("  ⏳ {status_description}"),
                OutputEvent::Emitted { .. } | OutputEvent::Cancelled { .. } if event.is_resolution() => break,
                _ => {}
            }
        }
    });

    let input = json!({
        "content": content,
        "filename": filename,
        "metadata": metadata,
    });
    let invocation = runtime.invoke("upload_file", input).await?;
    progress.abort();

    let payload = outcome(&invocation)?;
    println!("✅ Uploaded");
    print_json(&payload)
}

pub async fn list(config: Option<&Path>) -> CmdResult {
    let app = load_config(config)?;
    let mut runtime = action_runtime(&app)?;
    let payload = outcome(&runtime.invoke("list_files", json!({})).await?)?;

    let files = payload["files"].as_array().cloned().unwrap_or_default();
    if files.is_empty() {
        println!("  No files.");
        return Ok(());
    }
    println!("  {:<40} {:<32} STATUS", "ID", "NAME");
    for file in files {
        println!(
            "  {:<40} {:<32} {}",
            file["id"].as_str().unwrap_or_default(),
            file["name"].as_str().unwrap_or_default(),
            file["status"].as_str().unwrap_or_default(),
        );
    }
    Ok(())
}

pub async fn delete(config: Option<&Path>, file_id: String) -> CmdResult {
    let app = load_config(config)?;
    let mut runtime = action_runtime(&app)?;
    let invocation = runtime.invoke("delete_file", json!({ "fileId": file_id })).await?;

    if invocation.emitted_on(DEFAULT_OUTPUT).next().is_none() {
        return Err(format!("File {file_id} was not deleted").into());
    }
    println!("🗑️  Deleted {file_id}");
    Ok(())
}
