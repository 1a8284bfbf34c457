//! `steward context`: retrieve the snippets the assistant would ground on.

use serde_json::json;
use std::path::Path;
use steward_core::message::ChatMessage;

use super::{CmdResult, action_runtime, load_config, outcome, parse_filter};

pub async fn run(config: Option<&Path>, query: String, filter: Option<String>) -> CmdResult {
    let app = load_config(config)?;
    let filter = parse_filter(filter)?;
    let mut runtime = action_runtime(&app)?;

    let input = json!({
        "messages": [ChatMessage::user(query)],
        "filter": filter,
    });
    let payload = outcome(&runtime.invoke("retrieve_snippets", input).await?)?;

    let snippets = payload["snippets"].as_array().cloned().unwrap_or_default();
    if snippets.is_empty() {
        println!("  No snippets matched.");
        return Ok(());
    }
    for (i, snippet) in snippets.iter().enumerate() {
        let score = snippet["score"].as_f64().unwrap_or_default();
        println!("  [{}] score {score:.3}", i + 1);
        for line in snippet["content"].as_str().unwrap_or_default().lines() {
            println!("      {line}");
        }
        println!();
    }
    Ok(())
}
