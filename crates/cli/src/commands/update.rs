//! `steward update-assistant`

use serde_json::json;
use std::path::Path;

use super::{CmdResult, action_runtime, load_config, outcome, parse_metadata, print_json};

pub async fn run(config: Option<&Path>, instructions: Option<String>, metadata: Vec<String>) -> CmdResult {
    let app = load_config(config)?;
    let mut input = json!({});
    if let Some(instructions) = instructions {
        input["instructions"] = json!(instructions);
    }
    if !metadata.is_empty() {
        input["metadata"] = json!(parse_metadata(&metadata)?);
    }

    let mut runtime = action_runtime(&app)?;
    let invocation = runtime.invoke("update_assistant", input).await?;
    print_json(&outcome(&invocation)?)
}
