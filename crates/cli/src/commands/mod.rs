//! Subcommand implementations and the helpers they share.

pub mod chat;
pub mod context;
pub mod doctor;
pub mod drain;
pub mod files;
pub mod onboard;
pub mod status;
pub mod sync;
pub mod update;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use steward_config::AppConfig;
use steward_core::event::OutputEvent;
use steward_core::host::DEFAULT_OUTPUT;
use steward_core::remote::{AssistantService, Metadata};
use steward_reconcile::app::MISSING_KEY;
use steward_remote::{ClientFactory, Credentials};
use steward_runtime::{Invocation, LocalRuntime, ResourceReport, registry_from_config};

pub type CmdResult<T = ()> = Result<T, Box<dyn Error>>;

pub fn load_config(path: Option<&Path>) -> CmdResult<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

pub fn config_path(path: Option<&Path>) -> std::path::PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// A client for the configured credentials.
pub fn connect(config: &AppConfig) -> CmdResult<Arc<dyn AssistantService>> {
    let api_key = config.api_key.as_deref().ok_or(MISSING_KEY)?;
    let factory = ClientFactory::new(config.api_url.as_deref());
    Ok(factory.client(&Credentials::new(api_key))?)
}

/// A runtime with every action bound to the chat assistant.
pub fn action_runtime(config: &AppConfig) -> CmdResult<LocalRuntime> {
    let assistant = config
        .chat_assistant()
        .ok_or("No assistant configured: add an [assistant] section or set chat.assistant")?;
    let remote = connect(config)?;
    Ok(LocalRuntime::new(remote, registry_from_config(config, assistant)))
}

/// The payload an invocation resolved with. A cancellation becomes the
/// error it was cancelled with.
pub fn outcome(invocation: &Invocation) -> CmdResult<serde_json::Value> {
    match invocation.resolution() {
        Some(OutputEvent::Emitted { payload, .. }) => Ok(payload.clone()),
        Some(OutputEvent::Cancelled { reason, .. }) => Err(reason.clone().into()),
        _ => invocation
            .emitted_on(DEFAULT_OUTPUT)
            .next()
            .cloned()
            .ok_or_else(|| "Action produced no output".into()),
    }
}

pub fn print_json(value: &serde_json::Value) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse repeated `key=value` arguments.
pub fn parse_metadata(pairs: &[String]) -> Result<Metadata, String> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid metadata '{pair}', expected key=value"))?;
        if key.trim().is_empty() {
            return Err(format!("Invalid metadata '{pair}', key is empty"));
        }
        metadata.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(metadata)
}

/// Parse an optional JSON filter argument.
pub fn parse_filter(filter: Option<String>) -> CmdResult<Option<serde_json::Value>> {
    match filter {
        Some(raw) => Ok(Some(
            serde_json::from_str(&raw).map_err(|e| format!("Invalid filter JSON: {e}"))?,
        )),
        None => Ok(None),
    }
}

pub fn print_reports(reports: &[ResourceReport]) {
    if reports.is_empty() {
        println!("  No managed resources recorded.");
        return;
    }
    for report in reports {
        let status = report.lifecycle.map(|s| s.as_str()).unwrap_or("uninitialized");
        match &report.description {
            Some(description) => println!("  {:<28} {:<16} {description}", report.key, status),
            None => println!("  {:<28} {status}", report.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_pairs_parse() {
        let metadata = parse_metadata(&["team=docs".into(), " tier = gold ".into()]).unwrap();
        assert_eq!(metadata.get("team").map(String::as_str), Some("docs"));
        assert_eq!(metadata.get("tier").map(String::as_str), Some("gold"));
        assert!(parse_metadata(&["novalue".into()]).is_err());
        assert!(parse_metadata(&["=x".into()]).is_err());
    }

    #[test]
    fn filter_must_be_json() {
        assert!(parse_filter(None).unwrap().is_none());
        let filter = parse_filter(Some(r#"{"genre": {"$eq": "docs"}}"#.into())).unwrap().unwrap();
        assert_eq!(filter["genre"]["$eq"], "docs");
        assert!(parse_filter(Some("{not json".into())).is_err());
    }

    #[test]
    fn missing_key_is_reported() {
        let err = connect(&AppConfig::default()).err().unwrap();
        assert_eq!(err.to_string(), MISSING_KEY);
    }
}
