//! End-to-end tests for Steward.
//!
//! These load a real config file, reconcile it against the mock remote with
//! signals persisted to disk, and run actions through the local runtime.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use steward_config::AppConfig;
use steward_core::event::OutputEvent;
use steward_core::lifecycle::LifecycleStatus;
use steward_core::remote::AssistantStatus;
use steward_remote::MockAssistantService;
use steward_remote::mock::{FileProgress, RemoteCall};
use steward_runtime::{DesiredState, LocalRuntime, Reconciliation, recorded_status, registry_from_config};
use steward_store::FileSignalStore;

// ── Fixtures ─────────────────────────────────────────────────────────────

fn write_config(dir: &Path, files: &[(&str, &str)]) -> AppConfig {
    let mut toml = format!(
        "state_path = {:?}\n\n[assistant]\nname = \"docs\"\ninstructions = \"Answer from the handbook\"\n\n[assistant.metadata]\nteam = \"platform\"\n",
        dir.join("state.json")
    );
    for (key, content) in files {
        let content_path = dir.join(format!("{key}.md"));
        std::fs::write(&content_path, content).unwrap();
        toml.push_str(&format!(
            "\n[[data_files]]\nkey = \"{key}\"\ncontent_path = {content_path:?}\nfilename = \"{key}.md\"\n"
        ));
    }

    let path = dir.join("config.toml");
    std::fs::write(&path, toml).unwrap();
    AppConfig::load_from(&path).unwrap()
}

fn reconciliation(config: &AppConfig, remote: Arc<MockAssistantService>) -> Reconciliation {
    let store = Arc::new(FileSignalStore::open(config.resolved_state_path()).unwrap());
    Reconciliation::new(remote, store, config.timing.clone())
}

fn runtime(config: &AppConfig, remote: Arc<MockAssistantService>) -> LocalRuntime {
    let assistant = config.chat_assistant().unwrap();
    LocalRuntime::new(remote, registry_from_config(config, assistant))
}

// ── Reconciliation ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_sync_creates_everything_and_second_is_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[("handbook", "Welcome aboard"), ("faq", "Q: where? A: here")]);
    let remote = Arc::new(MockAssistantService::new());
    remote.script_assistant_statuses(vec![AssistantStatus::Initializing, AssistantStatus::Ready]);
    remote.script_file_progress(vec![
        FileProgress::processing(0.5),
        FileProgress::available(),
        FileProgress::available(),
    ]);

    let desired = DesiredState::from_config(&config).unwrap();
    let reports = reconciliation(&config, remote.clone()).sync_all(&desired).await.unwrap();

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].key, "assistant:docs");
    assert!(reports.iter().all(|r| r.lifecycle == Some(LifecycleStatus::Ready)));
    assert_eq!(remote.file_ids("docs").len(), 2);
    assert!(config.resolved_state_path().exists());

    // A fresh process reading the same state file has nothing to change
    remote.clear_calls();
    let reports = reconciliation(&config, remote.clone()).sync_all(&desired).await.unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(remote.mutation_count(), 0);
    assert_eq!(remote.call_count("describe_assistant"), 1);
    assert_eq!(remote.call_count("describe_file"), 0);
}

#[tokio::test(start_paused = true)]
async fn edited_content_replaces_the_remote_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[("handbook", "Welcome aboard")]);
    let remote = Arc::new(MockAssistantService::new());
    remote.script_assistant_statuses(vec![AssistantStatus::Ready]);
    remote.script_file_progress(vec![FileProgress::available()]);

    let sync = reconciliation(&config, remote.clone());
    sync.sync_all(&DesiredState::from_config(&config).unwrap()).await.unwrap();
    assert_eq!(remote.file_ids("docs"), vec!["file-1".to_string()]);

    let config = write_config(dir.path(), &[("handbook", "Welcome aboard, revised")]);
    remote.script_file_progress(vec![FileProgress::available()]);
    remote.clear_calls();
    let reports = sync.sync_all(&DesiredState::from_config(&config).unwrap()).await.unwrap();

    assert_eq!(reports[1].lifecycle, Some(LifecycleStatus::Ready));
    assert_eq!(remote.file_ids("docs"), vec!["file-2".to_string()]);
    let uploaded = remote.calls().into_iter().find_map(|call| match call {
        RemoteCall::UploadFile { content, .. } => Some(content),
        _ => None,
    });
    assert_eq!(uploaded.as_deref(), Some("Welcome aboard, revised"));
    assert_eq!(remote.call_count("delete_file"), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_file_is_drained_and_forgotten() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[("handbook", "Welcome aboard"), ("faq", "Q: where? A: here")]);
    let remote = Arc::new(MockAssistantService::new());
    remote.script_assistant_statuses(vec![AssistantStatus::Ready]);
    remote.script_file_progress(vec![FileProgress::available(), FileProgress::available()]);

    let sync = reconciliation(&config, remote.clone());
    sync.sync_all(&DesiredState::from_config(&config).unwrap()).await.unwrap();

    let config = write_config(dir.path(), &[("handbook", "Welcome aboard")]);
    let reports = sync.sync_all(&DesiredState::from_config(&config).unwrap()).await.unwrap();

    assert_eq!(reports[0].key, "file:faq");
    assert_eq!(reports[0].lifecycle, Some(LifecycleStatus::Drained));
    assert_eq!(remote.file_ids("docs").len(), 1);

    let store = Arc::new(FileSignalStore::open(config.resolved_state_path()).unwrap());
    let keys: Vec<String> = recorded_status(store).await.unwrap().into_iter().map(|r| r.key).collect();
    assert_eq!(keys.len(), 2);
    assert!(!keys.contains(&"file:faq".to_string()));
}

#[tokio::test(start_paused = true)]
async fn draining_the_assistant_removes_it_and_resync_rebuilds() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[("handbook", "Welcome aboard")]);
    let remote = Arc::new(MockAssistantService::new());
    remote.script_assistant_statuses(vec![AssistantStatus::Ready]);
    remote.script_file_progress(vec![FileProgress::available()]);

    let sync = reconciliation(&config, remote.clone());
    let desired = DesiredState::from_config(&config).unwrap();
    sync.sync_all(&desired).await.unwrap();
    assert!(remote.assistant("docs").is_some());

    let outcome = sync.drain_key("assistant:docs", &desired).await.unwrap();
    assert_eq!(outcome.status(), LifecycleStatus::Drained);
    assert!(remote.assistant("docs").is_none());
    assert!(remote.file_ids("docs").is_empty());
    assert!(sync.status().await.unwrap().is_empty());

    // The next run starts from the state file and rebuilds both
    remote.script_assistant_statuses(vec![AssistantStatus::Ready]);
    remote.script_file_progress(vec![FileProgress::available()]);
    let reports = reconciliation(&config, remote.clone()).sync_all(&desired).await.unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.lifecycle == Some(LifecycleStatus::Ready)));
    assert_eq!(remote.call_count("upload_file"), 2);
    assert_eq!(remote.file_ids("docs"), vec!["file-2".to_string()]);
}

#[test]
fn damaged_state_file_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[]);
    std::fs::write(config.resolved_state_path(), "{\"assistant:docs\": {\"lifecyc").unwrap();

    assert!(FileSignalStore::open(config.resolved_state_path()).is_err());
}

// ── Actions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_keeps_conversation_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[]);
    let remote = Arc::new(MockAssistantService::new());
    let mut runtime = runtime(&config, remote.clone());

    let first = runtime.invoke("chat", json!({"userMessage": "hello"})).await.unwrap();
    let reply = first.emitted_on("default").next().cloned().unwrap();
    assert_eq!(reply["response"], "echo: hello");
    assert_eq!(reply["continued"], false);
    let conversation = reply["conversationId"].as_str().unwrap().to_string();

    let second = runtime
        .invoke("chat", json!({"userMessage": "again", "conversationId": conversation}))
        .await
        .unwrap();
    let reply = second.emitted_on("default").next().cloned().unwrap();
    assert_eq!(reply["continued"], true);
    assert_eq!(reply["conversationId"], conversation.as_str());

    let sent = remote.calls().into_iter().filter_map(|call| match call {
        RemoteCall::Chat(_, request) => Some(request.messages.len()),
        _ => None,
    });
    assert_eq!(sent.collect::<Vec<_>>(), vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn uploaded_file_shows_up_in_listing() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &[]);
    let remote = Arc::new(MockAssistantService::new());
    remote.script_file_progress(vec![FileProgress::processing(0.3), FileProgress::available()]);
    let mut runtime = runtime(&config, remote.clone());

    let upload = runtime
        .invoke(
            "upload_file",
            json!({"content": "Runbook", "filename": "runbook.md", "metadata": {"kind": "ops"}}),
        )
        .await
        .unwrap();
    assert!(matches!(upload.resolution(), Some(OutputEvent::Emitted { .. })));

    let listing = runtime.invoke("list_files", json!({})).await.unwrap();
    let payload = match listing.resolution() {
        Some(OutputEvent::Emitted { payload, .. }) => payload.clone(),
        other => panic!("unexpected resolution {other:?}"),
    };
    assert_eq!(payload["files"][0]["id"], "file-1");
    assert_eq!(payload["files"][0]["status"], "Available");
}
