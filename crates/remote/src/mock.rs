//! A scripted, stateful stand-in for the remote assistant service.
//!
//! Keeps assistants and files in memory, records every call, and lets a
//! test script the status progression that successive describe calls
//! report (e.g. `Initializing` then `Ready`) or inject one-shot failures
//! per operation.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use steward_core::error::RemoteError;
use steward_core::message::ChatMessage;
use steward_core::remote::*;

pub const MOCK_HOST: &str = "https://mock-data.pinecone.io";

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    ListAssistants,
    CreateAssistant(CreateAssistant),
    DescribeAssistant(String),
    UpdateAssistant(String, AssistantUpdate),
    DeleteAssistant(String),
    UploadFile {
        assistant: String,
        file_name: String,
        content: String,
        metadata: Metadata,
    },
    DescribeFile(String, String),
    DeleteFile(String, String),
    ListFiles(String),
    Chat(String, ChatRequest),
    Context(String, ContextRequest),
}

impl RemoteCall {
    pub fn op(&self) -> &'static str {
        match self {
            RemoteCall::ListAssistants => "list_assistants",
            RemoteCall::CreateAssistant(_) => "create_assistant",
            RemoteCall::DescribeAssistant(_) => "describe_assistant",
            RemoteCall::UpdateAssistant(..) => "update_assistant",
            RemoteCall::DeleteAssistant(_) => "delete_assistant",
            RemoteCall::UploadFile { .. } => "upload_file",
            RemoteCall::DescribeFile(..) => "describe_file",
            RemoteCall::DeleteFile(..) => "delete_file",
            RemoteCall::ListFiles(_) => "list_files",
            RemoteCall::Chat(..) => "chat",
            RemoteCall::Context(..) => "context",
        }
    }

    /// Whether this call changes remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            RemoteCall::CreateAssistant(_)
                | RemoteCall::UpdateAssistant(..)
                | RemoteCall::DeleteAssistant(_)
                | RemoteCall::UploadFile { .. }
                | RemoteCall::DeleteFile(..)
        )
    }
}

/// A scripted file progress step reported by the next describe.
#[derive(Debug, Clone)]
pub struct FileProgress {
    pub status: FileStatus,
    pub percent_done: Option<f64>,
    pub error_message: Option<String>,
}

impl FileProgress {
    pub fn processing(percent_done: f64) -> Self {
        Self {
            status: FileStatus::Processing,
            percent_done: Some(percent_done),
            error_message: None,
        }
    }

    pub fn available() -> Self {
        Self {
            status: FileStatus::Available,
            percent_done: Some(1.0),
            error_message: None,
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            status: FileStatus::ProcessingFailed,
            percent_done: None,
            error_message: Some(message.into()),
        }
    }
}

#[derive(Default)]
struct MockState {
    assistants: HashMap<String, AssistantInfo>,
    files: HashMap<(String, String), FileInfo>,
    assistant_statuses: VecDeque<AssistantStatus>,
    file_progress: VecDeque<FileProgress>,
    failures: HashMap<&'static str, VecDeque<RemoteError>>,
    chat_replies: VecDeque<Result<ChatResponse, RemoteError>>,
    calls: Vec<RemoteCall>,
    next_file: u32,
}

/// In-memory scripted implementation of [`AssistantService`].
#[derive(Default)]
pub struct MockAssistantService {
    state: Mutex<MockState>,
}

impl MockAssistantService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing assistant.
    pub fn with_assistant(self, info: AssistantInfo) -> Self {
        self.lock().assistants.insert(info.name.clone(), info);
        self
    }

    /// Seed an existing file.
    pub fn with_file(self, assistant: &str, info: FileInfo) -> Self {
        self.lock()
            .files
            .insert((assistant.to_string(), info.id.clone()), info);
        self
    }

    /// Statuses applied by successive `describe_assistant` calls.
    pub fn script_assistant_statuses(&self, statuses: Vec<AssistantStatus>) {
        self.lock().assistant_statuses.extend(statuses);
    }

    /// Progress steps applied by successive `describe_file` calls.
    pub fn script_file_progress(&self, steps: Vec<FileProgress>) {
        self.lock().file_progress.extend(steps);
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: &'static str, error: RemoteError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Queue a reply for the next chat call. Unqueued chats echo.
    pub fn push_chat_reply(&self, reply: Result<ChatResponse, RemoteError>) {
        self.lock().chat_replies.push_back(reply);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.is_mutation()).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn assistant(&self, name: &str) -> Option<AssistantInfo> {
        self.lock().assistants.get(name).cloned()
    }

    pub fn file_ids(&self, assistant: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock()
            .files
            .keys()
            .filter(|(a, _)| a == assistant)
            .map(|(_, id)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call, then surface an injected failure if one is queued.
    fn enter(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let mut state = self.lock();
        let op = call.op();
        state.calls.push(call);
        match state.failures.get_mut(op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn assistant_info(name: &str, status: AssistantStatus) -> AssistantInfo {
    AssistantInfo {
        name: name.into(),
        status,
        host: Some(MOCK_HOST.into()),
        instructions: None,
        metadata: None,
    }
}

pub fn chat_response(content: &str) -> ChatResponse {
    ChatResponse {
        id: "chat-mock".into(),
        finish_reason: "stop".into(),
        message: ChatMessage::assistant(content),
        model: "gpt-4o".into(),
        citations: vec![],
        usage: Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        },
    }
}

#[async_trait]
impl AssistantService for MockAssistantService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_assistants(&self) -> Result<Vec<AssistantInfo>, RemoteError> {
        self.enter(RemoteCall::ListAssistants)?;
        let mut list: Vec<AssistantInfo> = self.lock().assistants.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn create_assistant(&self, request: CreateAssistant) -> Result<AssistantInfo, RemoteError> {
        self.enter(RemoteCall::CreateAssistant(request.clone()))?;
        let info = AssistantInfo {
            name: request.name.clone(),
            status: AssistantStatus::Initializing,
            host: Some(MOCK_HOST.into()),
            instructions: Some(request.instructions),
            metadata: Some(request.metadata),
        };
        self.lock().assistants.insert(request.name, info.clone());
        Ok(info)
    }

    async fn describe_assistant(&self, name: &str) -> Result<AssistantInfo, RemoteError> {
        self.enter(RemoteCall::DescribeAssistant(name.into()))?;
        let mut state = self.lock();
        let next = state.assistant_statuses.pop_front();
        let info = state
            .assistants
            .get_mut(name)
            .ok_or_else(|| RemoteError::NotFound(format!("assistant {name}")))?;
        if let Some(status) = next {
            info.status = status;
        }
        Ok(info.clone())
    }

    async fn update_assistant(&self, name: &str, update: AssistantUpdate) -> Result<(), RemoteError> {
        self.enter(RemoteCall::UpdateAssistant(name.into(), update.clone()))?;
        let mut state = self.lock();
        let info = state
            .assistants
            .get_mut(name)
            .ok_or_else(|| RemoteError::NotFound(format!("assistant {name}")))?;
        if let Some(instructions) = update.instructions {
            info.instructions = Some(instructions);
        }
        if let Some(metadata) = update.metadata {
            info.metadata = Some(metadata);
        }
        Ok(())
    }

    async fn delete_assistant(&self, name: &str) -> Result<(), RemoteError> {
        self.enter(RemoteCall::DeleteAssistant(name.into()))?;
        let mut state = self.lock();
        state
            .assistants
            .remove(name)
            .ok_or_else(|| RemoteError::NotFound(format!("assistant {name}")))?;
        // Files go with their assistant
        state.files.retain(|(owner, _), _| owner != name);
        Ok(())
    }

    async fn upload_file(&self, assistant: &str, upload: UploadFile) -> Result<FileInfo, RemoteError> {
        let content = tokio::fs::read_to_string(&upload.path).await.map_err(|e| {
            RemoteError::LocalFile(format!("Failed to read {}: {e}", upload.path.display()))
        })?;
        let file_name = upload
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.enter(RemoteCall::UploadFile {
            assistant: assistant.into(),
            file_name: file_name.clone(),
            content,
            metadata: upload.metadata.clone(),
        })?;

        let mut state = self.lock();
        state.next_file += 1;
        let info = FileInfo {
            id: format!("file-{}", state.next_file),
            name: file_name,
            status: FileStatus::Processing,
            metadata: serde_json::to_value(&upload.metadata).ok(),
            percent_done: Some(0.0),
            error_message: None,
            signed_url: None,
            created_on: Some("2026-01-01T00:00:00Z".into()),
            updated_on: Some("2026-01-01T00:00:00Z".into()),
        };
        state
            .files
            .insert((assistant.to_string(), info.id.clone()), info.clone());
        Ok(info)
    }

    async fn describe_file(&self, assistant: &str, file_id: &str) -> Result<FileInfo, RemoteError> {
        self.enter(RemoteCall::DescribeFile(assistant.into(), file_id.into()))?;
        let mut state = self.lock();
        let next = state.file_progress.pop_front();
        let info = state
            .files
            .get_mut(&(assistant.to_string(), file_id.to_string()))
            .ok_or_else(|| RemoteError::NotFound(format!("file {file_id}")))?;
        if let Some(step) = next {
            info.status = step.status;
            info.percent_done = step.percent_done;
            info.error_message = step.error_message;
        }
        Ok(info.clone())
    }

    async fn delete_file(&self, assistant: &str, file_id: &str) -> Result<(), RemoteError> {
        self.enter(RemoteCall::DeleteFile(assistant.into(), file_id.into()))?;
        self.lock()
            .files
            .remove(&(assistant.to_string(), file_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("file {file_id}")))
    }

    async fn list_files(&self, assistant: &str) -> Result<Vec<FileInfo>, RemoteError> {
        self.enter(RemoteCall::ListFiles(assistant.into()))?;
        let mut files: Vec<FileInfo> = self
            .lock()
            .files
            .iter()
            .filter(|((a, _), _)| a == assistant)
            .map(|(_, f)| f.clone())
            .collect();
        files.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(files)
    }

    async fn chat(&self, assistant: &str, request: ChatRequest) -> Result<ChatResponse, RemoteError> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.enter(RemoteCall::Chat(assistant.into(), request))?;
        match self.lock().chat_replies.pop_front() {
            Some(reply) => reply,
            None => Ok(chat_response(&format!("echo: {last}"))),
        }
    }

    async fn context(&self, assistant: &str, request: ContextRequest) -> Result<ContextResponse, RemoteError> {
        self.enter(RemoteCall::Context(assistant.into(), request))?;
        Ok(ContextResponse {
            id: Some("ctx-mock".into()),
            snippets: vec![Snippet {
                kind: "text".into(),
                content: "Steward reconciles assistants.".into(),
                score: 0.92,
                reference: serde_json::json!({"type": "text", "file": {"id": "file-1", "name": "readme.txt"}}),
            }],
            usage: Usage {
                prompt_tokens: 12,
                completion_tokens: 0,
                total_tokens: 12,
            },
        })
    }
}
