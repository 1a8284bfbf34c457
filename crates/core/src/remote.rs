//! AssistantService trait: the abstraction over the remote assistant API.
//!
//! The remote service is eventually consistent: creates return before the
//! work completes, status has to be polled, and every call can fail on its
//! own. Reconcilers and actions only ever talk to it through this trait.
//!
//! Implementations: Pinecone HTTP client, scripted mock (tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::RemoteError;
use crate::message::ChatMessage;

/// String-to-string metadata. A `BTreeMap` keeps keys sorted, which is the
/// canonical form fingerprints and comparisons rely on.
pub type Metadata = BTreeMap<String, String>;

/// Deployment region of an assistant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Us,
    Eu,
}

/// Remote assistant status. Unrecognized values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssistantStatus {
    Initializing,
    Ready,
    Failed,
    Terminating,
    InitializationFailed,
    Other(String),
}

impl AssistantStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AssistantStatus::Initializing => "Initializing",
            AssistantStatus::Ready => "Ready",
            AssistantStatus::Failed => "Failed",
            AssistantStatus::Terminating => "Terminating",
            AssistantStatus::InitializationFailed => "InitializationFailed",
            AssistantStatus::Other(s) => s,
        }
    }
}

impl From<String> for AssistantStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Initializing" => AssistantStatus::Initializing,
            "Ready" => AssistantStatus::Ready,
            "Failed" => AssistantStatus::Failed,
            "Terminating" => AssistantStatus::Terminating,
            "InitializationFailed" => AssistantStatus::InitializationFailed,
            _ => AssistantStatus::Other(s),
        }
    }
}

impl From<AssistantStatus> for String {
    fn from(status: AssistantStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for AssistantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote file processing status. Unrecognized values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileStatus {
    Processing,
    Available,
    Deleting,
    ProcessingFailed,
    Other(String),
}

impl FileStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FileStatus::Processing => "Processing",
            FileStatus::Available => "Available",
            FileStatus::Deleting => "Deleting",
            FileStatus::ProcessingFailed => "ProcessingFailed",
            FileStatus::Other(s) => s,
        }
    }
}

impl From<String> for FileStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Processing" => FileStatus::Processing,
            "Available" => FileStatus::Available,
            "Deleting" => FileStatus::Deleting,
            "ProcessingFailed" => FileStatus::ProcessingFailed,
            _ => FileStatus::Other(s),
        }
    }
}

impl From<FileStatus> for String {
    fn from(status: FileStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to create an assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAssistant {
    pub name: String,
    pub instructions: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub region: Region,
}

/// An assistant as described by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantInfo {
    pub name: String,

    pub status: AssistantStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Partial assistant update. Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl AssistantUpdate {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_none() && self.metadata.is_none()
    }
}

/// A local file to upload, already staged on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// A file as described by the remote service.
///
/// Read from the API in snake_case and written to output events in
/// camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase", deserialize = "snake_case"))]
pub struct FileInfo {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub status: FileStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// Processing progress in `0.0..=1.0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_done: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_on: Option<String>,
}

/// Token usage reported by chat and context calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Limits on the context snippets sent to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet_size: Option<u32>,
}

/// A chat request. Optional knobs are only sent when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,

    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_response: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_highlights: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_options: Option<ContextOptions>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            temperature: None,
            filter: None,
            json_response: None,
            include_highlights: None,
            top_k: None,
            context_options: None,
        }
    }
}

/// A complete chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase", deserialize = "snake_case"))]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub finish_reason: String,

    pub message: ChatMessage,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub citations: Vec<serde_json::Value>,

    #[serde(default)]
    pub usage: Usage,
}

/// A context retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRequest {
    pub messages: Vec<ChatMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
}

/// A single retrieved context snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    #[serde(rename = "type", default = "default_snippet_type")]
    pub kind: String,

    pub content: String,

    pub score: f64,

    #[serde(default)]
    pub reference: serde_json::Value,
}

fn default_snippet_type() -> String {
    "text".into()
}

/// Context snippets with token usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub snippets: Vec<Snippet>,

    #[serde(default)]
    pub usage: Usage,
}

/// The core AssistantService trait.
///
/// Every method maps to one remote call. `NotFound` must be reported as
/// [`RemoteError::NotFound`] so drains can treat it as already gone.
#[async_trait]
pub trait AssistantService: Send + Sync {
    /// A human-readable name for this backend (e.g., "pinecone", "mock").
    fn name(&self) -> &str;

    /// List assistants visible to the credentials.
    async fn list_assistants(&self) -> Result<Vec<AssistantInfo>, RemoteError>;

    async fn create_assistant(&self, request: CreateAssistant) -> Result<AssistantInfo, RemoteError>;

    async fn describe_assistant(&self, name: &str) -> Result<AssistantInfo, RemoteError>;

    async fn update_assistant(&self, name: &str, update: AssistantUpdate) -> Result<(), RemoteError>;

    async fn delete_assistant(&self, name: &str) -> Result<(), RemoteError>;

    async fn upload_file(&self, assistant: &str, upload: UploadFile) -> Result<FileInfo, RemoteError>;

    async fn describe_file(&self, assistant: &str, file_id: &str) -> Result<FileInfo, RemoteError>;

    async fn delete_file(&self, assistant: &str, file_id: &str) -> Result<(), RemoteError>;

    async fn list_files(&self, assistant: &str) -> Result<Vec<FileInfo>, RemoteError>;

    async fn chat(&self, assistant: &str, request: ChatRequest) -> Result<ChatResponse, RemoteError>;

    async fn context(&self, assistant: &str, request: ContextRequest) -> Result<ContextResponse, RemoteError>;
}
