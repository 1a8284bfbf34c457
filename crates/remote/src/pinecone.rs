//! Pinecone Assistant API client.
//!
//! Two planes:
//! - control plane (`https://api.pinecone.io/assistant/assistants`) for
//!   assistant create/describe/update/delete/list
//! - data plane (`https://{host}/assistant/...`) for files, chat and
//!   context, where `host` comes from describing the assistant
//!
//! Data-plane hosts are cached per assistant name after the first lookup.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use steward_core::error::RemoteError;
use steward_core::remote::*;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2025-04";

/// A Pinecone Assistant API client bound to one API key.
pub struct PineconeClient {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
    hosts: Arc<RwLock<HashMap<String, String>>>,
}

impl PineconeClient {
    /// Create a client against the given control-plane URL.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RemoteError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            hosts: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Create a client against the public Pinecone API.
    pub fn public(api_key: impl Into<String>) -> Result<Self, RemoteError> {
        Self::new(DEFAULT_API_URL, api_key)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn assistants_url(&self) -> String {
        format!("{}/assistant/assistants", self.api_url)
    }

    /// Resolve (and cache) the data-plane base URL of an assistant.
    async fn data_plane(&self, assistant: &str) -> Result<String, RemoteError> {
        if let Some(host) = self.hosts.read().await.get(assistant) {
            return Ok(host.clone());
        }

        let info = self.describe_assistant(assistant).await?;
        let host = info.host.ok_or_else(|| {
            RemoteError::InvalidResponse(format!("assistant '{assistant}' has no host yet"))
        })?;
        let base = normalize_host(&host);
        self.hosts.write().await.insert(assistant.to_string(), base.clone());
        Ok(base)
    }

    async fn send(&self, what: &str, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(format!("{what}: {e}"))
            } else {
                RemoteError::Network(format!("{what}: {e}"))
            }
        })?;
        check_status(what, response).await
    }

    async fn parse<T: for<'de> Deserialize<'de>>(what: &str, response: reqwest::Response) -> Result<T, RemoteError> {
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("Failed to parse {what} response: {e}")))
    }
}

/// Map non-success statuses onto the remote error taxonomy.
async fn check_status(what: &str, response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status().as_u16();

    match status {
        200..=299 => Ok(response),
        404 => Err(RemoteError::NotFound(what.to_string())),
        401 | 403 => Err(RemoteError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        429 => Err(RemoteError::RateLimited { retry_after_secs: 5 }),
        _ => {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, call = what, "Pinecone returned error");
            Err(RemoteError::ApiError {
                status_code: status,
                message: error_body,
            })
        }
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[derive(Deserialize)]
struct AssistantList {
    #[serde(default)]
    assistants: Vec<AssistantInfo>,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileInfo>,
}

#[async_trait]
impl AssistantService for PineconeClient {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn list_assistants(&self) -> Result<Vec<AssistantInfo>, RemoteError> {
        let url = self.assistants_url();
        let response = self
            .send("list assistants", self.request(reqwest::Method::GET, &url))
            .await?;
        let list: AssistantList = Self::parse("list assistants", response).await?;
        Ok(list.assistants)
    }

    async fn create_assistant(&self, request: CreateAssistant) -> Result<AssistantInfo, RemoteError> {
        let url = self.assistants_url();
        debug!(assistant = %request.name, region = ?request.region, "Creating assistant");

        let response = self
            .send(
                &format!("create assistant {}", request.name),
                self.request(reqwest::Method::POST, &url).json(&request),
            )
            .await?;
        Self::parse("create assistant", response).await
    }

    async fn describe_assistant(&self, name: &str) -> Result<AssistantInfo, RemoteError> {
        let url = format!("{}/{name}", self.assistants_url());
        let response = self
            .send(&format!("assistant {name}"), self.request(reqwest::Method::GET, &url))
            .await?;
        let info: AssistantInfo = Self::parse("describe assistant", response).await?;

        if let Some(host) = &info.host {
            self.hosts
                .write()
                .await
                .insert(name.to_string(), normalize_host(host));
        }
        Ok(info)
    }

    async fn update_assistant(&self, name: &str, update: AssistantUpdate) -> Result<(), RemoteError> {
        let url = format!("{}/{name}", self.assistants_url());
        debug!(assistant = %name, instructions = update.instructions.is_some(), metadata = update.metadata.is_some(), "Updating assistant");

        self.send(
            &format!("assistant {name}"),
            self.request(reqwest::Method::PATCH, &url).json(&update),
        )
        .await?;
        Ok(())
    }

    async fn delete_assistant(&self, name: &str) -> Result<(), RemoteError> {
        let url = format!("{}/{name}", self.assistants_url());
        self.send(&format!("assistant {name}"), self.request(reqwest::Method::DELETE, &url))
            .await?;
        self.hosts.write().await.remove(name);
        Ok(())
    }

    async fn upload_file(&self, assistant: &str, upload: UploadFile) -> Result<FileInfo, RemoteError> {
        let base = self.data_plane(assistant).await?;
        let url = format!("{base}/assistant/files/{assistant}");

        let bytes = tokio::fs::read(&upload.path).await.map_err(|e| {
            RemoteError::LocalFile(format!("Failed to read {}: {e}", upload.path.display()))
        })?;
        let file_name = upload
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.txt".into());

        debug!(assistant = %assistant, file = %file_name, bytes = bytes.len(), "Uploading file");

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut builder = self.request(reqwest::Method::POST, &url).multipart(form);
        if !upload.metadata.is_empty() {
            let metadata = serde_json::to_string(&upload.metadata)
                .map_err(|e| RemoteError::InvalidResponse(format!("Failed to encode metadata: {e}")))?;
            builder = builder.query(&[("metadata", metadata)]);
        }

        let response = self.send(&format!("upload to {assistant}"), builder).await?;
        Self::parse("upload file", response).await
    }

    async fn describe_file(&self, assistant: &str, file_id: &str) -> Result<FileInfo, RemoteError> {
        let base = self.data_plane(assistant).await?;
        let url = format!("{base}/assistant/files/{assistant}/{file_id}");
        let response = self
            .send(&format!("file {file_id}"), self.request(reqwest::Method::GET, &url))
            .await?;
        Self::parse("describe file", response).await
    }

    async fn delete_file(&self, assistant: &str, file_id: &str) -> Result<(), RemoteError> {
        let base = self.data_plane(assistant).await?;
        let url = format!("{base}/assistant/files/{assistant}/{file_id}");
        self.send(&format!("file {file_id}"), self.request(reqwest::Method::DELETE, &url))
            .await?;
        Ok(())
    }

    async fn list_files(&self, assistant: &str) -> Result<Vec<FileInfo>, RemoteError> {
        let base = self.data_plane(assistant).await?;
        let url = format!("{base}/assistant/files/{assistant}");
        let response = self
            .send(&format!("files of {assistant}"), self.request(reqwest::Method::GET, &url))
            .await?;
        let list: FileList = Self::parse("list files", response).await?;
        Ok(list.files)
    }

    async fn chat(&self, assistant: &str, request: ChatRequest) -> Result<ChatResponse, RemoteError> {
        let base = self.data_plane(assistant).await?;
        let url = format!("{base}/assistant/chat/{assistant}");

        debug!(assistant = %assistant, model = %request.model, messages = request.messages.len(), "Sending chat request");

        let response = self
            .send(
                &format!("chat with {assistant}"),
                self.request(reqwest::Method::POST, &url).json(&request),
            )
            .await?;
        Self::parse("chat", response).await
    }

    async fn context(&self, assistant: &str, request: ContextRequest) -> Result<ContextResponse, RemoteError> {
        let base = self.data_plane(assistant).await?;
        let url = format!("{base}/assistant/chat/{assistant}/context");

        let response = self
            .send(
                &format!("context from {assistant}"),
                self.request(reqwest::Method::POST, &url).json(&request),
            )
            .await?;
        Self::parse("context", response).await
    }
}
