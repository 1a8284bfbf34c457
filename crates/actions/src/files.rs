//! File management actions: list and delete.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use steward_core::error::{Error, Result};
use steward_core::host::{Emission, PendingId, PendingRequest};
use tracing::{error, info};

use crate::{Action, ActionContext, Trigger, parse_input};

/// List the assistant's files.
pub struct ListFilesAction {
    assistant: String,
}

impl ListFilesAction {
    pub fn new(assistant: impl Into<String>) -> Self {
        Self {
            assistant: assistant.into(),
        }
    }
}

#[async_trait]
impl Action for ListFilesAction {
    fn name(&self) -> &str {
        "list_files"
    }

    async fn on_event(&self, ctx: &ActionContext, trigger: Trigger) -> Result<Option<PendingId>> {
        let mut request = PendingRequest::new("Listing files...", json!({}));
        request.parent_event_id = Some(trigger.event_id);
        let pending_id = ctx.pending.create_pending(request).await?;

        let outcome = match ctx.remote.list_files(&self.assistant).await {
            Ok(files) => serde_json::to_value(&files).map_err(Error::from),
            Err(e) => Err(Error::from(e)),
        };

        match outcome {
            Ok(files) => {
                ctx.pending
                    .complete_pending(&pending_id, Emission::new(json!({ "files": files })))
                    .await?;
                Ok(Some(pending_id))
            }
            Err(e) => {
                error!(assistant = %self.assistant, error = %e, "Listing files failed");
                ctx.pending
                    .cancel_pending(&pending_id, &format!("List failed: {e}"))
                    .await?;
                Err(e)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteInput {
    file_id: String,
}

/// Delete one file; emits `{fileId}` once the remote delete succeeded.
pub struct DeleteFileAction {
    assistant: String,
}

impl DeleteFileAction {
    pub fn new(assistant: impl Into<String>) -> Self {
        Self {
            assistant: assistant.into(),
        }
    }
}

#[async_trait]
impl Action for DeleteFileAction {
    fn name(&self) -> &str {
        "delete_file"
    }

    async fn on_event(&self, ctx: &ActionContext, trigger: Trigger) -> Result<Option<PendingId>> {
        let input: DeleteInput = parse_input(self.name(), trigger.input)?;

        ctx.remote.delete_file(&self.assistant, &input.file_id).await?;
        info!(assistant = %self.assistant, file_id = %input.file_id, "File deleted");

        ctx.pending
            .emit(Emission::new(json!({"fileId": input.file_id})).with_parent(Some(trigger.event_id)))
            .await?;
        Ok(None)
    }
}
