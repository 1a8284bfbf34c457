//! Upload a file and wait for the assistant to finish processing it.
//!
//! Accept stage: stage content, upload, open a pending event and set the
//! first status-check timer. Each timer fire describes the file; while it
//! is still processing the pending progress is refreshed and the same
//! payload is re-armed, otherwise the pending event is completed with the
//! final file details.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use steward_core::error::Result;
use steward_core::host::{Emission, PendingId, PendingRequest, Resolution, TimerRequest};
use steward_core::remote::{FileInfo, FileStatus, Metadata, UploadFile};
use steward_remote::StagedFile;
use tracing::{debug, error, info};

use crate::{Action, ActionContext, Trigger, parse_input};

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadInput {
    content: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

/// Everything a status check needs; carried in the timer payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCheck {
    pub assistant_name: String,
    pub pending_id: PendingId,
    pub file_id: String,
    pub content_length: usize,
    pub uploaded_metadata: Metadata,
}

pub struct UploadFileAction {
    assistant: String,
    initial_delay: Duration,
    poll_delay: Duration,
}

impl UploadFileAction {
    pub fn new(assistant: impl Into<String>) -> Self {
        Self {
            assistant: assistant.into(),
            initial_delay: DEFAULT_INITIAL_DELAY,
            poll_delay: DEFAULT_POLL_DELAY,
        }
    }

    pub fn with_delays(mut self, initial: Duration, poll: Duration) -> Self {
        self.initial_delay = initial;
        self.poll_delay = poll;
        self
    }

    async fn schedule(&self, ctx: &ActionContext, delay: Duration, check: &UploadCheck) -> Result<()> {
        let request = TimerRequest {
            target: self.name().to_string(),
            payload: serde_json::to_value(check)?,
            pending_event_id: Some(check.pending_id.clone()),
            description: format!("Checking status for file {}", check.file_id),
        };
        ctx.timers.set_timer(delay, request).await?;
        Ok(())
    }

    /// One status check. `Ok(true)` once the pending event is resolved,
    /// by this check or an earlier one.
    async fn check(&self, ctx: &ActionContext, check: &UploadCheck) -> Result<bool> {
        let details = ctx
            .remote
            .describe_file(&check.assistant_name, &check.file_id)
            .await?;

        if details.status == FileStatus::Processing {
            let percent = details.percent_done.unwrap_or(0.0) * 100.0;
            debug!(file_id = %check.file_id, percent, "File still processing");
            let open = ctx
                .pending
                .update_pending(&check.pending_id, &format!("Processing file... {percent:.1}% complete"))
                .await?;
            if !open {
                debug!(pending_id = %check.pending_id, "Upload result already delivered, polling stops");
                return Ok(true);
            }
            self.schedule(ctx, self.poll_delay, check).await?;
            return Ok(false);
        }

        info!(file_id = %check.file_id, status = %details.status, "Upload finished processing");
        let resolution = ctx
            .pending
            .complete_pending(&check.pending_id, Emission::new(final_payload(details, check)))
            .await?;
        if resolution == Resolution::AlreadyResolved {
            debug!(pending_id = %check.pending_id, "Upload result already delivered");
        }
        Ok(true)
    }
}

fn final_payload(details: FileInfo, check: &UploadCheck) -> serde_json::Value {
    let metadata = details
        .metadata
        .unwrap_or_else(|| json!(check.uploaded_metadata));
    json!({
        "fileId": details.id,
        "name": details.name,
        "status": details.status,
        "metadata": metadata,
        "contentLength": check.content_length,
        "percentDone": details.percent_done,
        "errorMessage": details.error_message,
        "createdOn": details.created_on,
        "updatedOn": details.updated_on,
    })
}

#[async_trait]
impl Action for UploadFileAction {
    fn name(&self) -> &str {
        "upload_file"
    }

    async fn on_event(&self, ctx: &ActionContext, trigger: Trigger) -> Result<Option<PendingId>> {
        let input: UploadInput = parse_input(self.name(), trigger.input)?;

        let staged = StagedFile::write(&input.content, input.filename.as_deref())?;
        let upload = UploadFile {
            path: staged.path().to_path_buf(),
            metadata: input.metadata.clone(),
        };
        let uploaded = ctx.remote.upload_file(&self.assistant, upload).await;
        staged.close();
        let uploaded = uploaded?;

        let content_length = input.content.chars().count();
        let mut request = PendingRequest::new(
            "Checking file status...",
            json!({
                "fileId": uploaded.id,
                "contentLength": content_length,
                "uploadedMetadata": input.metadata,
            }),
        );
        request.parent_event_id = Some(trigger.event_id);
        let pending_id = ctx.pending.create_pending(request).await?;

        let check = UploadCheck {
            assistant_name: self.assistant.clone(),
            pending_id: pending_id.clone(),
            file_id: uploaded.id,
            content_length,
            uploaded_metadata: input.metadata,
        };
        if let Err(e) = self.schedule(ctx, self.initial_delay, &check).await {
            ctx.pending
                .cancel_pending(&pending_id, &format!("Failed to check file status: {e}"))
                .await?;
            return Err(e);
        }

        info!(assistant = %self.assistant, file_id = %check.file_id, pending_id = %pending_id, "File uploaded, waiting for processing");
        Ok(Some(pending_id))
    }

    async fn on_timer(&self, ctx: &ActionContext, payload: serde_json::Value) -> Result<()> {
        let check: UploadCheck = serde_json::from_value(payload)?;

        match self.check(ctx, &check).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(file_id = %check.file_id, error = %e, "Failed to check file status");
                ctx.pending
                    .cancel_pending(&check.pending_id, &format!("Failed to check file status: {e}"))
                    .await?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use steward_core::error::{Error, RemoteError};
    use steward_remote::mock::{FileProgress, MockAssistantService, RemoteCall};
    use steward_core::event::OutputEvent;
    use steward_store::PendingState;

    fn input() -> serde_json::Value {
        json!({
            "content": "Quarterly numbers",
            "filename": "q3.txt",
            "metadata": {"quarter": "q3"}
        })
    }

    #[tokio::test]
    async fn accept_uploads_and_arms_timer() {
        let harness = Harness::new(MockAssistantService::new());
        let action = UploadFileAction::new("docs");

        let pending = action
            .on_event(&harness.ctx, Trigger::new(input()))
            .await
            .unwrap()
            .unwrap();

        match &harness.remote.calls()[0] {
            RemoteCall::UploadFile { file_name, content, .. } => {
                assert_eq!(file_name, "q3.txt");
                assert_eq!(content, "Quarterly numbers");
            }
            other => panic!("unexpected call {other:?}"),
        }

        let (delay, timer) = harness.take_timer().unwrap();
        assert_eq!(delay, DEFAULT_INITIAL_DELAY);
        assert_eq!(timer.target, "upload_file");
        assert_eq!(timer.pending_event_id.as_ref(), Some(&pending));
        assert_eq!(timer.description, "Checking status for file file-1");

        let check: UploadCheck = serde_json::from_value(timer.payload).unwrap();
        assert_eq!(check.file_id, "file-1");
        assert_eq!(check.content_length, 17);
        assert_eq!(check.assistant_name, "docs");

        let opened = harness.pending.request(&pending).await.unwrap();
        assert_eq!(opened.status_description, "Checking file status...");
        assert_eq!(opened.event["fileId"], "file-1");
    }

    #[tokio::test]
    async fn polls_until_available_then_completes_once() {
        let harness = Harness::new(MockAssistantService::new());
        harness
            .remote
            .script_file_progress(vec![FileProgress::processing(0.25), FileProgress::available()]);
        let action = UploadFileAction::new("docs");
        let pending = action
            .on_event(&harness.ctx, Trigger::new(input()))
            .await
            .unwrap()
            .unwrap();

        // First check: still processing, re-armed with the same payload
        let (_, first) = harness.take_timer().unwrap();
        action.on_timer(&harness.ctx, first.payload.clone()).await.unwrap();
        let (delay, second) = harness.take_timer().unwrap();
        assert_eq!(delay, DEFAULT_POLL_DELAY);
        assert_eq!(second.payload, first.payload);
        assert_eq!(
            harness.pending.state(&pending).await,
            Some(PendingState::Open {
                status_description: "Processing file... 25.0% complete".into()
            })
        );

        // Second check: available
        action.on_timer(&harness.ctx, second.payload.clone()).await.unwrap();
        assert!(harness.take_timer().is_none());

        let emitted = harness.emitted().await;
        assert_eq!(emitted.len(), 1);
        let (output, payload) = &emitted[0];
        assert_eq!(output, "default");
        assert_eq!(payload["fileId"], "file-1");
        assert_eq!(payload["status"], "Available");
        assert_eq!(payload["contentLength"], 17);
        assert_eq!(payload["metadata"]["quarter"], "q3");

        // A stray late timer resolves nothing new
        action.on_timer(&harness.ctx, second.payload).await.unwrap();
        assert_eq!(harness.emitted().await.len(), 1);
        assert!(harness.cancellations().await.is_empty());
    }

    #[tokio::test]
    async fn late_timer_for_resolved_upload_stops_polling() {
        let harness = Harness::new(MockAssistantService::new());
        harness
            .remote
            .script_file_progress(vec![FileProgress::available(), FileProgress::processing(0.5)]);
        let action = UploadFileAction::new("docs");
        let pending = action
            .on_event(&harness.ctx, Trigger::new(input()))
            .await
            .unwrap()
            .unwrap();
        let (_, timer) = harness.take_timer().unwrap();
        action.on_timer(&harness.ctx, timer.payload.clone()).await.unwrap();
        assert!(matches!(harness.pending.state(&pending).await, Some(PendingState::Completed { .. })));

        // A duplicate fire sees the file reprocessing after completion
        action.on_timer(&harness.ctx, timer.payload).await.unwrap();

        assert!(harness.take_timer().is_none());
        assert_eq!(harness.remote.call_count("describe_file"), 2);
        let progress = harness
            .pending
            .history()
            .await
            .into_iter()
            .filter(|e| matches!(e, OutputEvent::Progress { .. }))
            .count();
        assert_eq!(progress, 0);
        assert!(harness.cancellations().await.is_empty());
    }

    #[tokio::test]
    async fn processing_failure_completes_with_error_details() {
        let harness = Harness::new(MockAssistantService::new());
        harness
            .remote
            .script_file_progress(vec![FileProgress::failed("unsupported encoding")]);
        let action = UploadFileAction::new("docs");
        action.on_event(&harness.ctx, Trigger::new(input())).await.unwrap();

        let (_, timer) = harness.take_timer().unwrap();
        action.on_timer(&harness.ctx, timer.payload).await.unwrap();

        let emitted = harness.emitted().await;
        assert_eq!(emitted[0].1["status"], "ProcessingFailed");
        assert_eq!(emitted[0].1["errorMessage"], "unsupported encoding");
    }

    #[tokio::test]
    async fn check_error_cancels_and_propagates() {
        let harness = Harness::new(MockAssistantService::new());
        let action = UploadFileAction::new("docs");
        let pending = action
            .on_event(&harness.ctx, Trigger::new(input()))
            .await
            .unwrap()
            .unwrap();
        harness
            .remote
            .fail_next("describe_file", RemoteError::Network("connection reset".into()));

        let (_, timer) = harness.take_timer().unwrap();
        let err = action.on_timer(&harness.ctx, timer.payload).await.unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Network(_))));

        let cancellations = harness.cancellations().await;
        assert_eq!(cancellations.len(), 1);
        assert!(cancellations[0].starts_with("Failed to check file status:"));
        assert!(matches!(harness.pending.state(&pending).await, Some(PendingState::Cancelled { .. })));
        assert!(harness.take_timer().is_none());
    }

    #[tokio::test]
    async fn upload_error_opens_no_pending() {
        let remote = MockAssistantService::new();
        remote.fail_next("upload_file", RemoteError::AuthenticationFailed("bad key".into()));
        let harness = Harness::new(remote);
        let action = UploadFileAction::new("docs");

        assert!(action.on_event(&harness.ctx, Trigger::new(input())).await.is_err());
        assert_eq!(harness.pending.open_count().await, 0);
        assert!(harness.take_timer().is_none());
    }

    #[tokio::test]
    async fn missing_content_is_rejected() {
        let harness = Harness::new(MockAssistantService::new());
        let action = UploadFileAction::new("docs");
        let err = action
            .on_event(&harness.ctx, Trigger::new(json!({"filename": "x.txt"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(harness.remote.calls().is_empty());
    }
}
