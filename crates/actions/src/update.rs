//! Partial assistant update as a one-shot action.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use steward_core::error::{Error, Result};
use steward_core::host::{Emission, PendingId, PendingRequest};
use steward_core::remote::{AssistantUpdate, Metadata};
use tracing::{error, info};

use crate::{Action, ActionContext, Trigger, parse_input};

#[derive(Debug, Default, Deserialize)]
struct UpdateInput {
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

pub struct UpdateAssistantAction {
    assistant: String,
}

impl UpdateAssistantAction {
    pub fn new(assistant: impl Into<String>) -> Self {
        Self {
            assistant: assistant.into(),
        }
    }

    async fn apply(&self, ctx: &ActionContext, update: AssistantUpdate) -> Result<serde_json::Value> {
        ctx.remote.update_assistant(&self.assistant, update).await?;
        let current = ctx.remote.describe_assistant(&self.assistant).await?;

        Ok(json!({
            "assistantName": self.assistant,
            "instructions": current.instructions,
            "metadata": current.metadata,
            "status": current.status,
            "updated": true,
        }))
    }
}

#[async_trait]
impl Action for UpdateAssistantAction {
    fn name(&self) -> &str {
        "update_assistant"
    }

    async fn on_event(&self, ctx: &ActionContext, trigger: Trigger) -> Result<Option<PendingId>> {
        let input: UpdateInput = parse_input(self.name(), trigger.input)?;

        let has_instructions = input.instructions.as_deref().is_some_and(|s| !s.is_empty());
        if !has_instructions && input.metadata.is_none() {
            return Err(Error::Validation(
                "At least one of instructions or metadata must be provided".into(),
            ));
        }

        let mut request = PendingRequest::new("Updating assistant...", json!({"assistantName": self.assistant}));
        request.parent_event_id = Some(trigger.event_id);
        let pending_id = ctx.pending.create_pending(request).await?;

        let update = AssistantUpdate {
            instructions: input.instructions,
            metadata: input.metadata,
        };
        match self.apply(ctx, update).await {
            Ok(payload) => {
                info!(assistant = %self.assistant, "Assistant updated");
                ctx.pending
                    .complete_pending(&pending_id, Emission::new(payload))
                    .await?;
                Ok(Some(pending_id))
            }
            Err(e) => {
                error!(assistant = %self.assistant, error = %e, "Assistant update failed");
                ctx.pending
                    .cancel_pending(&pending_id, &format!("Update failed: {e}"))
                    .await?;
                Err(e)
            }
        }
    }
}
