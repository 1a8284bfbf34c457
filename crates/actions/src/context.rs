//! Retrieve context snippets without generating a reply.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use steward_core::error::{Error, Result};
use steward_core::host::{Emission, PendingId, PendingRequest};
use steward_core::message::ChatMessage;
use steward_core::remote::ContextRequest;
use tracing::error;

use crate::{Action, ActionContext, Trigger, parse_input};

pub const DEFAULT_TOP_K: u32 = 16;

#[derive(Debug, Deserialize)]
struct RetrieveInput {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    filter: Option<serde_json::Value>,
}

pub struct RetrieveSnippetsAction {
    assistant: String,
    top_k: u32,
}

impl RetrieveSnippetsAction {
    pub fn new(assistant: impl Into<String>) -> Self {
        Self {
            assistant: assistant.into(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl Action for RetrieveSnippetsAction {
    fn name(&self) -> &str {
        "retrieve_snippets"
    }

    async fn on_event(&self, ctx: &ActionContext, trigger: Trigger) -> Result<Option<PendingId>> {
        let input: RetrieveInput = parse_input(self.name(), trigger.input)?;

        let mut request = PendingRequest::new(
            "Retrieving context snippets...",
            json!({"messages": input.messages}),
        );
        request.parent_event_id = Some(trigger.event_id);
        let pending_id = ctx.pending.create_pending(request).await?;

        let context = ContextRequest {
            messages: input.messages.clone(),
            top_k: Some(self.top_k),
            filter: input.filter.filter(|f| !f.is_null()),
        };

        let outcome = match ctx.remote.context(&self.assistant, context).await {
            Ok(response) => serde_json::to_value(&response).map_err(Error::from),
            Err(e) => Err(Error::from(e)),
        };

        match outcome {
            Ok(mut payload) => {
                if let Some(object) = payload.as_object_mut() {
                    object.insert("messages".into(), serde_json::to_value(&input.messages)?);
                }
                ctx.pending
                    .complete_pending(&pending_id, Emission::new(payload))
                    .await?;
                Ok(Some(pending_id))
            }
            Err(e) => {
                error!(assistant = %self.assistant, error = %e, "Context retrieval failed");
                ctx.pending
                    .cancel_pending(&pending_id, &format!("Context retrieval error: {e}"))
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
    use steward_core::error::RemoteError;
    use steward_remote::mock::{MockAssistantService, RemoteCall};

    #[tokio::test]
    async fn emits_snippets_with_input_messages() {
        let harness = Harness::new(MockAssistantService::new());
        let action = RetrieveSnippetsAction::new("docs");

        action
            .on_event(
                &harness.ctx,
                Trigger::new(json!({"messages": [{"role": "user", "content": "reconcile?"}]})),
            )
            .await
            .unwrap();

        match &harness.remote.calls()[0] {
            RemoteCall::Context(assistant, request) => {
                assert_eq!(assistant, "docs");
                assert_eq!(request.top_k, Some(DEFAULT_TOP_K));
                assert!(request.filter.is_none());
            }
            other => panic!("unexpected call {other:?}"),
        }

        let emitted = harness.emitted().await;
        let payload = &emitted[0].1;
        assert_eq!(payload["snippets"][0]["type"], "text");
        assert_eq!(payload["messages"][0]["content"], "reconcile?");
        assert_eq!(payload["usage"]["total_tokens"], 12);
    }

    #[tokio::test]
    async fn filter_and_top_k_are_forwarded() {
        let harness = Harness::new(MockAssistantService::new());
        let action = RetrieveSnippetsAction::new("docs").with_top_k(4);

        action
            .on_event(
                &harness.ctx,
                Trigger::new(json!({
                    "messages": [{"role": "user", "content": "q"}],
                    "filter": {"genre": {"$eq": "docs"}}
                })),
            )
            .await
            .unwrap();

        match &harness.remote.calls()[0] {
            RemoteCall::Context(_, request) => {
                assert_eq!(request.top_k, Some(4));
                assert_eq!(request.filter.as_ref().unwrap()["genre"]["$eq"], "docs");
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_cancels_with_reason() {
        let remote = MockAssistantService::new();
        remote.fail_next("context", RemoteError::NotFound("assistant docs".into()));
        let harness = Harness::new(remote);
        let action = RetrieveSnippetsAction::new("docs");

        let result = action
            .on_event(&harness.ctx, Trigger::new(json!({"messages": [{"role": "user", "content": "q"}]})))
            .await;
        assert!(result.is_err());

        let cancellations = harness.cancellations().await;
        assert!(cancellations[0].starts_with("Context retrieval error:"));
        assert_eq!(harness.pending.open_count().await, 0);
    }
}
