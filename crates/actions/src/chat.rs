//! Chat actions.
//!
//! Both run in two stages. The accept stage opens a pending event and
//! sends an internal message to itself; the perform stage makes the one
//! chat call and resolves the pending event. The message body carries
//! everything the perform stage needs.
//!
//! Simple chat keeps the conversation history in the key-value store, so
//! callers only send the new user message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use steward_core::error::{Error, RemoteError, Result};
use steward_core::host::{Emission, EventId, InternalMessage, KeyValueStore, PendingId, PendingRequest};
use steward_core::message::{ChatMessage, ConversationId};
use steward_core::remote::{ChatRequest, ChatResponse, ContextOptions};
use tracing::{debug, error, info};

use crate::conversation::{ConversationStore, DEFAULT_TTL};
use crate::{ASSISTANT_ERROR_OUTPUT, Action, ActionContext, Trigger, parse_input};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Chat with a deadline; the remote call is abandoned when it passes.
async fn chat_with_timeout(
    ctx: &ActionContext,
    assistant: &str,
    request: ChatRequest,
    timeout: Duration,
) -> std::result::Result<ChatResponse, RemoteError> {
    match tokio::time::timeout(timeout, ctx.remote.chat(assistant, request)).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(format!(
            "chat with {assistant} took longer than {}s",
            timeout.as_secs()
        ))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimpleChatInput {
    user_message: String,
    #[serde(default)]
    conversation_id: Option<ConversationId>,
}

/// Accept-to-perform message for simple chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleChatDispatch {
    pub conversation_id: ConversationId,
    pub continued: bool,
    pub messages: Vec<ChatMessage>,
    pub parent_event_id: EventId,
    pub pending_event_id: PendingId,
}

/// Conversation-managed chat.
///
/// Outputs `{response, conversationId, continued}` on the default output,
/// or `{error, conversationId}` on `assistantError` when the call fails.
pub struct SimpleChatAction {
    assistant: String,
    model: String,
    ttl: Duration,
    timeout: Duration,
}

impl SimpleChatAction {
    pub fn new(assistant: impl Into<String>) -> Self {
        Self {
            assistant: assistant.into(),
            model: DEFAULT_MODEL.into(),
            ttl: DEFAULT_TTL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn store(&self, kv: Arc<dyn KeyValueStore>) -> ConversationStore {
        ConversationStore::new(kv, self.ttl)
    }

    async fn perform(&self, ctx: &ActionContext, dispatch: &SimpleChatDispatch) -> Result<String> {
        let request = ChatRequest::new(dispatch.messages.clone(), self.model.clone());
        let response = chat_with_timeout(ctx, &self.assistant, request, self.timeout).await?;

        let reply = response.message.content.clone();
        let mut messages = dispatch.messages.clone();
        messages.push(response.message);
        self.store(ctx.kv.clone())
            .set(&dispatch.conversation_id, &messages)
            .await?;
        Ok(reply)
    }
}

#[async_trait]
impl Action for SimpleChatAction {
    fn name(&self) -> &str {
        "chat"
    }

    async fn on_event(&self, ctx: &ActionContext, trigger: Trigger) -> Result<Option<PendingId>> {
        let input: SimpleChatInput = parse_input(self.name(), trigger.input)?;
        let store = self.store(ctx.kv.clone());

        let supplied = input.conversation_id.filter(|id| !id.as_str().is_empty());
        let (conversation_id, mut messages, continued) = match supplied {
            Some(id) => match store.get(&id).await? {
                Some(history) => (id, history, true),
                None => (id, Vec::new(), false),
            },
            None => (ConversationId::new(), Vec::new(), false),
        };

        messages.push(ChatMessage::user(input.user_message));
        store.set(&conversation_id, &messages).await?;

        let mut request = PendingRequest::new(
            "Assistant response in progress",
            json!({"conversationId": conversation_id, "continued": continued}),
        );
        request.parent_event_id = Some(trigger.event_id.clone());
        let pending_id = ctx.pending.create_pending(request).await?;

        let dispatch = SimpleChatDispatch {
            conversation_id,
            continued,
            messages,
            parent_event_id: trigger.event_id,
            pending_event_id: pending_id.clone(),
        };
        debug!(conversation_id = %dispatch.conversation_id, continued, turns = dispatch.messages.len(), "Chat accepted");

        ctx.messaging
            .send(InternalMessage {
                target: self.name().to_string(),
                body: serde_json::to_value(&dispatch)?,
            })
            .await?;
        Ok(Some(pending_id))
    }

    async fn on_message(&self, ctx: &ActionContext, body: serde_json::Value) -> Result<()> {
        let dispatch: SimpleChatDispatch = serde_json::from_value(body)?;
        let parent = Some(dispatch.parent_event_id.clone());

        match self.perform(ctx, &dispatch).await {
            Ok(reply) => {
                info!(conversation_id = %dispatch.conversation_id, "Assistant replied");
                let emission = Emission::new(json!({
                    "response": reply,
                    "conversationId": dispatch.conversation_id,
                    "continued": dispatch.continued,
                }))
                .with_parent(parent);
                ctx.pending
                    .complete_pending(&dispatch.pending_event_id, emission)
                    .await?;
                Ok(())
            }
            Err(e) => {
                error!(conversation_id = %dispatch.conversation_id, error = %e, "Chat failed");
                ctx.pending
                    .cancel_pending(&dispatch.pending_event_id, &format!("Processing error: {e}"))
                    .await?;
                let message = match &e {
                    Error::Remote(remote) => remote.to_string(),
                    other => other.to_string(),
                };
                ctx.pending
                    .emit(
                        Emission::new(json!({
                            "error": message,
                            "conversationId": dispatch.conversation_id,
                        }))
                        .on_output(ASSISTANT_ERROR_OUTPUT)
                        .with_parent(parent),
                    )
                    .await?;
                Err(e)
            }
        }
    }
}

/// Advanced chat knobs. Only the ones that are set reach the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawChatOptions {
    pub temperature: Option<f32>,
    pub filter: Option<serde_json::Value>,
    pub json_response: bool,
    pub include_highlights: bool,
    pub top_k: Option<u32>,
    pub context_options: Option<ContextOptions>,
}

impl RawChatOptions {
    pub fn build(&self, messages: Vec<ChatMessage>, model: &str) -> ChatRequest {
        let mut request = ChatRequest::new(messages, model);
        request.temperature = self.temperature;
        request.filter = self.filter.clone();
        request.json_response = self.json_response.then_some(true);
        request.include_highlights = self.include_highlights.then_some(true);
        request.top_k = self.top_k;
        request.context_options = self.context_options.clone();
        request
    }
}

#[derive(Debug, Deserialize)]
struct RawChatInput {
    messages: Vec<ChatMessage>,
}

/// Accept-to-perform message for raw chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChatDispatch {
    pub messages: Vec<ChatMessage>,
    pub parent_event_id: EventId,
    pub pending_event_id: PendingId,
}

/// Chat with caller-supplied messages; the full response is the output.
pub struct RawChatAction {
    assistant: String,
    model: String,
    options: RawChatOptions,
    timeout: Duration,
}

impl RawChatAction {
    pub fn new(assistant: impl Into<String>, options: RawChatOptions) -> Self {
        Self {
            assistant: assistant.into(),
            model: DEFAULT_MODEL.into(),
            options,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Action for RawChatAction {
    fn name(&self) -> &str {
        "raw_chat"
    }

    async fn on_event(&self, ctx: &ActionContext, trigger: Trigger) -> Result<Option<PendingId>> {
        let input: RawChatInput = parse_input(self.name(), trigger.input)?;
        if input.messages.is_empty() {
            return Err(Error::Validation("At least one message is required".into()));
        }

        let mut request = PendingRequest::new("Assistant response in progress", json!({}));
        request.parent_event_id = Some(trigger.event_id.clone());
        let pending_id = ctx.pending.create_pending(request).await?;

        let dispatch = RawChatDispatch {
            messages: input.messages,
            parent_event_id: trigger.event_id,
            pending_event_id: pending_id.clone(),
        };
        ctx.messaging
            .send(InternalMessage {
                target: self.name().to_string(),
                body: serde_json::to_value(&dispatch)?,
            })
            .await?;
        Ok(Some(pending_id))
    }

    async fn on_message(&self, ctx: &ActionContext, body: serde_json::Value) -> Result<()> {
        let dispatch: RawChatDispatch = serde_json::from_value(body)?;
        let request = self.options.build(dispatch.messages, &self.model);

        let outcome = match chat_with_timeout(ctx, &self.assistant, request, self.timeout).await {
            Ok(response) => serde_json::to_value(&response).map_err(Error::from),
            Err(e) => Err(Error::from(e)),
        };

        match outcome {
            Ok(payload) => {
                ctx.pending
                    .complete_pending(
                        &dispatch.pending_event_id,
                        Emission::new(payload).with_parent(Some(dispatch.parent_event_id)),
                    )
                    .await?;
                Ok(())
            }
            Err(e) => {
                error!(assistant = %self.assistant, error = %e, "Raw chat failed");
                ctx.pending
                    .cancel_pending(&dispatch.pending_event_id, &format!("Processing error: {e}"))
                    .await?;
                Err(e)
            }
        }
    }
}
