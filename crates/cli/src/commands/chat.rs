//! `steward chat` and `steward raw-chat`.

use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use steward_actions::ASSISTANT_ERROR_OUTPUT;
use steward_core::message::ChatMessage;
use steward_runtime::{LocalRuntime, raw_chat_action};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CmdResult, action_runtime, load_config, outcome, parse_filter, print_json};

pub async fn run(config: Option<&Path>, message: Option<String>, conversation: Option<String>) -> CmdResult {
    let app = load_config(config)?;
    let mut runtime = action_runtime(&app)?;

    if let Some(msg) = message {
        let reply = send(&mut runtime, &msg, conversation.as_deref()).await?;
        println!("{}", reply.response);
        eprintln!("  (conversation {})", reply.conversation_id);
        return Ok(());
    }

    println!();
    println!("  💬 Steward Chat");
    println!("  Assistant: {}", app.chat_assistant().unwrap_or("-"));
    println!("  Model:     {}", app.chat.model);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut conversation = conversation;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt()?;
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        match send(&mut runtime, line, conversation.as_deref()).await {
            Ok(reply) => {
                eprint!("\r     \r");
                println!();
                for text in reply.response.lines() {
                    println!("  Assistant > {text}");
                }
                println!();
                conversation = Some(reply.conversation_id);
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

fn prompt() -> CmdResult {
    print!("  You > ");
    std::io::stdout().flush()?;
    Ok(())
}

struct Reply {
    response: String,
    conversation_id: String,
}

async fn send(runtime: &mut LocalRuntime, message: &str, conversation: Option<&str>) -> CmdResult<Reply> {
    let mut input = json!({ "userMessage": message });
    if let Some(id) = conversation {
        input["conversationId"] = json!(id);
    }

    let invocation = runtime.invoke("chat", input).await?;
    if let Some(error) = invocation.emitted_on(ASSISTANT_ERROR_OUTPUT).next() {
        let text = error.get("error").and_then(|e| e.as_str()).map(str::to_string);
        return Err(text.unwrap_or_else(|| error.to_string()).into());
    }

    let payload = outcome(&invocation)?;
    Ok(Reply {
        response: payload["response"].as_str().unwrap_or_default().to_string(),
        conversation_id: payload["conversationId"].as_str().unwrap_or_default().to_string(),
    })
}

pub async fn run_raw(config: Option<&Path>, messages: Vec<String>, filter: Option<String>) -> CmdResult {
    let app = load_config(config)?;
    let filter = parse_filter(filter)?;
    let mut runtime = action_runtime(&app)?;

    if filter.is_some() {
        let assistant = app.chat_assistant().ok_or("No assistant configured")?;
        runtime
            .registry_mut()
            .register(Arc::new(raw_chat_action(&app, assistant, filter)));
    }

    let messages: Vec<ChatMessage> = messages.iter().map(|m| parse_turn(m)).collect();
    let invocation = runtime.invoke("raw_chat", json!({ "messages": messages })).await?;
    print_json(&outcome(&invocation)?)
}

/// `assistant: text` marks an assistant turn; anything else is the user.
fn parse_turn(raw: &str) -> ChatMessage {
    match raw.strip_prefix("assistant:") {
        Some(text) => ChatMessage::assistant(text.trim()),
        None => ChatMessage::user(raw.strip_prefix("user:").unwrap_or(raw).trim()),
    }
}
