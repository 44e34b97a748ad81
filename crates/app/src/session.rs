//! Wires the agent to the terminal: builds the host, runs turns and prints the stream.

use agent_host::{default_registry, AgentHost, ChatReply};
use anyhow::Result;
use providers::router::ChatRoute;
use services::game_bridge::{GameAction, GameBridge};
use services::knowledge::KnowledgeBase;
use services::storage::KeyValueStore;
use shared::agent_api::StreamChunk;
use shared::settings::AppSettings;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Where a rendered chunk goes: answer text on stdout, activity on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Answer,
    Activity,
}

pub fn render_chunk(chunk: &StreamChunk) -> Option<(Channel, String)> {
    match chunk {
        StreamChunk::Text(text) => Some((Channel::Answer, text.clone())),
        StreamChunk::ToolUseStart { name, .. } => {
            Some((Channel::Activity, format!("\n[tool] {} ...\n", name)))
        }
        StreamChunk::ToolResult {
            name,
            output,
            is_error,
            ..
        } => {
            let first_line = output.lines().next().unwrap_or("");
            let tag = if *is_error { "failed" } else { "done" };
            Some((
                Channel::Activity,
                format!("[tool] {} {}: {}\n", name, tag, first_line),
            ))
        }
        StreamChunk::Error(message) => {
            Some((Channel::Activity, format!("\n[error] {}\n", message)))
        }
        StreamChunk::Done { .. } => Some((Channel::Answer, "\n".to_string())),
        StreamChunk::ToolInputDelta(_) | StreamChunk::ToolUseComplete { .. } => None,
    }
}

/// Game actions delivered to the CLI itself are shown on stderr.
fn host_bridge() -> GameBridge {
    let (tx, mut rx) = mpsc::unbounded_channel::<GameAction>();
    tokio::spawn(async move {
        while let Some(action) = rx.recv().await {
            eprintln!(
                "[game] {} {} {}",
                action.action,
                action.target.as_deref().unwrap_or("-"),
                action.payload
            );
        }
    });
    GameBridge::host(tx)
}

pub fn build_agent(
    settings: AppSettings,
    store: Arc<dyn KeyValueStore>,
    force_proxy: bool,
) -> Result<AgentHost> {
    let knowledge = KnowledgeBase::new(store.clone());
    let seeded = knowledge.seed()?;
    if seeded > 0 {
        info!(seeded, "knowledge base seeded");
    }

    let bridge = match settings.game.websocket_url.as_deref() {
        Some(url) => GameBridge::websocket(url)?,
        None => host_bridge(),
    };
    let registry = default_registry(Arc::new(knowledge), Arc::new(bridge));

    let proxy_route = ChatRoute::Proxy {
        model: settings.model.openai_model.clone(),
        proxy_url: settings.proxy_url().to_string(),
    };
    let agent = AgentHost::new(settings, store, registry);
    Ok(if force_proxy {
        agent.with_route(proxy_route)
    } else {
        agent
    })
}

/// Run one turn, printing chunks as they arrive.
pub async fn run_turn(agent: &AgentHost, text: &str) -> Result<ChatReply> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        let mut stderr = std::io::stderr();
        while let Some(chunk) = rx.recv().await {
            let Some((channel, text)) = render_chunk(&chunk) else {
                continue;
            };
            let result = match channel {
                Channel::Answer => write!(stdout, "{}", text).and_then(|_| stdout.flush()),
                Channel::Activity => write!(stderr, "{}", text),
            };
            if let Err(e) = result {
                warn!(error = %e, "terminal write failed");
                break;
            }
        }
    });

    let reply = agent.chat(text, tx).await;
    // The sender is dropped with the turn, so the printer drains and exits
    let _ = printer.await;
    reply
}
