use anyhow::{anyhow, Result};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::{ChatMessage, StreamChunk, ToolCall, ToolDefinition};
use shared::settings::ProviderAuth;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::sse::SseParser;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";
/// Route served by the proxy crate
pub const PROXY_CHAT_PATH: &str = "/api/chat";

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

/// OpenAI function-calling tool definition.
#[derive(Debug, Clone, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// ── Streaming response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamToolCall {
    #[serde(default)]
    index: usize,
    /// Present on the first chunk for this tool call.
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAIStreamToolCallFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamToolCallFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// What one streamed completion produced.
#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

// ── Conversion ───────────────────────────────────────────────────────

fn to_openai_tool(tool: &ToolDefinition) -> OpenAITool {
    OpenAITool {
        tool_type: "function".to_string(),
        function: OpenAIFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

fn to_openai_tools(tools: &[ToolDefinition]) -> Option<Vec<OpenAITool>> {
    if tools.is_empty() {
        None
    } else {
        Some(tools.iter().map(to_openai_tool).collect())
    }
}

/// Convert ChatMessages to the vendor's message format.
///
/// - assistant turns with `tool_calls` carry the calls with stringified arguments
/// - `tool` turns carry their `tool_call_id`
/// - everything else is a plain `{role, content}`
fn to_openai_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| match (&m.tool_calls, &m.tool_call_id) {
            (Some(calls), _) if !calls.is_empty() => {
                let tool_calls: Vec<serde_json::Value> = calls
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let mut msg = serde_json::json!({
                    "role": "assistant",
                    "tool_calls": tool_calls,
                });
                // The vendor expects null rather than "" when the turn is tool-only
                msg["content"] = if m.content.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::Value::String(m.content.clone())
                };
                msg
            }
            (_, Some(id)) => serde_json::json!({
                "role": "tool",
                "tool_call_id": id,
                "content": m.content,
            }),
            _ => serde_json::json!({
                "role": m.role,
                "content": m.content,
            }),
        })
        .collect()
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    // Keep malformed arguments visible so the tool can report them back
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

// ── Client ───────────────────────────────────────────────────────────

pub struct OpenAIClient {
    http: Client,
    auth_token: Option<String>,
    model: String,
    endpoint: String,
}

impl OpenAIClient {
    /// Direct vendor access with a bearer key.
    pub fn from_auth(model: &str, auth: &ProviderAuth, base_url: Option<&str>) -> Result<Self> {
        let auth_token = match auth.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow!("No OpenAI authentication configured"))?,
        };

        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        Ok(Self {
            http: SHARED_HTTP.clone(),
            auth_token: Some(auth_token),
            model: model.to_string(),
            endpoint: format!("{}{}", base, COMPLETIONS_PATH),
        })
    }

    /// Keyless access through the proxy, which attaches the key server-side.
    pub fn via_proxy(model: &str, proxy_url: &str) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            auth_token: None,
            model: model.to_string(),
            endpoint: format!("{}{}", proxy_url.trim_end_matches('/'), PROXY_CHAT_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn has_key(&self) -> bool {
        self.auth_token.is_some()
    }

    pub async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<StreamOutcome> {
        self.generate_stream_inner(messages, None, None, tx).await
    }

    pub async fn generate_stream_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<StreamOutcome> {
        self.generate_stream_inner(messages, to_openai_tools(tools), None, tx)
            .await
    }

    /// Declares the tools but forbids calling them, forcing a text answer.
    ///
    /// Used once the tool budget is spent; the history may already hold tool turns.
    pub async fn generate_stream_final(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<StreamOutcome> {
        let tools = to_openai_tools(tools);
        let choice = tools.as_ref().map(|_| "none");
        self.generate_stream_inner(messages, tools, choice, tx).await
    }

    async fn generate_stream_inner(
        &self,
        messages: &[ChatMessage],
        tools: Option<Vec<OpenAITool>>,
        tool_choice: Option<&'static str>,
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<StreamOutcome> {
        let req = OpenAIRequest {
            model: self.model.clone(),
            messages: to_openai_messages(messages),
            stream: true,
            tools,
            tool_choice,
        };
        debug!(endpoint = %self.endpoint, messages = messages.len(), "sending chat completion");

        let mut builder = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        if let Some(token) = &self.auth_token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let resp = builder.json(&req).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            if detail.trim().is_empty() {
                return Err(anyhow!("openai error: {}", status));
            }
            return Err(anyhow!("openai error: {}\n{}", status, detail));
        }

        let mut parser = SseParser::new();
        let mut stream = resp.bytes_stream();
        let mut outcome = StreamOutcome::default();
        // Tool calls being assembled, indexed by position
        let mut active_tools: Vec<PendingToolCall> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| anyhow!("stream read error: {}", e))?;
            for event in parser.feed(&bytes) {
                if Self::apply_event(&event.data, &mut outcome, &mut active_tools, tx) {
                    Self::flush_tool_calls(&mut active_tools, &mut outcome, tx);
                    return Ok(outcome);
                }
            }
        }
        if let Some(event) = parser.finish() {
            Self::apply_event(&event.data, &mut outcome, &mut active_tools, tx);
        }

        Self::flush_tool_calls(&mut active_tools, &mut outcome, tx);
        Ok(outcome)
    }

    /// Fold one SSE payload into the outcome. Returns true once the completion is finished.
    fn apply_event(
        data: &str,
        outcome: &mut StreamOutcome,
        active_tools: &mut Vec<PendingToolCall>,
        tx: &UnboundedSender<StreamChunk>,
    ) -> bool {
        if data == "[DONE]" {
            return true;
        }
        let resp = match serde_json::from_str::<OpenAIStreamResponse>(data) {
            Ok(resp) => resp,
            // Skip payloads that are not completion chunks
            Err(_) => return false,
        };
        let Some(choice) = resp.choices.into_iter().next() else {
            return false;
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                outcome.text.push_str(&content);
                let _ = tx.send(StreamChunk::Text(content));
            }
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let idx = tc.index;
            while active_tools.len() <= idx {
                active_tools.push(PendingToolCall::default());
            }
            let pending = &mut active_tools[idx];

            if let Some(id) = tc.id {
                pending.id = id;
            }
            if let Some(func) = tc.function {
                if let Some(name) = func.name {
                    pending.name = name.clone();
                    let _ = tx.send(StreamChunk::ToolUseStart {
                        id: pending.id.clone(),
                        name,
                    });
                }
                if let Some(args) = func.arguments {
                    pending.arguments.push_str(&args);
                    let _ = tx.send(StreamChunk::ToolInputDelta(args));
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            outcome.stop_reason = Some(reason);
            return true;
        }
        false
    }

    /// Emit ToolUseComplete for all accumulated tool calls and clear the buffer.
    fn flush_tool_calls(
        active_tools: &mut Vec<PendingToolCall>,
        outcome: &mut StreamOutcome,
        tx: &UnboundedSender<StreamChunk>,
    ) {
        for (idx, pending) in active_tools.drain(..).enumerate() {
            if pending.name.is_empty() {
                continue;
            }
            let id = if pending.id.is_empty() {
                format!("call_{}", idx)
            } else {
                pending.id
            };
            let input = parse_arguments(&pending.arguments);
            let _ = tx.send(StreamChunk::ToolUseComplete {
                id: id.clone(),
                name: pending.name.clone(),
                input: input.clone(),
            });
            outcome.tool_calls.push(ToolCall {
                id,
                name: pending.name,
                arguments: input,
            });
        }
    }
}
