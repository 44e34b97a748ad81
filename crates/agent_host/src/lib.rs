//! Agent Host - chat orchestration for the NPC assistant
//!
//! This crate:
//! - Builds the request (system prompt + stored history + user turn)
//! - Picks the route: direct with tools when an API key is set, proxy streaming otherwise
//! - Runs the bounded tool loop, feeding tool results back to the model
//! - Records each exchange in the key-value store

pub mod conversation;
pub mod prompts;
pub mod tool_executor;
pub mod tools;

use anyhow::{bail, Result};
use providers::openai::{OpenAIClient, StreamOutcome};
use providers::router::ChatRoute;
use services::storage::KeyValueStore;
use shared::agent_api::{ChatMessage, StreamChunk, ToolCall};
use shared::settings::AppSettings;
use shared::tool::{ToolContext, ToolError, ToolInput};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub use tool_executor::ToolExecutor;
pub use tools::{default_registry, ToolRegistry};

/// Final result of one user turn
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    /// "direct" or "proxy"
    pub route: &'static str,
    /// Number of tool calls dispatched while answering
    pub tool_calls: usize,
    pub stop_reason: Option<String>,
}

/// Agent host manages the conversation and tool dispatch
pub struct AgentHost {
    pub settings: AppSettings,
    store: Arc<dyn KeyValueStore>,
    registry: ToolRegistry,
    executor: ToolExecutor,
    route_override: Option<ChatRoute>,
}

impl AgentHost {
    pub fn new(
        settings: AppSettings,
        store: Arc<dyn KeyValueStore>,
        registry: ToolRegistry,
    ) -> Self {
        Self {
            settings,
            store,
            registry,
            executor: ToolExecutor::new(),
            route_override: None,
        }
    }

    pub fn with_executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Pin the route instead of deriving it from the API key.
    pub fn with_route(mut self, route: ChatRoute) -> Self {
        self.route_override = Some(route);
        self
    }

    pub fn route(&self) -> ChatRoute {
        self.route_override
            .clone()
            .unwrap_or_else(|| ChatRoute::select(&self.settings))
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// System prompt, then the newest history that fits the limit, then the user turn.
    pub fn build_messages(
        &self,
        history: &[ChatMessage],
        user_text: &str,
        tools_enabled: bool,
    ) -> Vec<ChatMessage> {
        let limit = self.settings.history_limit;
        let skip = history.len().saturating_sub(limit);

        let mut messages = Vec::with_capacity(history.len() - skip + 2);
        messages.push(ChatMessage::system(prompts::system_prompt(
            &self.settings,
            tools_enabled,
        )));
        messages.extend(history[skip..].iter().cloned());
        messages.push(ChatMessage::user(user_text));
        messages
    }

    /// Answer one user message, streaming output through `tx`.
    ///
    /// Any failure after validation, HTTP or storage, is returned as `Err`
    /// and also reported as `StreamChunk::Error`.
    pub async fn chat(
        &self,
        user_text: &str,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<ChatReply> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            bail!("message is empty");
        }

        let route = self.route();
        match self.answer(&route, user_text, &tx).await {
            Ok(reply) => {
                let _ = tx.send(StreamChunk::Done {
                    stop_reason: reply.stop_reason.clone(),
                });
                Ok(reply)
            }
            Err(e) => {
                warn!(error = %e, "chat turn failed");
                let _ = tx.send(StreamChunk::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn answer(
        &self,
        route: &ChatRoute,
        user_text: &str,
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<ChatReply> {
        let use_tools = route.supports_tools() && !self.registry.is_empty();
        let history = conversation::load_history(self.store.as_ref())?;
        let messages = self.build_messages(
            &conversation::to_chat_messages(&history),
            user_text,
            use_tools,
        );
        info!(route = route.label(), tools = use_tools, history = history.len(), "chat turn");

        let client = route.client()?;
        let (outcome, tool_calls) = if use_tools {
            self.run_tool_loop(&client, messages, tx).await?
        } else {
            (client.generate_stream(&messages, tx).await?, 0)
        };

        conversation::append_turn(
            self.store.as_ref(),
            user_text,
            &outcome.text,
            self.settings.history_limit,
        )?;
        Ok(ChatReply {
            text: outcome.text,
            route: route.label(),
            tool_calls,
            stop_reason: outcome.stop_reason,
        })
    }

    /// Re-prompt the model with tool results until it answers without tools.
    ///
    /// At `max_tool_depth` the tools stay declared but `tool_choice` is "none",
    /// so the model has to produce a final answer.
    async fn run_tool_loop(
        &self,
        client: &OpenAIClient,
        mut messages: Vec<ChatMessage>,
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<(StreamOutcome, usize)> {
        let max_depth = self.settings.max_tool_depth;
        let definitions = self.registry.definitions();
        let mut dispatched = 0;
        let mut depth = 0;

        loop {
            let allow_tools = depth < max_depth;
            let outcome = if allow_tools {
                client
                    .generate_stream_with_tools(&messages, &definitions, tx)
                    .await?
            } else {
                debug!(depth, "tool depth reached, asking for a final answer");
                client
                    .generate_stream_final(&messages, &definitions, tx)
                    .await?
            };

            if !allow_tools || outcome.tool_calls.is_empty() {
                return Ok((outcome, dispatched));
            }

            messages.push(ChatMessage::assistant_with_tools(
                outcome.text.clone(),
                outcome.tool_calls.clone(),
            ));
            for call in &outcome.tool_calls {
                let (text, is_error) = self.dispatch_tool(call, depth).await;
                let _ = tx.send(StreamChunk::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    output: text.clone(),
                    is_error,
                });
                messages.push(ChatMessage::tool_result(call.id.clone(), text));
                dispatched += 1;
            }
            depth += 1;
        }
    }

    /// Run one tool call. Every outcome becomes text for the model; nothing here aborts the turn.
    async fn dispatch_tool(&self, call: &ToolCall, depth: usize) -> (String, bool) {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, "model asked for an unknown tool");
            return (
                format!(
                    "{}. Available tools: {}",
                    ToolError::NotFound {
                        name: call.name.clone()
                    },
                    self.registry.names().join(", ")
                ),
                true,
            );
        };

        let ctx = ToolContext::new(depth, call.id.clone());
        match self
            .executor
            .execute(tool, ToolInput::new(call.arguments.clone()), &ctx)
            .await
        {
            Ok(execution) => (execution.result_text(), execution.is_error()),
            Err(e) => (e.to_string(), true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use services::game_bridge::GameBridge;
    use services::knowledge::KnowledgeBase;
    use services::storage::{MemoryStore, StoreError, StoreResult};
    use std::io::{Cursor, Read};
    use std::thread;
    use tokio::sync::mpsc;

    fn sse(payloads: &[serde_json::Value]) -> String {
        let mut body: String = payloads
            .iter()
            .map(|p| format!("data: {}\n\n", p))
            .collect();
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn text_reply(text: &str) -> String {
        sse(&[
            serde_json::json!({"choices": [{"delta": {"content": text}}]}),
            serde_json::json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
        ])
    }

    fn tool_reply(id: &str, name: &str, args: serde_json::Value) -> String {
        sse(&[
            serde_json::json!({"choices": [{"delta": {"tool_calls": [{
                "index": 0,
                "id": id,
                "function": {"name": name, "arguments": args.to_string()}
            }]}}]}),
            serde_json::json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
        ])
    }

    /// Fake vendor: answers requests in order with the given SSE bodies and
    /// returns the request bodies it saw.
    fn fake_vendor(replies: Vec<String>) -> (String, thread::JoinHandle<Vec<serde_json::Value>>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for reply in replies {
                let mut req = server.recv().unwrap();
                let mut body = String::new();
                req.as_reader().read_to_string(&mut body).unwrap();
                seen.push(serde_json::from_str(&body).unwrap());
                let len = reply.len();
                req.respond(tiny_http::Response::new(
                    tiny_http::StatusCode(200),
                    vec!["Content-Type: text/event-stream".parse::<tiny_http::Header>().unwrap()],
                    Cursor::new(reply.into_bytes()),
                    Some(len),
                    None,
                ))
                .unwrap();
            }
            seen
        });
        (format!("http://{}", addr), handle)
    }

    fn host(base_url: &str, max_depth: usize) -> (AgentHost, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let kb = KnowledgeBase::new(store.clone());
        kb.seed().unwrap();
        let registry = default_registry(Arc::new(kb), Arc::new(GameBridge::disconnected()));

        let mut settings = AppSettings::default();
        settings.max_tool_depth = max_depth;
        let route = ChatRoute::Direct {
            model: "gpt-test".into(),
            api_key: "sk-test".into(),
            base_url: base_url.to_string(),
        };
        (
            AgentHost::new(settings, store.clone(), registry).with_route(route),
            store,
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamChunk>) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        while let Ok(c) = rx.try_recv() {
            chunks.push(c);
        }
        chunks
    }

    #[test]
    fn test_build_messages_orders_and_trims() {
        let (mut agent, _) = host("http://unused", 3);
        agent.settings.history_limit = 2;
        let history = vec![
            ChatMessage::user("old"),
            ChatMessage::user("q1"),
            ChatMessage::assistant("a1"),
        ];
        let msgs = agent.build_messages(&history, "now", true);
        let roles: Vec<&str> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(msgs[1].content, "q1");
        assert_eq!(msgs[3].content, "now");
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_results_back() {
        let (base, vendor) = fake_vendor(vec![
            tool_reply("call_1", "search_docs", serde_json::json!({"query": "patrol"})),
            text_reply("Use waypoints."),
        ]);
        let (agent, store) = host(&base, 3);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let reply = agent.chat("How do guards patrol?", tx).await.unwrap();
        assert_eq!(reply.text, "Use waypoints.");
        assert_eq!(reply.tool_calls, 1);
        assert_eq!(reply.route, "direct");

        let requests = vendor.join().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0]["tools"].is_array());
        let second = requests[1]["messages"].as_array().unwrap();
        let tool_msg = second.last().unwrap();
        assert_eq!(tool_msg["role"], "tool");
        assert_eq!(tool_msg["tool_call_id"], "call_1");
        assert!(tool_msg["content"].as_str().unwrap().contains("Patrol routes"));

        let chunks = drain(&mut rx);
        assert!(chunks.iter().any(|c| matches!(
            c,
            StreamChunk::ToolResult { name, is_error: false, .. } if name == "search_docs"
        )));
        assert!(matches!(chunks.last(), Some(StreamChunk::Done { .. })));

        let history = conversation::load_history(store.as_ref()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Use waypoints.");
    }

    #[tokio::test]
    async fn test_depth_bound_forces_final_answer() {
        let (base, vendor) = fake_vendor(vec![
            tool_reply("call_1", "search_docs", serde_json::json!({"query": "quest"})),
            tool_reply("call_2", "search_docs", serde_json::json!({"query": "reward"})),
            text_reply("Done."),
        ]);
        let (agent, _) = host(&base, 2);
        let (tx, _rx) = mpsc::unbounded_channel();

        let reply = agent.chat("quests?", tx).await.unwrap();
        assert_eq!(reply.text, "Done.");
        assert_eq!(reply.tool_calls, 2);

        let requests = vendor.join().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].get("tool_choice").is_none());
        assert_eq!(requests[2]["tool_choice"], "none");
        assert_eq!(requests[2]["messages"].as_array().unwrap().last().unwrap()["role"], "tool");
    }

    #[tokio::test]
    async fn test_zero_depth_is_single_tool_free_round() {
        let (base, vendor) = fake_vendor(vec![text_reply("Straight answer.")]);
        let (agent, _) = host(&base, 0);
        let (tx, _rx) = mpsc::unbounded_channel();

        let reply = agent.chat("just answer", tx).await.unwrap();
        assert_eq!(reply.text, "Straight answer.");
        assert_eq!(reply.tool_calls, 0);

        let requests = vendor.join().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0]["tools"].is_array());
        assert_eq!(requests[0]["tool_choice"], "none");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let (base, vendor) = fake_vendor(vec![
            tool_reply("call_9", "summon_dragon", serde_json::json!({})),
            text_reply("I can't do that."),
        ]);
        let (agent, _) = host(&base, 3);
        let (tx, _rx) = mpsc::unbounded_channel();

        agent.chat("summon a dragon", tx).await.unwrap();
        let requests = vendor.join().unwrap();
        let tool_msg = requests[1]["messages"].as_array().unwrap().last().unwrap().clone();
        let content = tool_msg["content"].as_str().unwrap();
        assert!(content.starts_with("Unknown tool: summon_dragon. Available tools: "));
        assert!(content.contains("search_docs"));
    }

    #[tokio::test]
    async fn test_proxy_route_streams_without_tools() {
        let (base, vendor) = fake_vendor(vec![text_reply("Hello from the proxy.")]);
        let (agent, _) = host("http://unused", 3);
        let agent = agent.with_route(ChatRoute::Proxy {
            model: "gpt-test".into(),
            proxy_url: base,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let reply = agent.chat("hi", tx).await.unwrap();
        assert_eq!(reply.route, "proxy");
        assert_eq!(reply.text, "Hello from the proxy.");

        let requests = vendor.join().unwrap();
        assert!(requests[0].get("tools").is_none());
        let system = requests[0]["messages"][0]["content"].as_str().unwrap();
        assert!(!system.contains("search_docs"));
        assert_eq!(drain(&mut rx)[0], StreamChunk::Text("Hello from the proxy.".into()));
    }

    #[tokio::test]
    async fn test_http_failure_reports_error_and_keeps_history_clean() {
        let (agent, store) = host("http://127.0.0.1:1", 3);
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(agent.chat("hello?", tx).await.is_err());
        assert!(matches!(drain(&mut rx).last(), Some(StreamChunk::Error(_))));
        assert!(conversation::load_history(store.as_ref()).unwrap().is_empty());
    }

    /// Store whose history cannot be read, or cannot be written.
    struct BrokenStore {
        fail_reads: bool,
    }

    impl KeyValueStore for BrokenStore {
        fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
            if self.fail_reads {
                return Err(StoreError::Io {
                    path: key.into(),
                    source: std::io::Error::other("disk gone"),
                });
            }
            Ok(None)
        }
        fn set(&self, key: &str, _value: serde_json::Value) -> StoreResult<()> {
            Err(StoreError::Io {
                path: key.into(),
                source: std::io::Error::other("read-only"),
            })
        }
        fn remove(&self, _key: &str) -> StoreResult<()> {
            Ok(())
        }
        fn keys(&self) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn host_on(store: BrokenStore, base_url: &str) -> AgentHost {
        let (agent, _) = host(base_url, 3);
        AgentHost::new(agent.settings.clone(), Arc::new(store), ToolRegistry::new())
            .with_route(agent.route())
    }

    #[tokio::test]
    async fn test_unreadable_history_reports_error() {
        let agent = host_on(BrokenStore { fail_reads: true }, "http://unused");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = agent.chat("hello", tx).await.unwrap_err();
        assert!(err.to_string().contains("disk gone"));
        let chunks = drain(&mut rx);
        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], StreamChunk::Error(m) if m.contains("disk gone")));
    }

    #[tokio::test]
    async fn test_unsaved_turn_reports_error_instead_of_done() {
        let (base, vendor) = fake_vendor(vec![text_reply("Answer.")]);
        let agent = host_on(BrokenStore { fail_reads: false }, &base);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = agent.chat("hello", tx).await.unwrap_err();
        assert!(err.to_string().contains("read-only"));
        vendor.join().unwrap();

        let chunks = drain(&mut rx);
        assert_eq!(chunks[0], StreamChunk::Text("Answer.".into()));
        assert!(matches!(chunks.last(), Some(StreamChunk::Error(_))));
        assert!(!chunks.iter().any(|c| matches!(c, StreamChunk::Done { .. })));
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let (agent, _) = host("http://unused", 3);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(agent.chat("   ", tx).await.is_err());
    }
}
