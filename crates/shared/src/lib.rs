pub mod events;
pub mod tool;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::env;

    pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8787";

    fn default_max_tool_depth() -> usize {
        5
    }

    fn default_history_limit() -> usize {
        20
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct ProviderAuth {
        pub api_key: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ModelProvider {
        pub openai_model: String, // e.g., "gpt-4o-mini"
        pub openai_auth: ProviderAuth,
        /// Override for the vendor endpoint (OpenAI-compatible servers)
        pub openai_base_url: Option<String>,
        /// Where keyless clients send their requests
        pub proxy_url: Option<String>,
    }

    impl Default for ModelProvider {
        fn default() -> Self {
            Self {
                openai_model: "gpt-4o-mini".into(),
                openai_auth: ProviderAuth::default(),
                openai_base_url: None,
                proxy_url: Some(DEFAULT_PROXY_URL.into()),
            }
        }
    }

    /// Where game actions are delivered
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct GameSettings {
        /// e.g. "ws://127.0.0.1:9001/npc"
        pub websocket_url: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        #[serde(default)]
        pub model: ModelProvider,
        #[serde(default)]
        pub game: GameSettings,
        /// Upper bound on model → tool → model round trips per user turn
        #[serde(default = "default_max_tool_depth")]
        pub max_tool_depth: usize,
        /// Number of stored messages replayed into each request
        #[serde(default = "default_history_limit")]
        pub history_limit: usize,
        /// Replaces the built-in system prompt when set
        #[serde(default)]
        pub system_prompt: Option<String>,
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                model: ModelProvider::default(),
                game: GameSettings::default(),
                max_tool_depth: default_max_tool_depth(),
                history_limit: default_history_limit(),
                system_prompt: None,
            }
        }
    }

    impl AppSettings {
        /// The configured key, falling back to `OPENAI_API_KEY`. Blank keys count as missing.
        pub fn api_key(&self) -> Option<String> {
            self.model
                .openai_auth
                .api_key
                .clone()
                .or_else(|| env::var("OPENAI_API_KEY").ok())
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        }

        pub fn proxy_url(&self) -> &str {
            self.model
                .proxy_url
                .as_deref()
                .unwrap_or(DEFAULT_PROXY_URL)
        }
    }

}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    /// A tool invocation requested by the model
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ToolCall {
        pub id: String,
        pub name: String,
        pub arguments: serde_json::Value,
    }

    /// Function-calling tool definition sent with each request
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ToolDefinition {
        pub name: String,
        pub description: String,
        pub parameters: serde_json::Value,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant" | "tool"
        pub content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tool_calls: Option<Vec<ToolCall>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tool_call_id: Option<String>,
    }

    impl ChatMessage {
        fn plain(role: &str, content: impl Into<String>) -> Self {
            Self {
                role: role.to_string(),
                content: content.into(),
                tool_calls: None,
                tool_call_id: None,
            }
        }

        pub fn system(content: impl Into<String>) -> Self {
            Self::plain("system", content)
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self::plain("user", content)
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self::plain("assistant", content)
        }

        /// Assistant turn that requested tools; must precede the matching tool results.
        pub fn assistant_with_tools(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
            Self {
                tool_calls: Some(calls),
                ..Self::plain("assistant", content)
            }
        }

        pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
            Self {
                tool_call_id: Some(tool_call_id.into()),
                ..Self::plain("tool", content)
            }
        }
    }

    /// Incremental output delivered to whatever surface renders the chat
    #[derive(Debug, Clone, PartialEq)]
    pub enum StreamChunk {
        Text(String),
        ToolUseStart {
            id: String,
            name: String,
        },
        ToolInputDelta(String),
        ToolUseComplete {
            id: String,
            name: String,
            input: serde_json::Value,
        },
        ToolResult {
            id: String,
            name: String,
            output: String,
            is_error: bool,
        },
        Done {
            stop_reason: Option<String>,
        },
        Error(String),
    }
}
