//! Tool registry for model-directed function calls.
//!
//! The registry owns every tool the model may call by name and hands out
//! their definitions for each tool-calling request.

use std::collections::BTreeMap;
use std::sync::Arc;

use services::game_bridge::GameBridge;
use services::knowledge::KnowledgeBase;
use shared::agent_api::ToolDefinition;
use shared::tool::Tool;

pub mod game_action;
pub mod propose_code;
pub mod search_docs;

pub use game_action::GameActionTool;
pub use propose_code::ProposeCodeTool;
pub use search_docs::SearchDocsTool;

/// Registry managing all available tools
#[derive(Default)]
pub struct ToolRegistry {
    /// Ordered by name so definitions are sent in a stable order
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The three built-in tools: document search, code templates and game actions.
pub fn default_registry(knowledge: Arc<KnowledgeBase>, bridge: Arc<GameBridge>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SearchDocsTool::new(knowledge)));
    registry.register(Arc::new(ProposeCodeTool));
    registry.register(Arc::new(GameActionTool::new(bridge)));
    registry
}
