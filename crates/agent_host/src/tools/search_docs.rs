//! Keyword search over the built-in NPC design notes.

use anyhow::Result;
use async_trait::async_trait;
use services::knowledge::{format_matches, KnowledgeBase};
use shared::tool::{Tool, ToolContext, ToolError, ToolInput, ToolOutput};
use std::sync::Arc;

const DEFAULT_LIMIT: usize = 3;
const MAX_LIMIT: usize = 10;

pub struct SearchDocsTool {
    knowledge: Arc<KnowledgeBase>,
}

impl SearchDocsTool {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl Tool for SearchDocsTool {
    fn name(&self) -> &'static str {
        "search_docs"
    }

    fn description(&self) -> &'static str {
        "Search the NPC design notes (dialogue, patrols, state machines, behaviour trees, \
         pathfinding, shops, quests, barks, memory) by keyword."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords to look for"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of documents (default 3)"
                }
            },
            "required": ["query"]
        })
    }

    fn validate_input(&self, input: &ToolInput) -> Result<(), ToolError> {
        input.require_str("query").map(|_| ())
    }

    async fn execute(&self, input: ToolInput, _ctx: &ToolContext) -> Result<ToolOutput> {
        let query = input.require_str("query")?;
        let limit = input
            .usize_arg("limit")
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);

        let matches = self.knowledge.search(query, limit)?;
        Ok(ToolOutput::text(format_matches(query, &matches)))
    }
}
