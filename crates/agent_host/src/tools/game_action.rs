//! Sends an NPC action to the running game.

use anyhow::Result;
use async_trait::async_trait;
use services::game_bridge::{GameAction, GameBridge, ALLOWED_ACTIONS};
use shared::tool::{Tool, ToolContext, ToolError, ToolInput, ToolOutput};
use std::sync::Arc;
use tracing::info;

pub struct GameActionTool {
    bridge: Arc<GameBridge>,
}

impl GameActionTool {
    pub fn new(bridge: Arc<GameBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Tool for GameActionTool {
    fn name(&self) -> &'static str {
        "game_action"
    }

    fn description(&self) -> &'static str {
        "Make an NPC in the running game act: move, speak, emote, give an item, follow, attack or idle."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ALLOWED_ACTIONS,
                },
                "target": {
                    "type": "string",
                    "description": "NPC id or name the action applies to"
                },
                "payload": {
                    "type": "object",
                    "description": "Action details, e.g. {\"text\": \"Hello\"} for say or {\"x\": 1, \"y\": 2} for move_to"
                }
            },
            "required": ["action"]
        })
    }

    fn validate_input(&self, input: &ToolInput) -> Result<(), ToolError> {
        input.require_str("action").map(|_| ())
    }

    async fn execute(&self, input: ToolInput, ctx: &ToolContext) -> Result<ToolOutput> {
        let verb = input.require_str("action")?;
        let target = input.str_arg("target").map(str::to_string);
        let payload = input
            .arguments
            .get("payload")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let action = match GameAction::new(verb, target, payload) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutput::error(e.to_string())),
        };

        self.bridge.dispatch(&action).await?;
        info!(
            action = %action.action,
            target = action.target.as_deref().unwrap_or("-"),
            call_id = %ctx.call_id,
            "game action dispatched"
        );

        let who = action.target.as_deref().unwrap_or("the NPC");
        Ok(ToolOutput::text(format!(
            "Sent '{}' to {} via {}.",
            action.action,
            who,
            self.bridge.describe()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_dispatches_to_host() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tool = GameActionTool::new(Arc::new(GameBridge::host(tx)));
        let input = ToolInput::new(serde_json::json!({
            "action": "say",
            "target": "blacksmith",
            "payload": {"text": "Fine steel today!"}
        }));

        let output = tool.execute(input, &ToolContext::new(0, "call_1")).await.unwrap();
        assert!(!output.is_error);
        assert!(output.text.contains("blacksmith"));

        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.action, "say");
        assert_eq!(sent.payload["text"], "Fine steel today!");
    }

    #[tokio::test]
    async fn test_unsupported_verb_is_reported() {
        let tool = GameActionTool::new(Arc::new(GameBridge::disconnected()));
        let input = ToolInput::new(serde_json::json!({"action": "teleport"}));
        let output = tool.execute(input, &ToolContext::new(0, "call_1")).await.unwrap();
        assert!(output.is_error);
        assert!(output.text.contains("Unsupported"));
    }

    #[tokio::test]
    async fn test_disconnected_bridge_fails() {
        let tool = GameActionTool::new(Arc::new(GameBridge::disconnected()));
        let input = ToolInput::new(serde_json::json!({"action": "idle"}));
        assert!(tool.execute(input, &ToolContext::new(0, "call_1")).await.is_err());
    }
}
