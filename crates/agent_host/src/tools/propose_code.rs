//! Canned code proposals rendered from the template catalogue.

use anyhow::Result;
use async_trait::async_trait;
use services::templates::{self, template_ids};
use shared::tool::{Tool, ToolContext, ToolError, ToolInput, ToolOutput};

pub struct ProposeCodeTool;

#[async_trait]
impl Tool for ProposeCodeTool {
    fn name(&self) -> &'static str {
        "propose_code"
    }

    fn description(&self) -> &'static str {
        "Produce a ready-to-adapt JavaScript snippet for a common NPC behaviour from a template."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "template": {
                    "type": "string",
                    "enum": template_ids(),
                    "description": "Which snippet to generate"
                },
                "npc_name": {
                    "type": "string",
                    "description": "Display name of the NPC the code is for"
                }
            },
            "required": ["template"]
        })
    }

    fn validate_input(&self, input: &ToolInput) -> Result<(), ToolError> {
        input.require_str("template").map(|_| ())
    }

    async fn execute(&self, input: ToolInput, _ctx: &ToolContext) -> Result<ToolOutput> {
        let template = input.require_str("template")?;
        let npc_name = input.str_arg("npc_name").unwrap_or("");

        let proposal = match templates::render(template, npc_name) {
            Ok(p) => p,
            // Unknown template: tell the model which ones exist
            Err(e) => return Ok(ToolOutput::error(e.to_string())),
        };

        let text = format!(
            "Proposed {} code ({}):\n```{}\n{}```",
            proposal.language, proposal.template, proposal.language, proposal.code
        );
        Ok(ToolOutput::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_renders_named_template() {
        let input = ToolInput::new(serde_json::json!({
            "template": "state_machine",
            "npc_name": "gate warden"
        }));
        let output = ProposeCodeTool
            .execute(input, &ToolContext::new(0, "call_1"))
            .await
            .unwrap();
        assert!(!output.is_error);
        assert!(output.text.contains("class GateWardenBrain"));
        assert!(output.text.starts_with("Proposed javascript code (state_machine)"));
    }

    #[tokio::test]
    async fn test_unknown_template_is_reported_not_raised() {
        let input = ToolInput::new(serde_json::json!({"template": "dragon"}));
        let output = ProposeCodeTool
            .execute(input, &ToolContext::new(0, "call_1"))
            .await
            .unwrap();
        assert!(output.is_error);
        assert!(output.text.contains("dialogue_tree"));
    }

    #[test]
    fn test_schema_lists_templates() {
        let params = ProposeCodeTool.parameters();
        assert_eq!(params["properties"]["template"]["enum"].as_array().unwrap().len(), 5);
    }
}
