//! Tool types and traits for model-directed function calls.
//!
//! A tool is a small client-side function the model can ask for by name.
//! Its output is fed back into the conversation as a `tool` message.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_api::ToolDefinition;

/// Tool execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Timeout,
}

/// Arguments decoded from the model's tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub arguments: serde_json::Value,
}

impl ToolInput {
    pub fn new(arguments: serde_json::Value) -> Self {
        Self { arguments }
    }

    /// String argument, trimmed; empty strings count as missing.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn require_str(&self, key: &str) -> Result<&str, ToolError> {
        self.str_arg(key).ok_or_else(|| ToolError::InvalidInput {
            message: format!("missing required argument '{}'", key),
        })
    }

    pub fn usize_arg(&self, key: &str) -> Option<usize> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
    }
}

/// Output from a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text handed back to the model
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            text: message.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            text: message.into(),
            is_error: true,
        }
    }
}

/// Per-call context
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Round of the tool loop that issued this call (0-based)
    pub depth: usize,
    /// The model's id for this call
    pub call_id: String,
}

impl ToolContext {
    pub fn new(depth: usize, call_id: impl Into<String>) -> Self {
        Self {
            depth,
            call_id: call_id.into(),
        }
    }
}

/// Record of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: Uuid,
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
    pub input: ToolInput,
    pub output: Option<ToolOutput>,
    pub status: ExecutionStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl ToolExecution {
    pub fn new(tool_name: impl Into<String>, input: ToolInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            timestamp: Utc::now(),
            input,
            output: None,
            status: ExecutionStatus::Running,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn complete(mut self, output: ToolOutput, duration_ms: u64) -> Self {
        self.status = ExecutionStatus::Completed;
        self.output = Some(output);
        self.duration_ms = duration_ms;
        self
    }

    pub fn fail(mut self, error: impl Into<String>, duration_ms: u64) -> Self {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.duration_ms = duration_ms;
        self
    }

    pub fn timeout(mut self, duration_ms: u64) -> Self {
        self.status = ExecutionStatus::Timeout;
        self.error = Some(ToolError::Timeout { duration_ms }.to_string());
        self.duration_ms = duration_ms;
        self
    }

    /// Text fed back to the model for this execution, whatever its outcome.
    pub fn result_text(&self) -> String {
        match (&self.output, &self.error) {
            (Some(output), _) => output.text.clone(),
            (None, Some(error)) => format!("Tool '{}' failed: {}", self.tool_name, error),
            (None, None) => format!("Tool '{}' produced no output", self.tool_name),
        }
    }

    pub fn is_error(&self) -> bool {
        match self.status {
            ExecutionStatus::Completed => self.output.as_ref().is_some_and(|o| o.is_error),
            _ => true,
        }
    }
}

/// Core tool trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call this tool (snake_case)
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> serde_json::Value;

    async fn execute(&self, input: ToolInput, ctx: &ToolContext) -> anyhow::Result<ToolOutput>;

    /// Optional: Validate input before execution
    fn validate_input(&self, _input: &ToolInput) -> Result<(), ToolError> {
        Ok(())
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Tool error types
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    NotFound { name: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(#[from] anyhow::Error),

    #[error("Execution timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_arg_trims_and_rejects_blank() {
        let input = ToolInput::new(serde_json::json!({"query": "  patrol ", "blank": "  "}));
        assert_eq!(input.str_arg("query"), Some("patrol"));
        assert_eq!(input.str_arg("blank"), None);
        assert!(matches!(
            input.require_str("missing"),
            Err(ToolError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_execution_result_text() {
        let input = ToolInput::new(serde_json::json!({}));
        let done = ToolExecution::new("search_docs", input.clone())
            .complete(ToolOutput::text("found 2"), 3);
        assert_eq!(done.result_text(), "found 2");
        assert!(!done.is_error());

        let failed = ToolExecution::new("search_docs", input.clone()).fail("boom", 1);
        assert!(failed.result_text().contains("boom"));
        assert!(failed.is_error());

        let timed_out = ToolExecution::new("game_action", input).timeout(10);
        assert_eq!(timed_out.status, ExecutionStatus::Timeout);
        assert_eq!(
            timed_out.result_text(),
            "Tool 'game_action' failed: Execution timed out after 10ms"
        );
        assert!(timed_out.is_error());
    }
}
