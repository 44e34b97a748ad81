//! Async tool execution wrapper.
//!
//! Provides timeout handling and event reporting for tool calls issued by the
//! model during the tool loop.

use shared::events::ToolEvent;
use shared::tool::{Tool, ToolContext, ToolError, ToolExecution, ToolInput};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default execution timeout (15 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Tool executor with timeout and event reporting.
pub struct ToolExecutor {
    /// Default timeout for tool execution
    default_timeout: Duration,
    /// Channel for sending tool events
    event_sender: Option<mpsc::UnboundedSender<ToolEvent>>,
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            event_sender: None,
        }
    }

    pub fn with_events(event_sender: mpsc::UnboundedSender<ToolEvent>) -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            event_sender: Some(event_sender),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Execute a tool with timeout handling.
    ///
    /// Invalid input is the only `Err`; failures and timeouts come back as an
    /// execution record so the loop can report them to the model.
    pub async fn execute(
        &self,
        tool: &Arc<dyn Tool>,
        input: ToolInput,
        ctx: &ToolContext,
    ) -> Result<ToolExecution, ToolError> {
        let tool_name = tool.name().to_string();
        let execution = ToolExecution::new(&tool_name, input.clone());
        let execution_id = execution.id;

        tool.validate_input(&input)?;

        self.send_event(ToolEvent::Started {
            execution_id,
            tool_name: tool_name.clone(),
            depth: ctx.depth,
        });

        let start = Instant::now();
        let result = tokio::time::timeout(self.default_timeout, tool.execute(input, ctx)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(output)) => {
                debug!(tool = %tool_name, duration_ms, "tool completed");
                self.send_event(ToolEvent::Completed {
                    execution_id,
                    duration_ms,
                });
                Ok(execution.complete(output, duration_ms))
            }
            Ok(Err(e)) => {
                let error_msg = ToolError::ExecutionFailed(e).to_string();
                warn!(tool = %tool_name, error = %error_msg, "tool failed");
                self.send_event(ToolEvent::Failed {
                    execution_id,
                    error: error_msg.clone(),
                    duration_ms,
                });
                Ok(execution.fail(error_msg, duration_ms))
            }
            Err(_) => {
                warn!(tool = %tool_name, duration_ms, "tool timed out");
                self.send_event(ToolEvent::Timeout {
                    execution_id,
                    duration_ms,
                });
                Ok(execution.timeout(duration_ms))
            }
        }
    }

    fn send_event(&self, event: ToolEvent) {
        if let Some(ref sender) = self.event_sender {
            // Ignore send errors (receiver may have dropped)
            let _ = sender.send(event);
        }
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}
