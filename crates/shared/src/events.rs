//! Event types for tool execution status updates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tool execution event for real-time status updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolEvent {
    /// Tool execution started
    Started {
        execution_id: Uuid,
        tool_name: String,
        depth: usize,
    },
    /// Tool execution completed successfully
    Completed {
        execution_id: Uuid,
        duration_ms: u64,
    },
    /// Tool execution failed
    Failed {
        execution_id: Uuid,
        error: String,
        duration_ms: u64,
    },
    /// Tool execution timed out
    Timeout {
        execution_id: Uuid,
        duration_ms: u64,
    },
}

impl ToolEvent {
    pub fn execution_id(&self) -> Uuid {
        match self {
            ToolEvent::Started { execution_id, .. } => *execution_id,
            ToolEvent::Completed { execution_id, .. } => *execution_id,
            ToolEvent::Failed { execution_id, .. } => *execution_id,
            ToolEvent::Timeout { execution_id, .. } => *execution_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ToolEvent::Started { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_id_and_terminal() {
        let id = Uuid::new_v4();
        let started = ToolEvent::Started {
            execution_id: id,
            tool_name: "search_docs".into(),
            depth: 0,
        };
        let failed = ToolEvent::Failed {
            execution_id: id,
            error: "nope".into(),
            duration_ms: 4,
        };
        assert_eq!(started.execution_id(), id);
        assert!(!started.is_terminal());
        assert!(failed.is_terminal());
    }
}
