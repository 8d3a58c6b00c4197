//! Observer events emitted during a run

use serde::{Deserialize, Serialize};

use crate::task::{Complexity, ExecutionSummary, TaskId, TodoItem};

/// Events sent to the host while [`super::Orchestrator::execute`] runs
///
/// Tagged with a `type` field so a host can stream them as NDJSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// The planner produced a non-empty plan
    PlanCreated {
        todos: Vec<TodoItem>,
        complexity: Complexity,
    },
    TodoStarted {
        task_id: TaskId,
        title: String,
    },
    TodoCompleted {
        task_id: TaskId,
        result: String,
    },
    /// A task failed permanently; no further tasks run
    TodoFailed {
        task_id: TaskId,
        error: String,
    },
    /// A retry is about to start with the previous error attached
    DebugStarted {
        task_id: TaskId,
        attempt: u32,
        error: String,
    },
    /// The conversation was replaced by a compacted summary
    ContextCompacted {
        original_message_count: usize,
        chars_before: usize,
        chars_after: usize,
    },
    ExecutionCompleted {
        summary: ExecutionSummary,
    },
    /// Planning failed (no summary) or a task failed permanently
    ExecutionFailed {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<ExecutionSummary>,
    },
}
