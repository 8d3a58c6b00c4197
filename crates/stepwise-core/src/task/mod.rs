//! Task management system
//!
//! A plan is an ordered list of [`TodoItem`]s produced once per user request.
//! The task system handles:
//! - Plan generation ([`Planner`], [`ModelPlanner`])
//! - Plan progress and outcome recording ([`TaskStateManager`])

mod planner;
mod state;

pub use planner::{
    validate_plan, Complexity, ModelPlanner, PlanResult, Planner, PLANNING_SYSTEM_PROMPT,
};
pub use state::{StateSnapshot, TaskStateManager};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique task identifier within a plan
pub type TaskId = String;

/// Current status of a task
///
/// Transitions are monotone: `Pending -> InProgress -> {Completed, Failed}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TodoStatus {
    /// Completed or failed; no further transitions allowed
    pub fn is_final(&self) -> bool {
        matches!(self, TodoStatus::Completed | TodoStatus::Failed)
    }
}

/// One unit of work in a plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TodoItem {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Advisory only; tasks always run in plan order
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TodoItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            dependencies: Vec::new(),
            status: TodoStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn with_dependency(mut self, task_id: impl Into<String>) -> Self {
        self.dependencies.push(task_id.into());
        self
    }
}

/// Action recorded for a file touched by a creation or edit tool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Created,
    Modified,
}

/// A file created or modified while executing a task (advisory)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub action: FileAction,
}

/// Output of a successful task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOutput {
    pub result: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<FileChange>,
}

impl TaskOutput {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            files_changed: Vec::new(),
        }
    }
}

/// Error information of a failed attempt or a permanently failed task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// One recorded task outcome, used to build later prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonically increasing, starting at 1 for each plan
    pub step: usize,
    pub task_id: TaskId,
    pub task_title: String,
    pub status: TodoStatus,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

/// Summary of one `execute()` run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSummary {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub total_steps: usize,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<FileChange>,
}
