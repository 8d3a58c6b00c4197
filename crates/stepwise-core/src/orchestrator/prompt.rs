//! Per-attempt prompt assembly
//!
//! Each task attempt appends one user turn built from an [`LlmInput`]: the
//! current task, recent completions, the last step result, a slice of the
//! history and, when retrying, the previous error.

use serde::{Deserialize, Serialize};

use crate::config::OrchestratorConfig;
use crate::formatting::{format_todo_overview, truncate_str};
use crate::task::{HistoryEntry, TaskFailure, TaskStateManager, TodoItem};

/// Longest previous step result quoted in a prompt
const LAST_RESULT_CHARS: usize = 2_000;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an autonomous coding agent working through a plan one task at a time.

For every task:
- Use the available tools to inspect and change the project. Never guess file contents; read them first.
- Keep changes minimal and focused on the task you were given.
- When a tool fails, read the error and fix the cause instead of repeating the same call.
- When the task is done, reply with a short summary of what you changed and stop.

Each user message describes the current task, the progress of the plan and, when a previous attempt failed, the error you must fix."#;

/// Error context attached to a retry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugContext {
    /// 1-based retry number
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: TaskFailure,
}

/// Everything the model sees about the plan for one attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInput {
    pub task: TodoItem,
    pub todos: Vec<TodoItem>,
    /// Most recent completed tasks, oldest first
    pub completed_tasks: Vec<TodoItem>,
    pub next_task: Option<TodoItem>,
    pub last_step_result: Option<String>,
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugContext>,
}

impl LlmInput {
    pub fn build(
        state: &TaskStateManager,
        task: &TodoItem,
        debug: Option<DebugContext>,
        config: &OrchestratorConfig,
    ) -> Self {
        let completed = state.completed_tasks();
        let skip = completed.len().saturating_sub(config.recent_tasks_in_prompt);

        Self {
            task: task.clone(),
            todos: state.todos().to_vec(),
            completed_tasks: completed.into_iter().skip(skip).cloned().collect(),
            next_task: state.todos().get(state.current_step() + 1).cloned(),
            last_step_result: state.last_step_result().map(str::to_string),
            history: state.history_for_llm(config.history_entries_in_prompt).to_vec(),
            debug,
        }
    }

    /// Render the user turn sent to the model
    pub fn render(&self) -> String {
        let mut sections = Vec::new();

        sections.push(format!("## Plan Progress\n{}", format_todo_overview(&self.todos)));

        if !self.completed_tasks.is_empty() {
            let titles: Vec<String> = self
                .completed_tasks
                .iter()
                .map(|t| format!("- {}", t.title))
                .collect();
            sections.push(format!("## Already Completed\n{}", titles.join("\n")));
        }

        let mut current = format!(
            "## Current Task\nID: {}\nTitle: {}",
            self.task.id, self.task.title
        );
        if !self.task.description.is_empty() {
            current.push_str(&format!("\nDescription: {}", self.task.description));
        }
        if !self.task.dependencies.is_empty() {
            current.push_str(&format!("\nDepends on: {}", self.task.dependencies.join(", ")));
        }
        sections.push(current);

        if let Some(result) = &self.last_step_result {
            sections.push(format!(
                "## Previous Step Result\n{}",
                truncate_str(result, LAST_RESULT_CHARS)
            ));
        }

        if !self.history.is_empty() {
            let lines: Vec<String> = self
                .history
                .iter()
                .map(|h| {
                    format!(
                        "Step {} [{}] {} ({:?}): {}",
                        h.step, h.task_id, h.task_title, h.status, h.summary
                    )
                })
                .collect();
            sections.push(format!("## Recent History\n{}", lines.join("\n")));
        }

        if let Some(debug) = &self.debug {
            let mut block = format!(
                "## Debug Attempt {} of {}\nThe previous attempt failed.\nError: {}",
                debug.attempt, debug.max_attempts, debug.error.message
            );
            if let Some(details) = &debug.error.details {
                block.push_str(&format!("\nDetails:\n{}", details));
            }
            block.push_str("\nFind the cause, fix it and complete the task.");
            sections.push(block);
        }

        if let Some(next) = &self.next_task {
            sections.push(format!("## Up Next (do not start yet)\n[{}] {}", next.id, next.title));
        }

        sections.push(
            "Focus ONLY on the current task. Complete it with the tools, reply with a short \
             summary of what you did, then stop."
                .to_string(),
        );

        sections.join("\n\n")
    }
}
