//! Task state manager - the single source of truth for plan progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::formatting::truncate_str;

use super::{HistoryEntry, TaskFailure, TaskOutput, TodoItem, TodoStatus};

/// Longest summary stored in a history entry
const HISTORY_SUMMARY_CHARS: usize = 500;

/// Owns the plan, the step cursor and the recorded outcomes of one run
#[derive(Debug, Default)]
pub struct TaskStateManager {
    todos: Vec<TodoItem>,
    current_step: usize,
    history: Vec<HistoryEntry>,
    last_step_result: Option<String>,
    execution_started: bool,
    started_at: Option<DateTime<Utc>>,
    debug_mode: bool,
    debug_count: u32,
}

/// Serializable view of the manager for hosts and observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub todos: Vec<TodoItem>,
    pub current_step: usize,
    pub total_steps: usize,
    pub history: Vec<HistoryEntry>,
    pub execution_started: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub debug_mode: bool,
    pub debug_count: u32,
}

impl TaskStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new plan; clears everything recorded for the previous one
    pub fn set_plan(&mut self, todos: Vec<TodoItem>) {
        debug!(tasks = todos.len(), "Plan set");
        self.todos = todos;
        self.current_step = 0;
        self.history.clear();
        self.last_step_result = None;
        self.execution_started = false;
        self.started_at = None;
        self.debug_mode = false;
        self.debug_count = 0;
    }

    /// Mark execution as begun. Calling it again within a run has no effect.
    pub fn start_execution(&mut self) {
        if !self.execution_started {
            self.execution_started = true;
            self.started_at = Some(Utc::now());
        }
    }

    pub fn has_more_steps(&self) -> bool {
        self.current_step < self.todos.len()
    }

    /// Task at the cursor, or `None` once the plan is exhausted
    pub fn current_task(&self) -> Option<&TodoItem> {
        self.todos.get(self.current_step)
    }

    /// Advance the cursor by one. Task status is not touched.
    pub fn next_step(&mut self) {
        if self.current_step < self.todos.len() {
            self.current_step += 1;
        }
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Move a pending task to in-progress
    pub fn mark_in_progress(&mut self, task_id: &str) -> Result<()> {
        let todo = self.find_mut(task_id)?;
        match todo.status {
            TodoStatus::Pending => {
                todo.status = TodoStatus::InProgress;
                Ok(())
            }
            TodoStatus::InProgress => Ok(()),
            _ => Err(Error::Task(format!("Task {} is already finished", task_id))),
        }
    }

    /// Record a successful task outcome and append a history entry
    pub fn record_success(&mut self, task_id: &str, output: &TaskOutput) -> Result<()> {
        let todo = self.find_mut(task_id)?;
        if todo.status.is_final() {
            return Err(Error::Task(format!("Task {} is already finished", task_id)));
        }
        todo.status = TodoStatus::Completed;
        todo.result = Some(output.result.clone());
        let title = todo.title.clone();

        self.push_history(task_id, title, TodoStatus::Completed, &output.result);
        self.last_step_result = Some(output.result.clone());
        self.debug_mode = false;
        Ok(())
    }

    /// Record a permanent task failure and append a history entry
    pub fn record_failure(&mut self, task_id: &str, failure: &TaskFailure) -> Result<()> {
        let todo = self.find_mut(task_id)?;
        if todo.status.is_final() {
            return Err(Error::Task(format!("Task {} is already finished", task_id)));
        }
        todo.status = TodoStatus::Failed;
        todo.error = Some(failure.message.clone());
        let title = todo.title.clone();

        self.push_history(task_id, title, TodoStatus::Failed, &failure.message);
        self.debug_mode = false;
        Ok(())
    }

    /// Flag the manager as repairing the current task. The cursor is not moved.
    pub fn enter_debug_mode(&mut self) {
        self.debug_mode = true;
        self.debug_count += 1;
    }

    pub fn is_debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn todos(&self) -> &[TodoItem] {
        &self.todos
    }

    pub fn completed_tasks(&self) -> Vec<&TodoItem> {
        self.todos
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .collect()
    }

    pub fn last_step_result(&self) -> Option<&str> {
        self.last_step_result.as_deref()
    }

    /// The full outcome history, oldest first
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The most recent `limit` history entries, oldest first
    pub fn history_for_llm(&self, limit: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            todos: self.todos.clone(),
            current_step: self.current_step,
            total_steps: self.todos.len(),
            history: self.history.clone(),
            execution_started: self.execution_started,
            started_at: self.started_at,
            debug_mode: self.debug_mode,
            debug_count: self.debug_count,
        }
    }

    fn find_mut(&mut self, task_id: &str) -> Result<&mut TodoItem> {
        self.todos
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| Error::Task(format!("Unknown task: {}", task_id)))
    }

    fn push_history(&mut self, task_id: &str, title: String, status: TodoStatus, summary: &str) {
        self.history.push(HistoryEntry {
            step: self.history.len() + 1,
            task_id: task_id.to_string(),
            task_title: title,
            status,
            summary: truncate_str(summary, HISTORY_SUMMARY_CHARS),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> Vec<TodoItem> {
        vec![
            TodoItem::new("1", "First", "do the first thing"),
            TodoItem::new("2", "Second", "do the second thing"),
        ]
    }

    #[test]
    fn test_set_plan_resets_cursor() {
        let mut state = TaskStateManager::new();
        state.set_plan(plan());
        state.next_step();
        assert_eq!(state.current_step(), 1);

        state.set_plan(plan());
        assert_eq!(state.current_step(), 0);
        assert_eq!(state.current_task().map(|t| t.id.as_str()), Some("1"));
    }

    #[test]
    fn test_cursor_walks_plan() {
        let mut state = TaskStateManager::new();
        state.set_plan(plan());

        assert!(state.has_more_steps());
        state.next_step();
        assert_eq!(state.current_task().unwrap().id, "2");
        state.next_step();
        assert!(!state.has_more_steps());
        assert!(state.current_task().is_none());

        // Advancing past the end is a no-op
        state.next_step();
        assert_eq!(state.current_step(), 2);
    }

    #[test]
    fn test_record_success() {
        let mut state = TaskStateManager::new();
        state.set_plan(plan());
        state.mark_in_progress("1").unwrap();
        state.record_success("1", &TaskOutput::new("done")).unwrap();

        let todo = &state.todos()[0];
        assert_eq!(todo.status, TodoStatus::Completed);
        assert_eq!(todo.result.as_deref(), Some("done"));
        assert_eq!(state.last_step_result(), Some("done"));
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history()[0].step, 1);
        assert_eq!(state.completed_tasks().len(), 1);
    }

    #[test]
    fn test_record_failure() {
        let mut state = TaskStateManager::new();
        state.set_plan(plan());
        state
            .record_failure("2", &TaskFailure::new("boom").with_details("trace"))
            .unwrap();

        let todo = &state.todos()[1];
        assert_eq!(todo.status, TodoStatus::Failed);
        assert_eq!(todo.error.as_deref(), Some("boom"));
        assert_eq!(state.history()[0].status, TodoStatus::Failed);
        assert!(state.last_step_result().is_none());
    }

    #[test]
    fn test_finished_task_cannot_change() {
        let mut state = TaskStateManager::new();
        state.set_plan(plan());
        state.record_success("1", &TaskOutput::new("ok")).unwrap();

        assert!(state.record_failure("1", &TaskFailure::new("late")).is_err());
        assert!(state.mark_in_progress("1").is_err());
        assert_eq!(state.todos()[0].status, TodoStatus::Completed);
    }

    #[test]
    fn test_unknown_task() {
        let mut state = TaskStateManager::new();
        state.set_plan(plan());
        assert!(state.record_success("nope", &TaskOutput::new("x")).is_err());
    }

    #[test]
    fn test_debug_mode_keeps_cursor() {
        let mut state = TaskStateManager::new();
        state.set_plan(plan());
        state.enter_debug_mode();
        assert!(state.is_debug_mode());
        assert_eq!(state.current_step(), 0);

        state.record_success("1", &TaskOutput::new("fixed")).unwrap();
        assert!(!state.is_debug_mode());
        assert_eq!(state.snapshot().debug_count, 1);
    }

    #[test]
    fn test_history_for_llm_window() {
        let mut state = TaskStateManager::new();
        state.set_plan(plan());
        state.record_success("1", &TaskOutput::new("a")).unwrap();
        state.record_success("2", &TaskOutput::new("b")).unwrap();

        let recent = state.history_for_llm(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].task_id, "2");
        assert_eq!(state.history_for_llm(10).len(), 2);
    }

    #[test]
    fn test_start_execution_idempotent() {
        let mut state = TaskStateManager::new();
        state.set_plan(plan());
        state.start_execution();
        let first = state.snapshot().started_at;
        state.start_execution();
        assert_eq!(state.snapshot().started_at, first);
        assert!(state.snapshot().execution_started);
    }
}
