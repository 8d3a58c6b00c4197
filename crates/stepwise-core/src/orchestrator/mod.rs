//! Orchestrator - drives a request through Plan -> Execute -> Debug
//!
//! One orchestrator owns one conversation, one [`TaskStateManager`] and one
//! [`ContextTracker`]. Every mutating method takes `&mut self`, so a host
//! cannot compact or replace the transcript while a task is in flight.

mod events;
mod files;
mod logs;
mod prompt;

pub use events::OrchestratorEvent;
pub use logs::{LogEntry, LogLevel};
pub use prompt::{DebugContext, LlmInput, DEFAULT_SYSTEM_PROMPT};

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CompactConfig, Config, ContextConfig, OrchestratorConfig};
use crate::context::{CompactManager, CompactResult, ContextTracker, ContextUsageInfo};
use crate::error::{Error, Result};
use crate::formatting::truncate_str;
use crate::provider::{ChatMessage, StopReason, ToolAugmentedChat, ToolCompletion};
use crate::task::{
    validate_plan, ExecutionSummary, FileChange, Planner, StateSnapshot, TaskFailure, TaskOutput,
    TaskStateManager, TodoItem, TodoStatus,
};
use crate::tools::{ToolDefinition, TOOL_ERROR_PREFIX};

use logs::RunLog;

/// Longest failing tool result attached to a retry prompt
const FAILURE_DETAILS_CHARS: usize = 2_000;

/// Where a run is in its state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    #[default]
    Idle,
    Planning,
    Executing,
    Completed,
    Failed,
}

/// Outcome of one model call for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptStatus {
    Success,
    /// A tool failed; the model gets another attempt with the error
    NeedsDebug,
    /// The model layer failed (transport error, iteration limit); retried
    Failed,
    /// The call stopped for a reason we cannot interpret; not retried
    Unknown,
}

#[derive(Debug)]
struct AttemptOutcome {
    status: AttemptStatus,
    message: String,
    failure: Option<TaskFailure>,
    files_changed: Vec<FileChange>,
}

impl AttemptOutcome {
    fn failed(status: AttemptStatus, failure: TaskFailure) -> Self {
        Self {
            status,
            message: String::new(),
            failure: Some(failure),
            files_changed: Vec::new(),
        }
    }
}

/// Plan -> Execute -> Debug driver for one session
pub struct Orchestrator {
    config: OrchestratorConfig,
    context_config: ContextConfig,
    compact_config: CompactConfig,
    session_id: String,
    planner: Arc<dyn Planner>,
    chat: Arc<dyn ToolAugmentedChat>,
    tools: Vec<ToolDefinition>,
    state: TaskStateManager,
    tracker: ContextTracker,
    compactor: Option<CompactManager>,
    conversation: Vec<ChatMessage>,
    phase: ExecutionPhase,
    logs: RunLog,
    files_changed: Vec<FileChange>,
    event_tx: Option<mpsc::Sender<OrchestratorEvent>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        planner: Arc<dyn Planner>,
        chat: Arc<dyn ToolAugmentedChat>,
        tools: Vec<ToolDefinition>,
    ) -> Result<Self> {
        config.validate()?;
        let tracker = ContextTracker::from_config(&config.context)?;
        let session_id = config.orchestrator.resolve_session_id();
        let logs = RunLog::new(&session_id, config.orchestrator.verbose);

        Ok(Self {
            config: config.orchestrator,
            context_config: config.context,
            compact_config: config.compact,
            session_id,
            planner,
            chat,
            tools,
            state: TaskStateManager::new(),
            tracker,
            compactor: None,
            conversation: Vec::new(),
            phase: ExecutionPhase::Idle,
            logs,
            files_changed: Vec::new(),
            event_tx: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_events(mut self, tx: mpsc::Sender<OrchestratorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Enable compaction (automatic between tasks and via [`Self::compact`])
    pub fn with_compactor(mut self, compactor: CompactManager) -> Self {
        self.compactor = Some(compactor);
        self
    }

    /// Use a host-provided token instead of the orchestrator's own
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run a request to completion
    ///
    /// Only a planning failure is returned as an error. Task failures end the
    /// run early and are reported in the summary.
    pub async fn execute(&mut self, request: &str) -> Result<ExecutionSummary> {
        let started = Instant::now();
        self.files_changed.clear();
        self.phase = ExecutionPhase::Planning;
        self.logs.record(LogLevel::Info, format!("Planning request: {}", truncate_str(request, 200)));

        let planned = self.planner.generate_plan(request).await;
        let plan = match planned.and_then(|plan| validate_plan(&plan.todos).map(|()| plan)) {
            Ok(plan) => plan,
            Err(Error::Planning(msg)) => return Err(self.fail_planning(msg).await),
            Err(e) => return Err(self.fail_planning(e.to_string()).await),
        };

        self.logs.record(
            LogLevel::Info,
            format!("Plan created with {} tasks ({:?})", plan.todos.len(), plan.complexity),
        );
        self.emit(OrchestratorEvent::PlanCreated {
            todos: plan.todos.clone(),
            complexity: plan.complexity,
        })
        .await;
        self.state.set_plan(plan.todos);

        self.phase = ExecutionPhase::Executing;
        self.state.start_execution();

        while self.state.has_more_steps() {
            let Some(task) = self.state.current_task().cloned() else {
                break;
            };

            let succeeded = match self.execute_task(&task).await {
                Ok(succeeded) => succeeded,
                Err(e) => {
                    self.logs.record(LogLevel::Error, format!("Task {} aborted: {}", task.id, e));
                    if let Err(e) = self.fail_task(&task, TaskFailure::new(e.to_string())).await {
                        self.logs.record(
                            LogLevel::Error,
                            format!("Could not record failure of task {}: {}", task.id, e),
                        );
                    }
                    false
                }
            };
            self.state.next_step();

            if !succeeded {
                break;
            }
            if self.state.has_more_steps() {
                self.maybe_compact().await;
            }
        }

        let summary = self.summarize(started);
        if summary.success {
            self.phase = ExecutionPhase::Completed;
            self.logs.record(
                LogLevel::Info,
                format!("Execution completed: {} tasks in {}ms", summary.total_tasks, summary.duration_ms),
            );
            self.emit(OrchestratorEvent::ExecutionCompleted {
                summary: summary.clone(),
            })
            .await;
        } else {
            self.phase = ExecutionPhase::Failed;
            let error = format!(
                "{} of {} tasks completed, {} failed",
                summary.completed_tasks, summary.total_tasks, summary.failed_tasks
            );
            self.logs.record(LogLevel::Warn, format!("Execution failed: {}", error));
            self.emit(OrchestratorEvent::ExecutionFailed {
                error,
                summary: Some(summary.clone()),
            })
            .await;
        }

        Ok(summary)
    }

    async fn fail_planning(&mut self, message: String) -> Error {
        self.phase = ExecutionPhase::Failed;
        self.logs.record(LogLevel::Error, format!("Planning failed: {}", message));
        self.emit(OrchestratorEvent::ExecutionFailed {
            error: message.clone(),
            summary: None,
        })
        .await;
        Error::Planning(message)
    }

    /// Run one task through its debug loop; true when it completed
    async fn execute_task(&mut self, task: &TodoItem) -> Result<bool> {
        let started = Instant::now();
        self.state.mark_in_progress(&task.id)?;
        self.warn_unmet_dependencies(task);
        self.logs.record(LogLevel::Info, format!("Starting task {}: {}", task.id, task.title));
        self.emit(OrchestratorEvent::TodoStarted {
            task_id: task.id.clone(),
            title: task.title.clone(),
        })
        .await;

        let max_attempts = self.config.max_debug_attempts;
        let mut debug_attempts = 0u32;
        let mut last_error: Option<TaskFailure> = None;
        // Tools do not roll back, so changes from failed attempts count too
        let mut task_files: Vec<FileChange> = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                self.fail_task(task, TaskFailure::new("Execution cancelled")).await?;
                return Ok(false);
            }

            let debug = last_error.clone().map(|error| DebugContext {
                attempt: debug_attempts,
                max_attempts,
                error,
            });

            let outcome = match self.call_model(task, debug).await {
                Ok(outcome) => outcome,
                Err(Error::Cancelled) => {
                    self.fail_task(task, TaskFailure::new("Execution cancelled")).await?;
                    return Ok(false);
                }
                Err(e) => {
                    self.logs.record(
                        LogLevel::Warn,
                        format!("Model call for task {} failed: {}", task.id, e),
                    );
                    AttemptOutcome::failed(AttemptStatus::Failed, TaskFailure::new(e.to_string()))
                }
            };

            for change in &outcome.files_changed {
                files::merge_change(&mut task_files, change.clone());
                files::merge_change(&mut self.files_changed, change.clone());
            }

            match outcome.status {
                AttemptStatus::Success => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    if elapsed_ms > self.config.task_timeout_ms {
                        self.logs.record(
                            LogLevel::Warn,
                            format!(
                                "Task {} took {}ms, over the {}ms budget",
                                task.id, elapsed_ms, self.config.task_timeout_ms
                            ),
                        );
                    }

                    let output = TaskOutput {
                        result: outcome.message,
                        files_changed: task_files,
                    };
                    self.state.record_success(&task.id, &output)?;
                    self.logs.record(LogLevel::Info, format!("Task {} completed", task.id));
                    self.emit(OrchestratorEvent::TodoCompleted {
                        task_id: task.id.clone(),
                        result: output.result,
                    })
                    .await;
                    return Ok(true);
                }
                AttemptStatus::Unknown => {
                    let failure = outcome
                        .failure
                        .unwrap_or_else(|| TaskFailure::new("Unknown execution status"));
                    self.fail_task(task, failure).await?;
                    return Ok(false);
                }
                AttemptStatus::NeedsDebug | AttemptStatus::Failed => {
                    let failure = outcome
                        .failure
                        .unwrap_or_else(|| TaskFailure::new("Attempt failed"));
                    debug_attempts += 1;

                    if debug_attempts > max_attempts {
                        let exhausted =
                            TaskFailure::new(format!("Max debug attempts ({}) reached", max_attempts))
                                .with_details(failure.message);
                        self.fail_task(task, exhausted).await?;
                        return Ok(false);
                    }

                    self.state.enter_debug_mode();
                    self.logs.record(
                        LogLevel::Info,
                        format!(
                            "Debugging task {} (attempt {}/{}): {}",
                            task.id, debug_attempts, max_attempts, failure.message
                        ),
                    );
                    self.emit(OrchestratorEvent::DebugStarted {
                        task_id: task.id.clone(),
                        attempt: debug_attempts,
                        error: failure.message.clone(),
                    })
                    .await;
                    last_error = Some(failure);
                }
            }
        }
    }

    async fn fail_task(&mut self, task: &TodoItem, failure: TaskFailure) -> Result<()> {
        self.state.record_failure(&task.id, &failure)?;
        self.logs.record(
            LogLevel::Error,
            format!("Task {} failed: {}", task.id, failure.message),
        );
        self.emit(OrchestratorEvent::TodoFailed {
            task_id: task.id.clone(),
            error: failure.message,
        })
        .await;
        Ok(())
    }

    fn warn_unmet_dependencies(&mut self, task: &TodoItem) {
        let unmet: Vec<&str> = task
            .dependencies
            .iter()
            .filter(|dep| {
                !self
                    .state
                    .todos()
                    .iter()
                    .any(|t| &t.id == *dep && t.status == TodoStatus::Completed)
            })
            .map(String::as_str)
            .collect();

        if !unmet.is_empty() {
            let message = format!(
                "Task {} starts before its dependencies completed: {}",
                task.id,
                unmet.join(", ")
            );
            self.logs.record(LogLevel::Warn, message);
        }
    }

    /// One tool-augmented call for the current attempt
    async fn call_model(
        &mut self,
        task: &TodoItem,
        debug: Option<DebugContext>,
    ) -> Result<AttemptOutcome> {
        if self.conversation.is_empty() {
            let system = self
                .config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
            self.conversation.push(ChatMessage::system(system));
        }

        let input = LlmInput::build(&self.state, task, debug, &self.config);
        self.conversation.push(ChatMessage::user(input.render()));
        debug!(
            task_id = %task.id,
            messages = self.conversation.len(),
            "Calling model"
        );

        let completion = self
            .chat
            .chat_completion_with_tools(self.conversation.clone(), &self.tools, &self.cancel)
            .await?;

        self.absorb_transcript(&completion);
        if let Some(tokens) = completion.prompt_tokens {
            self.tracker.update_usage(tokens);
        }

        let mut files_changed = Vec::new();
        for record in &completion.tool_calls {
            if let Some(path) = files::touched_path(&record.args) {
                self.tracker.track_file_access(path);
            }
            if let Some(change) = files::file_change(record) {
                files::merge_change(&mut files_changed, change);
            }
        }

        let outcome = match &completion.stop_reason {
            StopReason::Completed => match self.first_failed_tool(&completion) {
                None => AttemptOutcome {
                    status: AttemptStatus::Success,
                    message: completion.message.clone(),
                    failure: None,
                    files_changed,
                },
                Some(failure) => AttemptOutcome {
                    status: AttemptStatus::NeedsDebug,
                    message: completion.message.clone(),
                    failure: Some(failure),
                    files_changed,
                },
            },
            StopReason::IterationLimit => AttemptOutcome {
                files_changed,
                ..AttemptOutcome::failed(
                    AttemptStatus::Failed,
                    TaskFailure::new(format!(
                        "Tool loop stopped at the iteration limit ({} tool calls)",
                        completion.tool_calls.len()
                    )),
                )
            },
            StopReason::Other(reason) => AttemptOutcome {
                files_changed,
                ..AttemptOutcome::failed(
                    AttemptStatus::Unknown,
                    TaskFailure::new(format!("Unknown execution status: {}", reason)),
                )
            },
        };
        Ok(outcome)
    }

    /// Replace the transcript with the callee's, which never drops messages we sent
    fn absorb_transcript(&mut self, completion: &ToolCompletion) {
        if completion.all_messages.len() >= self.conversation.len() {
            self.conversation = completion.all_messages.clone();
        } else {
            warn!(
                returned = completion.all_messages.len(),
                local = self.conversation.len(),
                "Tool-augmented call returned a shorter transcript; appending its reply instead"
            );
            self.conversation.push(ChatMessage::assistant(&completion.message));
        }
    }

    /// First failing tool of a call, as the error for the next attempt
    fn first_failed_tool(&self, completion: &ToolCompletion) -> Option<TaskFailure> {
        let legacy = self.config.legacy_error_prefix;
        completion
            .tool_calls
            .iter()
            .find(|r| !r.success || (legacy && r.result.trim_start().starts_with(TOOL_ERROR_PREFIX)))
            .map(|r| {
                TaskFailure::new(format!("Tool {} failed", r.tool))
                    .with_details(truncate_str(&r.result, FAILURE_DETAILS_CHARS))
            })
    }

    async fn maybe_compact(&mut self) {
        if !self.compact_config.auto_compact || self.compactor.is_none() {
            return;
        }
        if !self
            .tracker
            .should_trigger_auto_compact(self.context_config.model_max_tokens)
        {
            return;
        }

        if let Err(e) = self.compact().await {
            self.logs.record(LogLevel::Warn, format!("Auto-compaction failed: {}", e));
            self.tracker.reset_auto_compact_trigger();
        }
    }

    /// Compact the conversation now
    ///
    /// Installs the two-message transcript and resets the tracker. On error
    /// the transcript is left untouched.
    pub async fn compact(&mut self) -> Result<CompactResult> {
        let compactor = self
            .compactor
            .as_ref()
            .ok_or_else(|| Error::Compaction("no compaction manager configured".to_string()))?;

        let recent_files = self.tracker.recent_files();
        let result = compactor
            .compact(&self.conversation, self.state.todos(), &recent_files)
            .await?;

        self.set_conversation_history(result.messages.clone());
        self.tracker.reset();
        self.logs.record(
            LogLevel::Info,
            format!(
                "Context compacted: {} messages, {} -> {} chars",
                result.original_message_count, result.chars_before, result.chars_after
            ),
        );
        self.emit(OrchestratorEvent::ContextCompacted {
            original_message_count: result.original_message_count,
            chars_before: result.chars_before,
            chars_after: result.chars_after,
        })
        .await;
        Ok(result)
    }

    fn summarize(&self, started: Instant) -> ExecutionSummary {
        let todos = self.state.todos();
        let completed_tasks = todos
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .count();
        let failed_tasks = todos.iter().filter(|t| t.status == TodoStatus::Failed).count();

        ExecutionSummary {
            total_tasks: todos.len(),
            completed_tasks,
            failed_tasks,
            total_steps: self.state.current_step(),
            duration_ms: started.elapsed().as_millis() as u64,
            success: completed_tasks == todos.len(),
            files_changed: self.files_changed.clone(),
        }
    }

    async fn emit(&self, event: OrchestratorEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Clear the transcript; the next attempt re-inserts the system prompt
    pub fn reset_conversation_history(&mut self) {
        info!(session_id = %self.session_id, "Conversation history reset");
        self.conversation.clear();
    }

    pub fn conversation_history(&self) -> &[ChatMessage] {
        &self.conversation
    }

    /// Replace the transcript wholesale
    pub fn set_conversation_history(&mut self, messages: Vec<ChatMessage>) {
        debug!(messages = messages.len(), "Conversation history replaced");
        self.conversation = messages;
    }

    pub fn state(&self) -> &TaskStateManager {
        &self.state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn all_logs(&self) -> &[LogEntry] {
        self.logs.entries()
    }

    pub fn context_usage(&self) -> ContextUsageInfo {
        self.tracker.context_usage(self.context_config.model_max_tokens)
    }

    pub fn context_tracker(&self) -> &ContextTracker {
        &self.tracker
    }

    pub fn context_tracker_mut(&mut self) -> &mut ContextTracker {
        &mut self.tracker
    }

    /// Token that aborts the run at the next model or tool await point
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
