//! Stepwise Core - Plan, execute and debug coding tasks with a tool-augmented LLM
//!
//! This crate provides the execution core of a coding agent:
//! - Task planning and plan progress tracking
//! - The Plan -> Execute -> Debug orchestrator
//! - Tool contract and the default tool-calling loop
//! - Context window tracking and conversation compaction

pub mod config;
pub mod context;
pub mod error;
pub mod formatting;
pub mod orchestrator;
pub mod provider;
pub mod task;
pub mod tools;

pub use config::{defaults, CompactConfig, Config, ContextConfig, OrchestratorConfig};
pub use context::{CompactManager, CompactResult, ContextTracker, ContextUsageInfo};
pub use error::{Error, Result, ToolError};
pub use orchestrator::{ExecutionPhase, LogEntry, LogLevel, Orchestrator, OrchestratorEvent};
pub use provider::{
    ChatMessage, ChatModel, ChatRole, ModelTurn, StopReason, TokenUsage, ToolAugmentedChat,
    ToolCall, ToolCallRecord, ToolCompletion, ToolLoop,
};
pub use task::{
    Complexity, ExecutionSummary, FileAction, FileChange, HistoryEntry, ModelPlanner, PlanResult,
    Planner, TaskFailure, TaskOutput, TaskStateManager, TodoItem, TodoStatus,
};
pub use tools::{Tool, ToolDefinition, ToolOutput, ToolRegistry};

// Re-export for downstream crates that hand a token to the orchestrator
pub use tokio_util::sync::CancellationToken;
