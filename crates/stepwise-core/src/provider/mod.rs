//! LLM provider contracts
//!
//! The transport to a model provider lives outside this crate. The core only
//! depends on two contracts:
//! - [`ChatModel`]: a single model turn over a message list
//! - [`ToolAugmentedChat`]: a full tool-calling exchange that returns the new
//!   transcript. [`ToolLoop`] implements it on top of any [`ChatModel`].

mod tool_loop;

pub use tool_loop::{ToolLoop, MAX_TOOL_RESULT_SIZE};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::tools::ToolDefinition;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A message in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique ID for this message
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    /// Tool calls made by this message (assistant only)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<ToolCall>,
    /// The call this message answers (tool only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn with_role(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::Assistant, content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(ChatRole::Assistant, content);
        msg.tool_calls = tool_calls;
        msg
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(ChatRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }
}

/// Token accounting reported with every model response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

/// One model response
#[derive(Debug, Clone, Default)]
pub struct ModelTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// A single chat completion call
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<ModelTurn>;
}

/// A tool executed during a tool-augmented call, with its rendered result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool: String,
    pub args: Value,
    pub result: String,
    pub success: bool,
}

/// Why a tool-augmented call stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model stopped requesting tools
    Completed,
    /// The turn cap was hit while the model still requested tools
    IterationLimit,
    /// Anything else the transport reports
    Other(String),
}

/// Result of a tool-augmented call
#[derive(Debug, Clone)]
pub struct ToolCompletion {
    /// Final assistant text
    pub message: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// The complete new transcript, including the history passed in
    pub all_messages: Vec<ChatMessage>,
    /// Prompt tokens of the last model response
    pub prompt_tokens: Option<u64>,
    pub stop_reason: StopReason,
}

/// Drives one user turn to completion: model turns plus tool executions
#[async_trait]
pub trait ToolAugmentedChat: Send + Sync {
    async fn chat_completion_with_tools(
        &self,
        history: Vec<ChatMessage>,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<ToolCompletion>;
}
