//! Tool loop - the default tool-augmented chat call
//!
//! Issues one model turn, executes any requested tools in order, feeds the
//! results back and loops until the model stops requesting tools or the turn
//! cap is hit. Tools run sequentially; the only awaited work is the model
//! call and each tool execution, both of which honor the cancellation token.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{defaults, OrchestratorConfig};
use crate::error::{Error, Result};
use crate::formatting::truncate_with_marker;
use crate::tools::{ToolDefinition, ToolRegistry, TOOL_ERROR_PREFIX};

use super::{
    ChatMessage, ChatModel, StopReason, ToolAugmentedChat, ToolCall, ToolCallRecord,
    ToolCompletion,
};

/// Maximum size for a single tool result in characters
/// ~30k chars ≈ ~10k tokens, leaving room for conversation history
pub const MAX_TOOL_RESULT_SIZE: usize = 30_000;

/// Drives a [`ChatModel`] and a [`ToolRegistry`] through a tool-calling exchange
pub struct ToolLoop {
    model: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    max_iterations: usize,
}

impl ToolLoop {
    pub fn new(model: Arc<dyn ChatModel>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            registry,
            max_iterations: defaults::MAX_TOOL_ITERATIONS,
        }
    }

    /// Tool loop capped at `orchestrator.max_tool_iterations`
    pub fn from_config(
        model: Arc<dyn ChatModel>,
        registry: Arc<ToolRegistry>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self::new(model, registry).with_max_iterations(config.max_tool_iterations)
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Definitions of every registered tool
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry.list()
    }

    async fn run_tool(&self, call: &ToolCall, cancel: &CancellationToken) -> Result<ToolCallRecord> {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool_name = %call.name, "Model requested unknown tool");
            return Ok(ToolCallRecord {
                id: call.id.clone(),
                tool: call.name.clone(),
                args: call.arguments.clone(),
                result: format!("{} Unknown tool: {}", TOOL_ERROR_PREFIX, call.name),
                success: false,
            });
        };

        debug!(tool_name = %call.name, tool_id = %call.id, "Executing tool");
        let outcome = tokio::select! {
            outcome = tool.execute(call.arguments.clone()) => outcome,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let (success, output) = match outcome {
            Ok(output) => (output.success, output.render()),
            Err(e) => (false, format!("{} {}", TOOL_ERROR_PREFIX, e)),
        };

        let result = truncate_with_marker(&output, MAX_TOOL_RESULT_SIZE);
        if result != output {
            info!("Truncated {} result from {} chars", call.name, output.len());
        }

        Ok(ToolCallRecord {
            id: call.id.clone(),
            tool: call.name.clone(),
            args: call.arguments.clone(),
            result,
            success,
        })
    }
}

#[async_trait]
impl ToolAugmentedChat for ToolLoop {
    async fn chat_completion_with_tools(
        &self,
        history: Vec<ChatMessage>,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<ToolCompletion> {
        let mut messages = history;
        let mut records = Vec::new();
        let mut prompt_tokens = None;
        let mut last_content = String::new();

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let turn = tokio::select! {
                turn = self.model.chat(&messages, tools) => turn?,
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            };

            if turn.usage.prompt_tokens.is_some() {
                prompt_tokens = turn.usage.prompt_tokens;
            }
            debug!(
                iteration,
                prompt_tokens = ?turn.usage.prompt_tokens,
                tool_calls = turn.tool_calls.len(),
                "Model turn complete"
            );

            last_content = turn.content.unwrap_or_default();
            let calls = turn.tool_calls;
            messages.push(ChatMessage::assistant_with_tools(&last_content, calls.clone()));

            if calls.is_empty() {
                return Ok(ToolCompletion {
                    message: last_content,
                    tool_calls: records,
                    all_messages: messages,
                    prompt_tokens,
                    stop_reason: StopReason::Completed,
                });
            }

            for call in &calls {
                let record = self.run_tool(call, cancel).await?;
                messages.push(ChatMessage::tool_result(&record.id, &record.result));
                records.push(record);
            }
        }

        warn!(max_iterations = self.max_iterations, "Tool loop hit iteration limit");
        Ok(ToolCompletion {
            message: last_content,
            tool_calls: records,
            all_messages: messages,
            prompt_tokens,
            stop_reason: StopReason::IterationLimit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::provider::{ChatRole, ModelTurn, TokenUsage};
    use crate::tools::{BoxFuture, Tool, ToolOutput};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Replays canned turns in order
    struct Scripted {
        turns: Mutex<Vec<ModelTurn>>,
    }

    impl Scripted {
        fn new(mut turns: Vec<ModelTurn>) -> Self {
            turns.reverse();
            Self {
                turns: Mutex::new(turns),
            }
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn chat(&self, _messages: &[ChatMessage], _tools: &[ToolDefinition]) -> Result<ModelTurn> {
            self.turns
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::Provider("script exhausted".into()))
        }
    }

    struct Fails;

    impl Tool for Fails {
        fn name(&self) -> &str {
            "fails"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn execute(&self, _params: Value) -> BoxFuture<'_, std::result::Result<ToolOutput, ToolError>> {
            Box::pin(async { Err(ToolError::ExecutionFailed("disk full".into())) })
        }
    }

    fn call_turn(name: &str) -> ModelTurn {
        ModelTurn {
            content: None,
            tool_calls: vec![ToolCall::new("c1", name, json!({}))],
            usage: TokenUsage {
                prompt_tokens: Some(100),
                completion_tokens: Some(5),
            },
        }
    }

    fn text_turn(text: &str, prompt_tokens: u64) -> ModelTurn {
        ModelTurn {
            content: Some(text.to_string()),
            tool_calls: vec![],
            usage: TokenUsage {
                prompt_tokens: Some(prompt_tokens),
                completion_tokens: None,
            },
        }
    }

    fn tool_loop(turns: Vec<ModelTurn>) -> ToolLoop {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Fails));
        ToolLoop::new(Arc::new(Scripted::new(turns)), Arc::new(registry))
    }

    #[tokio::test]
    async fn test_failed_tool_is_marked() {
        let tl = tool_loop(vec![call_turn("fails"), text_turn("gave up", 250)]);
        let done = tl
            .chat_completion_with_tools(vec![ChatMessage::user("go")], &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(done.stop_reason, StopReason::Completed);
        assert_eq!(done.message, "gave up");
        assert_eq!(done.prompt_tokens, Some(250));
        assert_eq!(done.tool_calls.len(), 1);
        assert!(!done.tool_calls[0].success);
        assert!(done.tool_calls[0].result.starts_with(TOOL_ERROR_PREFIX));

        // user, assistant(tool call), tool, assistant(final)
        let roles: Vec<ChatRole> = done.all_messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::User, ChatRole::Assistant, ChatRole::Tool, ChatRole::Assistant]
        );
        assert_eq!(done.all_messages[2].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let tl = tool_loop(vec![call_turn("nope"), text_turn("ok", 10)]);
        let done = tl
            .chat_completion_with_tools(vec![], &[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(done.tool_calls[0].result, "Error: Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let tl = tool_loop(vec![call_turn("fails"), call_turn("fails")]).with_max_iterations(2);
        let done = tl
            .chat_completion_with_tools(vec![], &[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(done.stop_reason, StopReason::IterationLimit);
        assert_eq!(done.tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_configured_iteration_cap() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Fails));
        let config = OrchestratorConfig {
            max_tool_iterations: 3,
            ..Default::default()
        };
        let turns = (0..4).map(|_| call_turn("fails")).collect();
        let tl = ToolLoop::from_config(Arc::new(Scripted::new(turns)), Arc::new(registry), &config);

        let done = tl
            .chat_completion_with_tools(vec![], &[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(done.stop_reason, StopReason::IterationLimit);
        assert_eq!(done.tool_calls.len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let tl = tool_loop(vec![text_turn("never", 1)]);
        let token = CancellationToken::new();
        token.cancel();
        let result = tl.chat_completion_with_tools(vec![], &[], &token).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
