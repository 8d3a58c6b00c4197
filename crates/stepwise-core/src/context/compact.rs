//! Conversation compaction
//!
//! Replaces a long transcript with a single dense system message produced by
//! one model call, followed by a scripted assistant acknowledgement.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{defaults, CompactConfig};
use crate::error::{Error, Result};
use crate::provider::{ChatMessage, ChatModel};
use crate::task::TodoItem;

use super::prompts::{
    build_compact_request, COMPACTED_CONTEXT_HEADER, COMPACT_ACKNOWLEDGEMENT,
    COMPACT_SYSTEM_PROMPT,
};

/// Result of a compaction operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactResult {
    /// The replacement transcript: summary system message plus acknowledgement
    pub messages: Vec<ChatMessage>,
    pub original_message_count: usize,
    /// Total content characters before compaction
    pub chars_before: usize,
    /// Total content characters after compaction
    pub chars_after: usize,
}

impl CompactResult {
    /// Fraction of characters removed, in percent
    pub fn reduction_percentage(&self) -> u32 {
        if self.chars_before == 0 {
            return 0;
        }
        let kept = self.chars_after as f64 / self.chars_before as f64;
        ((1.0 - kept) * 100.0).clamp(0.0, 100.0).round() as u32
    }
}

/// Builds compaction requests and turns the model reply into a new transcript
pub struct CompactManager {
    model: Arc<dyn ChatModel>,
    max_message_chars: usize,
}

impl CompactManager {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_message_chars: defaults::COMPACT_MAX_MESSAGE_CHARS,
        }
    }

    pub fn from_config(model: Arc<dyn ChatModel>, config: &CompactConfig) -> Self {
        Self {
            model,
            max_message_chars: config.max_message_chars.max(1),
        }
    }

    /// Compact `history` into a two-message transcript
    ///
    /// The caller installs `messages` and resets its context tracker. An
    /// empty reply is an error and the caller keeps its transcript.
    pub async fn compact(
        &self,
        history: &[ChatMessage],
        todos: &[TodoItem],
        recent_files: &[String],
    ) -> Result<CompactResult> {
        let chars_before = content_chars(history);
        let request = build_compact_request(history, todos, recent_files, self.max_message_chars);
        debug!(
            messages = history.len(),
            chars_before,
            request_len = request.len(),
            "Requesting compaction"
        );

        let turn = self
            .model
            .chat(
                &[
                    ChatMessage::system(COMPACT_SYSTEM_PROMPT),
                    ChatMessage::user(request),
                ],
                &[],
            )
            .await?;

        let summary = turn.content.unwrap_or_default();
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(Error::Compaction("model returned an empty summary".to_string()));
        }

        let messages = vec![
            ChatMessage::system(format!("{}\n\n{}", COMPACTED_CONTEXT_HEADER, summary)),
            ChatMessage::assistant(COMPACT_ACKNOWLEDGEMENT),
        ];
        let result = CompactResult {
            chars_after: content_chars(&messages),
            messages,
            original_message_count: history.len(),
            chars_before,
        };

        info!(
            original_messages = result.original_message_count,
            chars_before = result.chars_before,
            chars_after = result.chars_after,
            reduction = result.reduction_percentage(),
            "Conversation compacted"
        );
        Ok(result)
    }
}

fn content_chars(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| m.content.chars().count()).sum()
}
