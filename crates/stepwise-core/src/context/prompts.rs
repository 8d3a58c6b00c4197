//! Prompts for conversation compaction

use crate::formatting::{format_todo_overview, truncate_with_marker};
use crate::provider::{ChatMessage, ChatRole};
use crate::task::TodoItem;

/// System prompt of the compaction call
pub const COMPACT_SYSTEM_PROMPT: &str = r#"You compress the working memory of a coding agent. The conversation below will be replaced entirely by your reply, so the agent must be able to resume from it alone.

Reduce the token count by 70-90%. You MUST preserve 100% of:
1. The task list, with every task's id, title and status exactly as given
2. Every file path that was created, modified or read
3. Technical decisions, constraints and discoveries (APIs, versions, conventions, errors that shaped the approach)
4. The immediate next step

You MUST discard:
- Greetings, acknowledgements and redundant explanations
- Failed intermediate attempts, keeping only the lesson learned
- Raw tool-call payloads and verbatim tool output

Reply with the compressed context only, as plain text with short headed sections:
## Tasks
## Files
## Decisions
## Next Step"#;

/// Assistant turn appended after the summary so the transcript ends on a valid turn
pub const COMPACT_ACKNOWLEDGEMENT: &str =
    "Understood. I have the compacted context and will continue from the next step.";

/// Heading of the system message that replaces a compacted conversation
pub const COMPACTED_CONTEXT_HEADER: &str = "[Compacted conversation context]";

/// Build the user turn of the compaction call
///
/// Any single message longer than `max_message_chars` is cut with a
/// `... [truncated]` marker.
pub fn build_compact_request(
    history: &[ChatMessage],
    todos: &[TodoItem],
    recent_files: &[String],
    max_message_chars: usize,
) -> String {
    let mut out = String::new();

    out.push_str("# Current Task List\n");
    if todos.is_empty() {
        out.push_str("(no tasks)\n");
    } else {
        out.push_str(&format_todo_overview(todos));
        out.push('\n');
    }

    out.push_str("\n# Recently Accessed Files\n");
    if recent_files.is_empty() {
        out.push_str("(none)\n");
    } else {
        for path in recent_files {
            out.push_str("- ");
            out.push_str(path);
            out.push('\n');
        }
    }

    out.push_str("\n# Conversation\n");
    for msg in history {
        out.push_str(&render_message(msg, max_message_chars));
        out.push('\n');
    }

    out.push_str("\nCompress the conversation above following your instructions.");
    out
}

fn render_message(msg: &ChatMessage, max_chars: usize) -> String {
    let mut body = match msg.role {
        ChatRole::Tool => format!(
            "[tool result {}] {}",
            msg.tool_call_id.as_deref().unwrap_or("?"),
            msg.content
        ),
        role => format!("[{}] {}", role.as_str(), msg.content),
    };

    for call in &msg.tool_calls {
        body.push_str(&format!("\n  -> {}({})", call.name, call.arguments));
    }

    truncate_with_marker(&body, max_chars)
}
