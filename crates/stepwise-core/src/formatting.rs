//! Text formatting shared by task prompts and compaction requests

use crate::task::{TodoItem, TodoStatus};

/// Truncate a string to at most `max` characters, appending "..." when cut
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Cut a message body for inclusion in a larger prompt, marking the cut
pub fn truncate_with_marker(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max).collect();
        format!("{}... [truncated]", kept)
    }
}

/// Glyph shown in front of a todo in overviews
pub fn status_glyph(status: &TodoStatus) -> &'static str {
    match status {
        TodoStatus::Completed => "✓",
        TodoStatus::InProgress => "▶",
        TodoStatus::Pending => "○",
        TodoStatus::Failed => "✗",
    }
}

/// Render a todo list as one glyph-prefixed line per item
pub fn format_todo_overview(todos: &[TodoItem]) -> String {
    todos
        .iter()
        .enumerate()
        .map(|(i, todo)| {
            format!(
                "{} {}. [{}] {}",
                status_glyph(&todo.status),
                i + 1,
                todo.id,
                todo.title
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        // Multi-byte characters are never split
        assert_eq!(truncate_str("ééééé", 4), "é...");
    }

    #[test]
    fn test_truncate_with_marker() {
        assert_eq!(truncate_with_marker("abc", 3), "abc");
        assert_eq!(truncate_with_marker("abcdef", 3), "abc... [truncated]");
    }

    #[test]
    fn test_format_todo_overview() {
        let mut first = TodoItem::new("t1", "Write parser", "");
        first.status = TodoStatus::Completed;
        let mut second = TodoItem::new("t2", "Add tests", "");
        second.status = TodoStatus::InProgress;
        let third = TodoItem::new("t3", "Update docs", "");

        let overview = format_todo_overview(&[first, second, third]);
        let lines: Vec<&str> = overview.lines().collect();
        assert_eq!(lines[0], "✓ 1. [t1] Write parser");
        assert_eq!(lines[1], "▶ 2. [t2] Add tests");
        assert_eq!(lines[2], "○ 3. [t3] Update docs");
    }
}
