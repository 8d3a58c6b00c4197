//! File paths touched by tool calls

use serde_json::Value;

use crate::provider::ToolCallRecord;
use crate::task::{FileAction, FileChange};

const CREATE_TOOLS: &[&str] = &["create_file", "write_file", "Write"];
const EDIT_TOOLS: &[&str] = &["edit_file", "Edit", "MultiEdit", "str_replace", "replace_in_file"];
const PATH_KEYS: &[&str] = &["path", "file_path", "filename"];

/// Path argument of a tool call, if it has one
pub(crate) fn touched_path(args: &Value) -> Option<&str> {
    PATH_KEYS
        .iter()
        .find_map(|key| args.get(*key).and_then(Value::as_str))
        .filter(|p| !p.is_empty())
}

/// The file change a successful creation or edit call made
pub(crate) fn file_change(record: &ToolCallRecord) -> Option<FileChange> {
    if !record.success {
        return None;
    }
    let action = if CREATE_TOOLS.contains(&record.tool.as_str()) {
        FileAction::Created
    } else if EDIT_TOOLS.contains(&record.tool.as_str()) {
        FileAction::Modified
    } else {
        return None;
    };
    touched_path(&record.args).map(|path| FileChange {
        path: path.to_string(),
        action,
    })
}

/// Append `change` unless the path is already listed
pub(crate) fn merge_change(changes: &mut Vec<FileChange>, change: FileChange) {
    if !changes.iter().any(|c| c.path == change.path) {
        changes.push(change);
    }
}
