//! Task planner - turns a user request into an ordered todo list

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::provider::{ChatMessage, ChatModel};

use super::{TodoItem, TodoStatus};

/// Rough size of the requested work, as judged by the planner
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[default]
    Simple,
    Moderate,
    Complex,
}

/// Output of the planning call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanResult {
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    #[serde(default)]
    pub complexity: Complexity,
}

/// Produces the plan for a request. An empty `todos` list is a planning failure.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn generate_plan(&self, request: &str) -> Result<PlanResult>;
}

pub const PLANNING_SYSTEM_PROMPT: &str = r#"You are the planning component of a coding agent.

Break the user's request into a short ordered list of concrete tasks. Each task must be
small enough to finish with a few tool calls (reading, writing or editing files, running
commands). Order the tasks so that each one only relies on tasks listed before it.

Reply with a single JSON object and nothing else:
{
  "complexity": "simple" | "moderate" | "complex",
  "todos": [
    {"id": "1", "title": "short imperative title", "description": "what to do and how to verify it", "dependencies": []}
  ]
}"#;

/// [`Planner`] backed by a single model call
pub struct ModelPlanner {
    model: Arc<dyn ChatModel>,
}

impl ModelPlanner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Parse the model's planning reply
    ///
    /// Accepts a bare JSON object, a fenced code block or JSON surrounded by
    /// prose. Items without an id get `task-N`; every item starts pending.
    pub fn parse_plan(reply: &str) -> Result<PlanResult> {
        let json = extract_json_object(reply)
            .ok_or_else(|| Error::Planning("planner reply contains no JSON object".to_string()))?;
        let value: Value = serde_json::from_str(json)?;

        let complexity = value
            .get("complexity")
            .cloned()
            .and_then(|c| serde_json::from_value(c).ok())
            .unwrap_or_default();

        let items = value
            .get("todos")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut todos = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let mut todo = match serde_json::from_value::<RawTodo>(item) {
                Ok(raw) => raw.into_todo(i),
                Err(e) => {
                    warn!(index = i, error = %e, "Skipping malformed plan item");
                    continue;
                }
            };
            todo.status = TodoStatus::Pending;
            todos.push(todo);
        }

        Ok(PlanResult { todos, complexity })
    }
}

/// Reject plans that cannot be executed: no tasks, blank titles or repeated ids
pub fn validate_plan(todos: &[TodoItem]) -> Result<()> {
    if todos.is_empty() {
        return Err(Error::Planning("Planner returned no tasks".to_string()));
    }

    let mut seen = HashSet::with_capacity(todos.len());
    for todo in todos {
        if todo.title.trim().is_empty() {
            return Err(Error::Planning(format!("Task {} has no title", todo.id)));
        }
        if !seen.insert(todo.id.as_str()) {
            return Err(Error::Planning(format!("Duplicate task id: {}", todo.id)));
        }
    }
    Ok(())
}

#[async_trait]
impl Planner for ModelPlanner {
    async fn generate_plan(&self, request: &str) -> Result<PlanResult> {
        let messages = vec![
            ChatMessage::system(PLANNING_SYSTEM_PROMPT),
            ChatMessage::user(request),
        ];
        let turn = self.model.chat(&messages, &[]).await?;
        let reply = turn.content.unwrap_or_default();
        debug!(reply_len = reply.len(), "Planner replied");
        Self::parse_plan(&reply)
    }
}

/// Plan item as the model writes it; ids may be numbers or missing
#[derive(Deserialize)]
struct RawTodo {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, alias = "content")]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    dependencies: Vec<Value>,
}

impl RawTodo {
    fn into_todo(self, index: usize) -> TodoItem {
        let id = self
            .id
            .as_ref()
            .and_then(value_to_id)
            .unwrap_or_else(|| format!("task-{}", index + 1));
        let title = if self.title.trim().is_empty() {
            self.description.clone()
        } else {
            self.title
        };
        TodoItem {
            id,
            title,
            description: self.description,
            dependencies: self.dependencies.iter().filter_map(value_to_id).collect(),
            status: TodoStatus::Pending,
            result: None,
            error: None,
        }
    }
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Slice from the first `{` to its matching `}`, skipping braces inside strings
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
