//! Tool contract consumed by the tool loop
//!
//! Concrete tools (file I/O, shell, browser, office automation) live outside
//! this crate. Each tool has:
//! - A name and description for the LLM
//! - A JSON schema for parameters
//! - An execute method returning a [`ToolOutput`]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ToolError;

/// Marker that starts a tool result rendered from a failed execution
pub const TOOL_ERROR_PREFIX: &str = "Error:";

/// Boxed future type for object-safe async trait methods
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Output from a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool succeeded
    pub success: bool,
    /// The output content (can be text, JSON, etc.)
    pub content: Value,
    /// Optional error message
    pub error: Option<String>,
    /// Metadata about the execution
    pub metadata: HashMap<String, Value>,
}

impl ToolOutput {
    pub fn success(content: impl Into<Value>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: Value::Null,
            error: Some(message.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Text sent back to the model for this output
    ///
    /// String content is passed through unquoted; failures carry the
    /// [`TOOL_ERROR_PREFIX`] marker.
    pub fn render(&self) -> String {
        if self.success {
            match &self.content {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            }
        } else {
            format!(
                "{} {}",
                TOOL_ERROR_PREFIX,
                self.error.as_deref().unwrap_or("tool failed")
            )
        }
    }
}

/// Tool definition for LLM consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Core trait for all tools
pub trait Tool: Send + Sync {
    /// Tool name (used by LLM to invoke)
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with given parameters
    fn execute(&self, params: Value) -> BoxFuture<'_, Result<ToolOutput, ToolError>>;

    /// Convert to tool definition for LLM
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions of all tools, sorted by name for a stable prompt
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Get all tools
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Helper macro for creating tool parameter schemas
#[macro_export]
macro_rules! tool_params {
    ($($field:ident : $type:expr => $desc:expr),* $(,)?) => {
        serde_json::json!({
            "type": "object",
            "properties": {
                $( stringify!($field): { "type": $type, "description": $desc } ),*
            },
            "required": [ $( stringify!($field) ),* ]
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text back"
        }

        fn parameters_schema(&self) -> Value {
            crate::tool_params!(text: "string" => "Text to echo")
        }

        fn execute(&self, params: Value) -> BoxFuture<'_, Result<ToolOutput, ToolError>> {
            Box::pin(async move {
                let text = params["text"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidParams("text is required".into()))?;
                Ok(ToolOutput::success(text))
            })
        }
    }

    #[test]
    fn test_render_output() {
        assert_eq!(ToolOutput::success("plain").render(), "plain");
        assert_eq!(ToolOutput::success(json!({"a": 1})).render(), r#"{"a":1}"#);
        assert_eq!(ToolOutput::error("missing").render(), "Error: missing");
    }

    #[test]
    fn test_registry() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(Echo));

        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());

        let defs = registry.list();
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn test_execute_tool() {
        let tool = Echo;
        let output = tool.execute(json!({"text": "hi"})).await.unwrap();
        assert!(output.success);
        assert_eq!(output.render(), "hi");

        let err = tool.execute(json!({})).await;
        assert!(matches!(err, Err(ToolError::InvalidParams(_))));
    }
}
