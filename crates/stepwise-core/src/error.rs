//! Error types for Stepwise Core

use thiserror::Error;

/// Result type alias using Stepwise Error
pub type Result<T> = std::result::Result<T, Error>;

/// Stepwise error types
///
/// Only [`Error::Planning`] escapes [`crate::Orchestrator::execute`]; every
/// other failure during a run is captured in the execution summary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Task error: {0}")]
    Task(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Compaction failed: {0}")]
    Compaction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Tool-specific errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
