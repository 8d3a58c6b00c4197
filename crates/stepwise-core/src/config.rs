//! Configuration management for Stepwise
//!
//! Handles loading and validating the orchestrator, context tracking and
//! compaction settings. Every section is optional in the TOML file; missing
//! keys fall back to the values in [`defaults`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default values shared by the config types and the components using them
pub mod defaults {
    /// Debug attempts allowed after the first attempt of a task
    pub const MAX_DEBUG_ATTEMPTS: u32 = 3;
    /// Advisory per-task time budget
    pub const TASK_TIMEOUT_MS: u64 = 300_000;
    /// Model turns per tool-augmented call
    pub const MAX_TOOL_ITERATIONS: usize = 25;
    /// Completed tasks quoted in each task prompt
    pub const RECENT_TASKS_IN_PROMPT: usize = 5;
    /// History entries quoted in each task prompt
    pub const HISTORY_ENTRIES_IN_PROMPT: usize = 10;
    /// Compaction threshold in percent of the context window
    pub const COMPACT_THRESHOLD: u32 = 80;
    /// Context window assumed when the model limit is unknown
    pub const MODEL_MAX_TOKENS: usize = 128_000;
    /// Size of the recently touched file set
    pub const MAX_RECENT_FILES: usize = 20;
    /// Per-message cap when serializing a transcript for compaction
    pub const COMPACT_MAX_MESSAGE_CHARS: usize = 3_000;
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub compact: CompactConfig,
}

impl Config {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a file, or defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject values outside their documented ranges
    pub fn validate(&self) -> Result<()> {
        if self.context.threshold == 0 || self.context.threshold > 100 {
            return Err(Error::Config(format!(
                "context.threshold must be in (0, 100], got {}",
                self.context.threshold
            )));
        }
        if self.context.max_recent_files == 0 {
            return Err(Error::Config(
                "context.max_recent_files must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.max_tool_iterations == 0 {
            return Err(Error::Config(
                "orchestrator.max_tool_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Retries allowed per task before it is recorded as failed
    pub max_debug_attempts: u32,
    /// Per-task time budget. Advisory: an overrun is only logged.
    pub task_timeout_ms: u64,
    /// Session identifier; derived from the start time when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Keep debug-level entries in the run log
    pub verbose: bool,
    /// Cap on model turns inside one tool-augmented call
    pub max_tool_iterations: usize,
    /// Also treat tool results starting with the `Error:` marker as failures
    pub legacy_error_prefix: bool,
    /// Number of completed tasks quoted in each task prompt
    pub recent_tasks_in_prompt: usize,
    /// Number of history entries quoted in each task prompt
    pub history_entries_in_prompt: usize,
    /// Replaces the built-in system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_debug_attempts: defaults::MAX_DEBUG_ATTEMPTS,
            task_timeout_ms: defaults::TASK_TIMEOUT_MS,
            session_id: None,
            verbose: false,
            max_tool_iterations: defaults::MAX_TOOL_ITERATIONS,
            legacy_error_prefix: true,
            recent_tasks_in_prompt: defaults::RECENT_TASKS_IN_PROMPT,
            history_entries_in_prompt: defaults::HISTORY_ENTRIES_IN_PROMPT,
            system_prompt: None,
        }
    }
}

impl OrchestratorConfig {
    /// The configured session id, or one derived from the current time
    pub fn resolve_session_id(&self) -> String {
        self.session_id.clone().unwrap_or_else(default_session_id)
    }
}

fn default_session_id() -> String {
    format!("session-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S-%3f"))
}

/// Context window tracking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Usage percentage at which auto-compaction fires
    pub threshold: u32,
    /// Context window of the model in tokens
    pub model_max_tokens: usize,
    /// Size of the recently touched file set
    pub max_recent_files: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::COMPACT_THRESHOLD,
            model_max_tokens: defaults::MODEL_MAX_TOKENS,
            max_recent_files: defaults::MAX_RECENT_FILES,
        }
    }
}

/// Compaction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactConfig {
    /// Compact automatically between tasks when the threshold is crossed
    pub auto_compact: bool,
    /// Longest single message kept verbatim in the compaction request
    pub max_message_chars: usize,
}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            auto_compact: true,
            max_message_chars: defaults::COMPACT_MAX_MESSAGE_CHARS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.orchestrator.max_debug_attempts, 3);
        assert_eq!(config.orchestrator.task_timeout_ms, 300_000);
        assert!(!config.orchestrator.verbose);
        assert_eq!(config.context.threshold, 80);
        assert_eq!(config.context.model_max_tokens, 128_000);
        assert_eq!(config.context.max_recent_files, 20);
        assert!(config.compact.auto_compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[orchestrator]"));
        assert!(toml_str.contains("[context]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.context.threshold, config.context.threshold);
        assert_eq!(
            parsed.orchestrator.max_debug_attempts,
            config.orchestrator.max_debug_attempts
        );
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config = Config::from_toml_str("[orchestrator]\nmax_debug_attempts = 1\n").unwrap();
        assert_eq!(config.orchestrator.max_debug_attempts, 1);
        assert_eq!(config.orchestrator.max_tool_iterations, 25);
        assert_eq!(config.context.threshold, 80);
    }

    #[test]
    fn test_threshold_range() {
        assert!(Config::from_toml_str("[context]\nthreshold = 0\n").is_err());
        assert!(Config::from_toml_str("[context]\nthreshold = 101\n").is_err());
        assert!(Config::from_toml_str("[context]\nthreshold = 100\n").is_ok());
    }

    #[test]
    fn test_session_id() {
        let config = OrchestratorConfig::default();
        assert!(config.resolve_session_id().starts_with("session-"));

        let config = OrchestratorConfig {
            session_id: Some("fixed".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_session_id(), "fixed");
    }
}
