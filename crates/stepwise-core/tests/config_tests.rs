//! Configuration loading tests
//!
//! Tests for Config parsing, validation and loading from disk.

use stepwise_core::config::{Config, OrchestratorConfig};
use stepwise_core::Error;
use std::fs;
use tempfile::TempDir;

/// Create a temp directory for config tests
fn setup_config_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

mod config_parsing_tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.orchestrator.max_debug_attempts, 3);
        assert_eq!(config.orchestrator.task_timeout_ms, 300_000);
        assert!(config.orchestrator.legacy_error_prefix);
        assert_eq!(config.context.threshold, 80);
        assert_eq!(config.compact.max_message_chars, 3_000);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
[orchestrator]
max_debug_attempts = 5
session_id = "nightly"
verbose = true

[context]
threshold = 70
model_max_tokens = 200000
"#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.orchestrator.max_debug_attempts, 5);
        assert_eq!(config.orchestrator.resolve_session_id(), "nightly");
        assert!(config.orchestrator.verbose);
        // Unset keys keep their defaults
        assert_eq!(config.orchestrator.max_tool_iterations, 25);
        assert_eq!(config.context.threshold, 70);
        assert_eq!(config.context.model_max_tokens, 200_000);
        assert_eq!(config.context.max_recent_files, 20);
        assert!(config.compact.auto_compact);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        for toml in ["[context]\nthreshold = 0", "[context]\nthreshold = 150"] {
            assert!(matches!(Config::from_toml_str(toml), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml_str("[orchestrator\nmax_debug_attempts = ");
        assert!(matches!(result, Err(Error::TomlParse(_))));
    }

    #[test]
    fn test_generated_session_id() {
        let id = OrchestratorConfig::default().resolve_session_id();
        assert!(id.starts_with("session-"));
    }
}

mod config_file_tests {
    use super::*;

    #[test]
    fn test_load_from_file() {
        let dir = setup_config_dir();
        let path = dir.path().join("stepwise.toml");
        fs::write(&path, "[compact]\nauto_compact = false\nmax_message_chars = 500\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.compact.auto_compact);
        assert_eq!(config.compact.max_message_chars, 500);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = setup_config_dir();
        let result = Config::load(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_or_default() {
        let dir = setup_config_dir();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.orchestrator.max_debug_attempts, 3);

        let path = dir.path().join("present.toml");
        fs::write(&path, "[orchestrator]\nmax_debug_attempts = 1\n").unwrap();
        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.orchestrator.max_debug_attempts, 1);
    }
}
