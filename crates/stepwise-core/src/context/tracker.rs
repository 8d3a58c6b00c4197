//! Context tracking for token usage and the auto-compact trigger
//!
//! Uses LLM-reported prompt token counts. The prompt size of the last response
//! IS the current context size, so readings overwrite instead of accumulating.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{defaults, ContextConfig};
use crate::error::{Error, Result};

/// Context usage derived from the last token reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextUsageInfo {
    pub current_tokens: u64,
    pub max_tokens: usize,
    /// `round(current / max * 100)`
    pub usage_percentage: u32,
    /// `max(0, 100 - usage_percentage)`
    pub remaining_percentage: u32,
    /// `usage_percentage >= threshold`
    pub should_auto_compact: bool,
}

/// Tracks the last prompt token count of a session and decides when to compact
///
/// The trigger is edge-detected: [`ContextTracker::should_trigger_auto_compact`]
/// fires once per crossing and stays quiet until re-armed.
#[derive(Debug, Clone)]
pub struct ContextTracker {
    current_tokens: u64,
    threshold: u32,
    auto_compact_triggered: bool,
    recent_files: VecDeque<String>,
    max_recent_files: usize,
}

impl Default for ContextTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTracker {
    pub fn new() -> Self {
        Self {
            current_tokens: 0,
            threshold: defaults::COMPACT_THRESHOLD,
            auto_compact_triggered: false,
            recent_files: VecDeque::new(),
            max_recent_files: defaults::MAX_RECENT_FILES,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Result<Self> {
        let mut tracker = Self::new();
        tracker.set_threshold(config.threshold)?;
        tracker.max_recent_files = config.max_recent_files.max(1);
        Ok(tracker)
    }

    /// Record the prompt token count of the latest model response
    pub fn update_usage(&mut self, prompt_tokens: u64) {
        debug!(prompt_tokens, "Context usage updated");
        self.current_tokens = prompt_tokens;
    }

    pub fn current_tokens(&self) -> u64 {
        self.current_tokens
    }

    /// Usage relative to `model_max_tokens` (128000 when zero)
    pub fn context_usage(&self, model_max_tokens: usize) -> ContextUsageInfo {
        let max_tokens = if model_max_tokens == 0 {
            defaults::MODEL_MAX_TOKENS
        } else {
            model_max_tokens
        };
        let usage_percentage =
            (self.current_tokens as f64 / max_tokens as f64 * 100.0).round() as u32;

        ContextUsageInfo {
            current_tokens: self.current_tokens,
            max_tokens,
            usage_percentage,
            remaining_percentage: 100u32.saturating_sub(usage_percentage),
            should_auto_compact: usage_percentage >= self.threshold,
        }
    }

    /// True only on the first call that sees usage at or above the threshold
    ///
    /// Subsequent calls return false until [`Self::reset_auto_compact_trigger`]
    /// or [`Self::reset`] re-arms the trigger.
    pub fn should_trigger_auto_compact(&mut self, model_max_tokens: usize) -> bool {
        let usage = self.context_usage(model_max_tokens);
        if !usage.should_auto_compact || self.auto_compact_triggered {
            return false;
        }

        self.auto_compact_triggered = true;
        info!(
            usage_percentage = usage.usage_percentage,
            threshold = self.threshold,
            "Auto-compact threshold crossed"
        );
        true
    }

    /// Re-arm the trigger without dropping the token reading
    pub fn reset_auto_compact_trigger(&mut self) {
        self.auto_compact_triggered = false;
    }

    /// Zero the reading, re-arm the trigger and forget recent files
    pub fn reset(&mut self) {
        self.current_tokens = 0;
        self.auto_compact_triggered = false;
        self.recent_files.clear();
    }

    /// Remember a touched file; the oldest entry is evicted past the cap
    pub fn track_file_access(&mut self, path: impl Into<String>) {
        let path = path.into();
        if let Some(pos) = self.recent_files.iter().position(|p| *p == path) {
            self.recent_files.remove(pos);
        }
        self.recent_files.push_back(path);
        while self.recent_files.len() > self.max_recent_files {
            self.recent_files.pop_front();
        }
    }

    /// Recently touched files, most recent first
    pub fn recent_files(&self) -> Vec<String> {
        self.recent_files.iter().rev().cloned().collect()
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Set the compaction threshold; valid range is (0, 100]
    pub fn set_threshold(&mut self, percentage: u32) -> Result<()> {
        if percentage == 0 || percentage > 100 {
            return Err(Error::Config(format!(
                "Compaction threshold must be in (0, 100], got {}",
                percentage
            )));
        }
        self.threshold = percentage;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let tracker = ContextTracker::new();
        let usage = tracker.context_usage(100_000);
        assert_eq!(usage.current_tokens, 0);
        assert_eq!(usage.usage_percentage, 0);
        assert_eq!(usage.remaining_percentage, 100);
        assert!(!usage.should_auto_compact);
    }

    #[test]
    fn test_usage_at_threshold() {
        let mut tracker = ContextTracker::new();
        tracker.update_usage(80_000);

        let usage = tracker.context_usage(100_000);
        assert_eq!(usage.usage_percentage, 80);
        assert_eq!(usage.remaining_percentage, 20);
        assert!(usage.should_auto_compact);
    }

    #[test]
    fn test_update_overwrites() {
        let mut tracker = ContextTracker::new();
        tracker.update_usage(50_000);
        tracker.update_usage(10_000);
        assert_eq!(tracker.current_tokens(), 10_000);
    }

    #[test]
    fn test_zero_max_uses_default() {
        let mut tracker = ContextTracker::new();
        tracker.update_usage(64_000);
        let usage = tracker.context_usage(0);
        assert_eq!(usage.max_tokens, 128_000);
        assert_eq!(usage.usage_percentage, 50);
    }

    #[test]
    fn test_over_limit_clamps_remaining() {
        let mut tracker = ContextTracker::new();
        tracker.update_usage(150_000);
        let usage = tracker.context_usage(100_000);
        assert_eq!(usage.usage_percentage, 150);
        assert_eq!(usage.remaining_percentage, 0);
    }

    #[test]
    fn test_trigger_fires_once() {
        let mut tracker = ContextTracker::new();
        tracker.update_usage(10_000);
        assert!(!tracker.should_trigger_auto_compact(100_000));

        tracker.update_usage(85_000);
        assert!(tracker.should_trigger_auto_compact(100_000));
        assert!(!tracker.should_trigger_auto_compact(100_000));
        tracker.update_usage(95_000);
        assert!(!tracker.should_trigger_auto_compact(100_000));

        tracker.reset_auto_compact_trigger();
        assert_eq!(tracker.current_tokens(), 95_000);
        assert!(tracker.should_trigger_auto_compact(100_000));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = ContextTracker::new();
        tracker.update_usage(90_000);
        tracker.track_file_access("src/main.rs");
        assert!(tracker.should_trigger_auto_compact(100_000));

        tracker.reset();
        assert_eq!(tracker.current_tokens(), 0);
        assert!(tracker.recent_files().is_empty());

        tracker.update_usage(90_000);
        assert!(tracker.should_trigger_auto_compact(100_000));
    }

    #[test]
    fn test_recent_files_bounded() {
        let mut tracker = ContextTracker::from_config(&ContextConfig {
            max_recent_files: 3,
            ..Default::default()
        })
        .unwrap();

        for name in ["a", "b", "c", "d"] {
            tracker.track_file_access(name);
        }
        assert_eq!(tracker.recent_files(), vec!["d", "c", "b"]);

        // Re-touching moves a file to the front without duplicating it
        tracker.track_file_access("b");
        assert_eq!(tracker.recent_files(), vec!["b", "d", "c"]);
    }

    #[test]
    fn test_threshold_validation() {
        let mut tracker = ContextTracker::new();
        assert_eq!(tracker.threshold(), 80);
        assert!(tracker.set_threshold(0).is_err());
        assert!(tracker.set_threshold(101).is_err());
        tracker.set_threshold(50).unwrap();
        assert_eq!(tracker.threshold(), 50);

        tracker.update_usage(50_000);
        assert!(tracker.context_usage(100_000).should_auto_compact);
    }
}
