//! Context management for agent execution
//!
//! This module provides:
//! - Token usage tracking and the one-shot compaction trigger (tracker)
//! - Conversation compaction (compact, prompts)

mod compact;
pub mod prompts;
mod tracker;

pub use compact::{CompactManager, CompactResult};
pub use tracker::{ContextTracker, ContextUsageInfo};
