//! In-memory run log
//!
//! Every entry is also forwarded to `tracing`; the retained copy lets a host
//! show what happened in a run without installing a subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Log entries of one orchestrator; debug entries are kept only when verbose
#[derive(Debug, Default)]
pub(crate) struct RunLog {
    session_id: String,
    verbose: bool,
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub(crate) fn new(session_id: impl Into<String>, verbose: bool) -> Self {
        Self {
            session_id: session_id.into(),
            verbose,
            entries: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        let session_id = self.session_id.as_str();
        match level {
            LogLevel::Debug => debug!(session_id, "{}", message),
            LogLevel::Info => info!(session_id, "{}", message),
            LogLevel::Warn => warn!(session_id, "{}", message),
            LogLevel::Error => error!(session_id, "{}", message),
        }

        if level == LogLevel::Debug && !self.verbose {
            return;
        }
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message,
        });
    }

    pub(crate) fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}
