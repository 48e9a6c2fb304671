//! Logging collaborator for supervised processes.
//!
//! Every message produced while running a command, whether it comes from the
//! supervisor itself or from a line of child output, is delivered to a
//! [`LogSink`] as a `(reason, level, message)` triple.

use std::fmt;
use std::sync::Mutex;

use tracing::Level;

/// Where a log message originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    /// Supervisor lifecycle messages and the command line itself.
    Command,
    /// A line read from the child's stdout.
    Stdout,
    /// A line read from the child's stderr.
    Stderr,
}

impl Reason {
    /// Short tag used in log output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "cmd",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives log events from the process core.
pub trait LogSink: Send + Sync {
    fn log(&self, reason: Reason, level: Level, message: &str);

    fn trace(&self, reason: Reason, message: &str) {
        self.log(reason, Level::TRACE, message);
    }

    fn debug(&self, reason: Reason, message: &str) {
        self.log(reason, Level::DEBUG, message);
    }

    fn error(&self, reason: Reason, message: &str) {
        self.log(reason, Level::ERROR, message);
    }
}

/// Forwards events to `tracing` at the event's own level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, reason: Reason, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(reason = %reason, "{message}"),
            Level::WARN => tracing::warn!(reason = %reason, "{message}"),
            Level::INFO => tracing::info!(reason = %reason, "{message}"),
            Level::DEBUG => tracing::debug!(reason = %reason, "{message}"),
            _ => tracing::trace!(reason = %reason, "{message}"),
        }
    }
}

/// A single recorded log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub reason: Reason,
    pub level: Level,
    pub message: String,
}

/// Records every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Messages recorded for one reason, in order.
    #[must_use]
    pub fn messages(&self, reason: Reason) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .map(|e| e.message)
            .collect()
    }

    /// Whether any event for `reason` contains `needle`.
    #[must_use]
    pub fn contains(&self, reason: Reason, needle: &str) -> bool {
        self.messages(reason).iter().any(|m| m.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, reason: Reason, level: Level, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(LogEvent {
                reason,
                level,
                message: message.to_string(),
            });
        }
    }
}
