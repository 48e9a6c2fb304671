//! Configuration types.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobConfig {
    /// Log commands instead of running them.
    pub dry_run: bool,
    /// Verbose logging; also selects verbose-only command arguments.
    pub verbose: bool,
    /// Process supervision settings.
    pub process: ProcessConfig,
}

/// Process supervision settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// How long each join iteration waits on the child, in milliseconds.
    pub poll_interval_ms: u64,
    /// How long a pending pipe read is waited on, in milliseconds.
    pub pipe_wait_ms: u64,
    /// Command interpreter; defaults to `/bin/sh` or `%COMSPEC%`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            pipe_wait_ms: 500,
            interpreter: None,
        }
    }
}
