//! Process error types.

use std::path::PathBuf;

use crate::context::Reason;

/// Fatal failures while running a supervised process.
///
/// Recoverable results (allowed failures, interrupted runs) are reported
/// through [`ExitOutcome`](super::ExitOutcome) instead.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// Neither a binary nor a raw command was configured.
    #[error("no command to run: set a binary or a raw command")]
    NoCommand,

    /// `run` was called on a supervisor that already started its process.
    #[error("process was already started")]
    AlreadyStarted,

    /// The working directory could not be created.
    #[error("failed to create working directory {path}: {source}")]
    WorkingDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The command interpreter could not be started.
    #[error("failed to start '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        source: std::io::Error,
    },

    /// An output channel was not available after spawning.
    #[error("{0} channel not available")]
    ChannelUnavailable(Reason),

    /// Reading from an output channel failed.
    #[error("{reason} channel read failed: {source}")]
    Read {
        reason: Reason,
        source: std::io::Error,
    },

    /// Waiting on the child failed.
    #[error("failed to wait on process: {0}")]
    Wait(#[source] std::io::Error),

    /// The child exited with a nonzero code and failure was not allowed.
    #[error("{name} returned {code}")]
    ExitCode { name: String, code: i32 },
}

impl ProcessError {
    /// The OS error code behind this failure, if there is one.
    #[must_use]
    pub fn os_error(&self) -> Option<i32> {
        match self {
            Self::WorkingDir { source, .. }
            | Self::Spawn { source, .. }
            | Self::Read { source, .. }
            | Self::Wait(source) => source.raw_os_error(),
            Self::NoCommand
            | Self::AlreadyStarted
            | Self::ChannelUnavailable(_)
            | Self::ExitCode { .. } => None,
        }
    }
}
