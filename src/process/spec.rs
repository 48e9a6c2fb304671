//! Process configuration built with chained calls.
//!
//! A [`ProcessSpec`] describes what to run and how its output is treated.
//! Nothing is validated or rendered until it is handed to a
//! [`ProcessSupervisor`](super::ProcessSupervisor).

use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};

use tracing::Level;

use super::args::{render_fragments, ArgFlags, ArgItem, ArgValue, Fragment};
use super::lines::{Filter, FilterEvent};
use super::ProcessError;
use crate::env::Env;

/// Behavior switches for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    /// A nonzero exit code is logged instead of failing the run.
    pub allow_failure: bool,
    /// Interrupting kills the child instead of signalling it.
    pub terminate_on_interrupt: bool,
}

impl RunFlags {
    pub const NONE: Self = Self {
        allow_failure: false,
        terminate_on_interrupt: false,
    };
    pub const ALLOW_FAILURE: Self = Self {
        allow_failure: true,
        terminate_on_interrupt: false,
    };
    pub const TERMINATE_ON_INTERRUPT: Self = Self {
        allow_failure: false,
        terminate_on_interrupt: true,
    };
}

impl BitOr for RunFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            allow_failure: self.allow_failure || rhs.allow_failure,
            terminate_on_interrupt: self.terminate_on_interrupt || rhs.terminate_on_interrupt,
        }
    }
}

/// The command-producing part of a spec.
#[derive(Debug, Clone, Default)]
struct CommandSource {
    binary: Option<PathBuf>,
    fragments: Vec<Fragment>,
    raw: Option<RawCommand>,
}

#[derive(Debug, Clone)]
enum RawCommand {
    Text(String),
    Pipeline(Vec<CommandSource>),
}

impl CommandSource {
    fn render(&self, verbose_logging: bool) -> Option<String> {
        match &self.raw {
            Some(RawCommand::Text(text)) => Some(text.clone()),
            Some(RawCommand::Pipeline(stages)) => {
                let stages = stages
                    .iter()
                    .map(|s| s.render(verbose_logging))
                    .collect::<Option<Vec<_>>>()?;
                Some(stages.join(" | "))
            }
            None => {
                let binary = self.binary.as_ref()?;
                Some(format!(
                    "\"{}\"{}",
                    binary.display(),
                    render_fragments(&self.fragments, verbose_logging)
                ))
            }
        }
    }
}

/// Everything needed to launch and supervise one command.
pub struct ProcessSpec {
    name: Option<String>,
    source: CommandSource,
    cwd: Option<PathBuf>,
    env: Option<Env>,
    flags: RunFlags,
    stdout_level: Level,
    stderr_level: Level,
    stdout_filter: Option<Filter>,
    stderr_filter: Option<Filter>,
}

impl fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSpec")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("cwd", &self.cwd)
            .field("env", &self.env.as_ref().map(Env::len))
            .field("flags", &self.flags)
            .field("stdout_level", &self.stdout_level)
            .field("stderr_level", &self.stderr_level)
            .field("stdout_filter", &self.stdout_filter.is_some())
            .field("stderr_filter", &self.stderr_filter.is_some())
            .finish()
    }
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSpec {
    /// An empty spec; stdout is logged at trace, stderr at error.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: None,
            source: CommandSource::default(),
            cwd: None,
            env: None,
            flags: RunFlags::NONE,
            stdout_level: Level::TRACE,
            stderr_level: Level::ERROR,
            stdout_filter: None,
            stderr_filter: None,
        }
    }

    /// A spec that runs exactly `text`.
    #[must_use]
    pub fn raw(text: impl Into<String>) -> Self {
        let mut spec = Self::new();
        spec.source.raw = Some(RawCommand::Text(text.into()));
        spec
    }

    /// Chain `first` into every spec in `rest` with `|`.
    ///
    /// Only the command text of the later stages is kept; name, working
    /// directory, environment, flags, levels and filters all come from
    /// `first`.
    #[must_use]
    pub fn pipe<I>(first: ProcessSpec, rest: I) -> ProcessSpec
    where
        I: IntoIterator<Item = ProcessSpec>,
    {
        let mut stages = vec![first.source.clone()];
        stages.extend(rest.into_iter().map(|p| p.source));

        let mut spec = first;
        spec.source.raw = Some(RawCommand::Pipeline(stages));
        spec
    }

    #[must_use]
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.source.binary = Some(path.into());
        self
    }

    /// Set the working directory; it is created on run if missing.
    #[must_use]
    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.cwd = Some(path.into());
        self
    }

    /// Name used in error messages instead of the command text.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a bare value.
    #[must_use]
    pub fn arg(self, value: impl ArgValue) -> Self {
        self.arg_with(value, ArgFlags::NONE)
    }

    #[must_use]
    pub fn arg_with(mut self, value: impl ArgValue, flags: ArgFlags) -> Self {
        let value = value.to_arg(flags.quote);
        self.source.fragments.push(Fragment::new("", value, flags));
        self
    }

    /// Append `key value`, or `keyvalue` when the key ends with `=`.
    #[must_use]
    pub fn kv(self, key: impl Into<String>, value: impl ArgValue) -> Self {
        self.kv_with(key, value, ArgFlags::NONE)
    }

    #[must_use]
    pub fn kv_with(mut self, key: impl Into<String>, value: impl ArgValue, flags: ArgFlags) -> Self {
        let value = value.to_arg(flags.quote);
        self.source.fragments.push(Fragment::new(key, value, flags));
        self
    }

    /// Append one fragment per item.
    #[must_use]
    pub fn args<I>(mut self, items: I, flags: ArgFlags) -> Self
    where
        I: IntoIterator,
        I::Item: ArgItem,
    {
        self.source
            .fragments
            .extend(items.into_iter().map(|item| item.into_fragment(flags)));
        self
    }

    /// Run the child with exactly this environment.
    #[must_use]
    pub fn env(mut self, env: Env) -> Self {
        self.env = Some(env);
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn stdout_level(mut self, level: Level) -> Self {
        self.stdout_level = level;
        self
    }

    #[must_use]
    pub fn stderr_level(mut self, level: Level) -> Self {
        self.stderr_level = level;
        self
    }

    #[must_use]
    pub fn stdout_filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&mut FilterEvent<'_>) + Send + 'static,
    {
        self.stdout_filter = Some(Box::new(filter));
        self
    }

    #[must_use]
    pub fn stderr_filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&mut FilterEvent<'_>) + Send + 'static,
    {
        self.stderr_filter = Some(Box::new(filter));
        self
    }

    /// The resolved command text handed to the interpreter.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::NoCommand` if neither a binary nor a raw
    /// command was set (for any stage of a pipeline).
    pub fn command_line(&self, verbose_logging: bool) -> Result<String, ProcessError> {
        self.source
            .render(verbose_logging)
            .ok_or(ProcessError::NoCommand)
    }

    /// The configured name, or the command text when there is none.
    #[must_use]
    pub fn display_name(&self, verbose_logging: bool) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.command_line(verbose_logging).unwrap_or_default()
    }

    #[must_use]
    pub fn get_binary(&self) -> Option<&Path> {
        self.source.binary.as_deref()
    }

    #[must_use]
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    #[must_use]
    pub fn get_env(&self) -> Option<&Env> {
        self.env.as_ref()
    }

    #[must_use]
    pub fn get_flags(&self) -> RunFlags {
        self.flags
    }

    #[must_use]
    pub fn get_stdout_level(&self) -> Level {
        self.stdout_level
    }

    #[must_use]
    pub fn get_stderr_level(&self) -> Level {
        self.stderr_level
    }

    pub(crate) fn take_filters(&mut self) -> (Option<Filter>, Option<Filter>) {
        (self.stdout_filter.take(), self.stderr_filter.take())
    }
}
