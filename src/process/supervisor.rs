//! Running a [`ProcessSpec`] and supervising the child until it ends.
//!
//! The supervisor spawns the command through the platform interpreter, then
//! [`join`](ProcessSupervisor::join) polls the child at a fixed interval.
//! Each iteration drains stdout and stderr into the log, and checks the
//! interrupt flag, which is the only state another thread may touch.

use std::fmt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;

use super::channel::{OutputChannel, DEFAULT_PENDING_WAIT};
use super::lines::LineReader;
use super::shell;
use super::{ProcessError, ProcessSpec, RunFlags};
use crate::config::MobConfig;
use crate::context::{LogSink, Reason, TracingSink};

/// How long each join iteration waits on the child.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Switches and timings passed to [`ProcessSupervisor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Log the command but do not start it.
    pub dry_run: bool,
    /// Verbose logging; selects verbose or quiet arguments.
    pub verbose: bool,
    pub poll_interval: Duration,
    pub pipe_wait: Duration,
    pub interpreter: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            verbose: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            pipe_wait: DEFAULT_PENDING_WAIT,
            interpreter: shell::default_interpreter(),
        }
    }
}

impl RunOptions {
    #[must_use]
    pub fn from_config(config: &MobConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            verbose: config.verbose,
            poll_interval: Duration::from_millis(config.process.poll_interval_ms),
            pipe_wait: Duration::from_millis(config.process.pipe_wait_ms),
            interpreter: config
                .process
                .interpreter
                .clone()
                .unwrap_or_else(shell::default_interpreter),
        }
    }
}

/// Lifecycle of a supervised process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessState {
    #[default]
    Configured,
    Running,
    Terminated(i32),
    Killed,
}

/// How a join ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Nothing was started (dry run, or `run` never called).
    NotStarted,
    /// Exited with code 0.
    Success,
    /// Exited nonzero with `allow_failure` set.
    AllowedFailure(i32),
    /// Exited after an interrupt; the code was not judged.
    Interrupted(i32),
    /// Forcibly killed after an interrupt.
    Killed,
}

/// Cloneable handle for interrupting a process from another task or thread.
#[derive(Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
    sink: Arc<dyn LogSink>,
}

impl fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptHandle")
            .field("interrupted", &self.is_interrupted())
            .finish_non_exhaustive()
    }
}

impl InterruptHandle {
    /// Request that the process stop; acted on at the next poll.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.sink.trace(Reason::Command, "will interrupt");
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One output stream: the channel it is read from and the line splitter
/// it is fed through.
#[derive(Debug)]
struct Stream {
    channel: OutputChannel,
    lines: LineReader,
}

impl Stream {
    async fn pump(&mut self, sink: &dyn LogSink) -> Result<usize, ProcessError> {
        let chunk = self.channel.read().await?;
        self.lines.feed(chunk, sink);
        Ok(chunk.len())
    }

    /// Read until the stream ends, an immediate read finds nothing, or an
    /// outstanding read times out.
    async fn drain(&mut self, sink: &dyn LogSink) -> Result<(), ProcessError> {
        loop {
            let was_pending = self.channel.is_pending();
            let n = self.pump(sink).await?;
            if n == 0 && (was_pending || self.channel.is_closed()) {
                break;
            }
        }
        self.lines.finish(sink);
        Ok(())
    }
}

/// Everything owned by a started child. Stays inside the supervisor until
/// a terminal state is recorded, so a cancelled join can be resumed.
struct RunningProcess {
    name: String,
    flags: RunFlags,
    child: Child,
    stdout: Stream,
    stderr: Stream,
    interrupt: Arc<AtomicBool>,
    sink: Arc<dyn LogSink>,
    poll_interval: Duration,
    /// The graceful interrupt was already sent.
    break_sent: bool,
    /// A forced kill was already issued.
    killed: bool,
    terminal: Option<ProcessState>,
}

impl RunningProcess {
    async fn join(&mut self) -> Result<ExitOutcome, ProcessError> {
        self.sink.trace(Reason::Command, "joining");

        loop {
            let waited = tokio::time::timeout(self.poll_interval, self.child.wait()).await;

            match waited {
                Ok(Ok(status)) if self.killed => return Ok(self.reaped(status)),
                Ok(Ok(status)) => return self.exited(status).await,
                Ok(Err(e)) => return Err(ProcessError::Wait(e)),
                Err(_) => {
                    self.pump().await?;

                    if self.break_sent || !self.interrupt.load(Ordering::SeqCst) {
                        continue;
                    }

                    if self.flags.terminate_on_interrupt {
                        self.sink
                            .trace(Reason::Command, "terminating process (flag is set)");
                        return self.kill().await;
                    }

                    let Some(pid) = self.child.id() else {
                        self.sink.error(
                            Reason::Command,
                            "process id unavailable, terminating instead",
                        );
                        return self.kill().await;
                    };

                    self.sink
                        .error(Reason::Command, &format!("sending interrupt to {pid}"));

                    if let Err(e) = shell::send_break(pid) {
                        self.sink.error(
                            Reason::Command,
                            &format!("failed to interrupt {pid} ({e}), terminating instead"),
                        );
                        return self.kill().await;
                    }

                    self.break_sent = true;
                }
            }
        }
    }

    async fn pump(&mut self) -> Result<(), ProcessError> {
        self.stdout.pump(&*self.sink).await?;
        self.stderr.pump(&*self.sink).await?;
        Ok(())
    }

    async fn exited(&mut self, status: ExitStatus) -> Result<ExitOutcome, ProcessError> {
        let code = shell::exit_code(status);

        self.stdout.drain(&*self.sink).await?;
        self.stderr.drain(&*self.sink).await?;

        self.sink.debug(
            Reason::Command,
            &format!("process completed, exit code {code}"),
        );
        self.terminal = Some(ProcessState::Terminated(code));

        if self.interrupt.load(Ordering::SeqCst) {
            if self.break_sent {
                self.sink
                    .trace(Reason::Command, "process interrupted and finished");
            }
            return Ok(ExitOutcome::Interrupted(code));
        }

        if code == 0 {
            return Ok(ExitOutcome::Success);
        }

        if self.flags.allow_failure {
            self.sink.debug(
                Reason::Command,
                "process failed but failure was allowed",
            );
            return Ok(ExitOutcome::AllowedFailure(code));
        }

        Err(ProcessError::ExitCode {
            name: self.name.clone(),
            code,
        })
    }

    async fn kill(&mut self) -> Result<ExitOutcome, ProcessError> {
        if !self.killed {
            let group_killed = self
                .child
                .id()
                .is_some_and(|pid| shell::kill_group(pid).is_ok());

            if !group_killed {
                if let Err(e) = self.child.start_kill() {
                    self.sink
                        .error(Reason::Command, &format!("failed to kill process: {e}"));
                }
            }
            self.killed = true;
        }

        let status = self.child.wait().await.map_err(ProcessError::Wait)?;
        Ok(self.reaped(status))
    }

    /// Record a forced kill once the child is gone.
    fn reaped(&mut self, status: ExitStatus) -> ExitOutcome {
        self.stdout.lines.finish(&*self.sink);
        self.stderr.lines.finish(&*self.sink);

        self.sink.debug(
            Reason::Command,
            &format!("process killed, exit code {}", shell::exit_code(status)),
        );
        self.terminal = Some(ProcessState::Killed);

        ExitOutcome::Killed
    }
}

/// Runs one [`ProcessSpec`] and supervises the child.
pub struct ProcessSupervisor {
    spec: ProcessSpec,
    sink: Arc<dyn LogSink>,
    interrupt: Arc<AtomicBool>,
    state: ProcessState,
    /// Display name of the started command, for repeated failure reports.
    name: String,
    running: Option<RunningProcess>,
    outcome: Option<ExitOutcome>,
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("spec", &self.spec)
            .field("state", &self.state)
            .field("interrupted", &self.interrupt.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(spec: ProcessSpec, sink: Arc<dyn LogSink>) -> Self {
        Self {
            spec,
            sink,
            interrupt: Arc::new(AtomicBool::new(false)),
            state: ProcessState::Configured,
            name: String::new(),
            running: None,
            outcome: None,
        }
    }

    /// A supervisor that logs through `tracing`.
    #[must_use]
    pub fn with_tracing(spec: ProcessSpec) -> Self {
        Self::new(spec, Arc::new(TracingSink))
    }

    #[must_use]
    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Exit code of a child that terminated on its own.
    ///
    /// `None` before the child has terminated and after a forced kill.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            ProcessState::Terminated(code) => Some(code),
            _ => None,
        }
    }

    /// Request that the process stop; acted on at the next poll.
    pub fn interrupt(&self) {
        self.interrupt_handle().interrupt();
    }

    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            flag: Arc::clone(&self.interrupt),
            sink: Arc::clone(&self.sink),
        }
    }

    /// Log the command and start it, unless this is a dry run.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no command, if it was already started,
    /// if the working directory cannot be created, or if the interpreter
    /// fails to start.
    pub async fn run(&mut self, options: &RunOptions) -> Result<(), ProcessError> {
        if self.state != ProcessState::Configured {
            return Err(ProcessError::AlreadyStarted);
        }

        let what = self.spec.command_line(options.verbose)?;

        if let Some(cwd) = self.spec.get_cwd() {
            self.sink
                .debug(Reason::Command, &format!("> cd {}", cwd.display()));
        }
        self.sink.debug(Reason::Command, &format!("> {what}"));

        if options.dry_run {
            return Ok(());
        }

        let mut cmd = shell::interpreter_command(&options.interpreter, &what);
        cmd.kill_on_drop(true);

        if let Some(cwd) = self.spec.get_cwd() {
            tokio::fs::create_dir_all(cwd)
                .await
                .map_err(|source| ProcessError::WorkingDir {
                    path: cwd.to_path_buf(),
                    source,
                })?;
            cmd.current_dir(cwd);
        }

        if let Some(env) = self.spec.get_env() {
            cmd.env_clear();
            cmd.envs(env.iter());
        }

        self.sink.trace(Reason::Command, "creating process");

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            interpreter: options.interpreter.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::ChannelUnavailable(Reason::Stdout))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::ChannelUnavailable(Reason::Stderr))?;

        if let Some(pid) = child.id() {
            self.sink.trace(Reason::Command, &format!("pid {pid}"));
        }

        let (stdout_filter, stderr_filter) = self.spec.take_filters();
        self.name = self.spec.display_name(options.verbose);

        self.running = Some(RunningProcess {
            name: self.name.clone(),
            flags: self.spec.get_flags(),
            child,
            stdout: Stream {
                channel: OutputChannel::new(Reason::Stdout, stdout)
                    .with_pending_wait(options.pipe_wait),
                lines: LineReader::new(
                    Reason::Stdout,
                    self.spec.get_stdout_level(),
                    stdout_filter,
                ),
            },
            stderr: Stream {
                channel: OutputChannel::new(Reason::Stderr, stderr)
                    .with_pending_wait(options.pipe_wait),
                lines: LineReader::new(
                    Reason::Stderr,
                    self.spec.get_stderr_level(),
                    stderr_filter,
                ),
            },
            interrupt: Arc::clone(&self.interrupt),
            sink: Arc::clone(&self.sink),
            poll_interval: options.poll_interval,
            break_sent: false,
            killed: false,
            terminal: None,
        });
        self.state = ProcessState::Running;

        Ok(())
    }

    /// Supervise the child until it terminates.
    ///
    /// A no-op when nothing was started. Once the child has terminated, a
    /// repeated call reports the same result again. Dropping the returned
    /// future leaves the child running; a later call picks up where it
    /// stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting or reading fails, or if the child exits
    /// nonzero without `allow_failure` and was not interrupted.
    pub async fn join(&mut self) -> Result<ExitOutcome, ProcessError> {
        let Some(running) = self.running.as_mut() else {
            return self.finished();
        };

        let result = running.join().await;

        if let Some(state) = running.terminal {
            self.state = state;
            self.running = None;
        }
        if let Ok(outcome) = result {
            self.outcome = Some(outcome);
        }

        result
    }

    /// Result of a join that already reached a terminal state.
    fn finished(&self) -> Result<ExitOutcome, ProcessError> {
        match (self.outcome, self.state) {
            (Some(outcome), _) => Ok(outcome),
            (None, ProcessState::Terminated(code)) => Err(ProcessError::ExitCode {
                name: self.name.clone(),
                code,
            }),
            (None, _) => Ok(ExitOutcome::NotStarted),
        }
    }

    /// `run` followed by `join`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`run`](Self::run) or [`join`](Self::join).
    pub async fn execute(&mut self, options: &RunOptions) -> Result<ExitOutcome, ProcessError> {
        self.run(options).await?;
        self.join().await
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = running.join().await {
                        tracing::debug!(error = %e, "Discarding error from implicit join");
                    }
                });
            }
            Err(_) => {
                tracing::debug!(name = %running.name, "No runtime to join on, killing process");
                let _ = running.child.start_kill();
            }
        }
    }
}
