//! Platform glue: the command interpreter, process groups and signals.

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Interpreter used when the configuration does not name one.
#[must_use]
pub fn default_interpreter() -> String {
    #[cfg(windows)]
    {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    }

    #[cfg(not(windows))]
    {
        "/bin/sh".to_string()
    }
}

/// Build the interpreter invocation for `text`.
///
/// The child gets its own process group, a null stdin and piped
/// stdout/stderr.
pub(crate) fn interpreter_command(interpreter: &str, text: &str) -> Command {
    let mut cmd = Command::new(interpreter);

    #[cfg(windows)]
    {
        cmd.raw_arg(format!("/C \"{text}\""));
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    #[cfg(not(windows))]
    {
        cmd.arg("-c").arg(text);
    }

    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    cmd
}

/// Ask every process in the child's group to stop.
///
/// # Errors
///
/// Returns an error if the signal cannot be delivered, or on platforms
/// without process-group signals.
pub(crate) fn send_break(pid: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGINT)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process group signals are not supported on this platform",
        ))
    }
}

/// Kill every process in the child's group.
///
/// # Errors
///
/// Returns an error if the signal cannot be delivered, or on platforms
/// without process-group signals.
pub(crate) fn kill_group(pid: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process group signals are not supported on this platform",
        ))
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> io::Result<()> {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    killpg(Pid::from_raw(pgid), signal).map_err(io::Error::from)
}

/// Numeric exit code; on Unix a signal death reports `128 + signal`.
#[must_use]
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
