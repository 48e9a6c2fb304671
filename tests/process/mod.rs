//! Process module tests.

#[cfg(unix)]
mod supervisor_test;

/// Verify all public process types are exported from the library.
#[test]
fn test_all_process_types_exported() {
    use mob::process::{
        ArgFlags, ExitOutcome, FilterEvent, InterruptHandle, LineReader, OutputChannel,
        ProcessError, ProcessSpec, ProcessState, ProcessSupervisor, RunFlags, RunOptions,
    };

    let _ = ProcessSpec::raw("true").flags(RunFlags::NONE);
    let _ = ArgFlags::QUOTE;
    let _ = RunOptions::default();
    let _ = ProcessState::Configured;
    let _ = ExitOutcome::Success;
    let _: fn() -> ProcessError = || ProcessError::NoCommand;
    let _: Option<InterruptHandle> = None;
    let _: Option<LineReader> = None;
    let _: Option<OutputChannel> = None;
    let _: Option<FilterEvent<'static>> = None;
    let _ = ProcessSupervisor::with_tracing(ProcessSpec::raw("true"));
}
