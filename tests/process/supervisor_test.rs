//! Tests for running and supervising real child processes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mob::context::{MemorySink, Reason};
use mob::env::Env;
use mob::process::{
    ExitOutcome, FilterEvent, ProcessError, ProcessSpec, ProcessState, ProcessSupervisor,
    RunFlags, RunOptions,
};
use tracing::Level;

fn fast_options() -> RunOptions {
    RunOptions {
        poll_interval: Duration::from_millis(20),
        pipe_wait: Duration::from_millis(50),
        ..RunOptions::default()
    }
}

fn supervisor(spec: ProcessSpec) -> (ProcessSupervisor, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    (ProcessSupervisor::new(spec, sink.clone()), sink)
}

#[tokio::test]
async fn successful_command_reports_success() {
    let (mut sup, _) = supervisor(ProcessSpec::raw("true"));

    let outcome = sup.execute(&fast_options()).await.unwrap();

    assert_eq!(outcome, ExitOutcome::Success);
    assert_eq!(sup.state(), ProcessState::Terminated(0));
    assert_eq!(sup.exit_code(), Some(0));
}

#[tokio::test]
async fn nonzero_exit_is_an_error_naming_the_command() {
    let (mut sup, _) = supervisor(ProcessSpec::raw("exit 7").name("failing-step"));

    let err = sup.execute(&fast_options()).await.unwrap_err();

    assert!(matches!(err, ProcessError::ExitCode { code: 7, .. }));
    let message = err.to_string();
    assert!(message.contains("failing-step"), "got: {message}");
    assert!(message.contains('7'), "got: {message}");
    assert_eq!(sup.exit_code(), Some(7));
}

#[tokio::test]
async fn nonzero_exit_allowed_when_flag_set() {
    let spec = ProcessSpec::raw("exit 7").flags(RunFlags::ALLOW_FAILURE);
    let (mut sup, _) = supervisor(spec);

    let outcome = sup.execute(&fast_options()).await.unwrap();

    assert_eq!(outcome, ExitOutcome::AllowedFailure(7));
    assert_eq!(sup.exit_code(), Some(7));
}

#[tokio::test]
async fn stdout_and_stderr_are_logged_at_their_levels() {
    let (mut sup, sink) = supervisor(ProcessSpec::raw("echo out-line; echo err-line >&2"));

    sup.execute(&fast_options()).await.unwrap();

    let events = sink.events();
    let out = events
        .iter()
        .find(|e| e.reason == Reason::Stdout)
        .expect("stdout line logged");
    assert_eq!(out.message, "out-line");
    assert_eq!(out.level, Level::TRACE);

    let err = events
        .iter()
        .find(|e| e.reason == Reason::Stderr)
        .expect("stderr line logged");
    assert_eq!(err.message, "err-line");
    assert_eq!(err.level, Level::ERROR);
}

#[tokio::test]
async fn output_split_across_writes_is_reassembled() {
    let spec =
        ProcessSpec::raw("printf 'first '; sleep 0.1; printf 'half\\nsecond\\n'; printf tail");
    let (mut sup, sink) = supervisor(spec);

    sup.execute(&fast_options()).await.unwrap();

    assert_eq!(
        sink.messages(Reason::Stdout),
        vec!["first half", "second", "tail"]
    );
}

#[tokio::test]
async fn custom_stream_levels_are_used() {
    let spec = ProcessSpec::raw("echo warned >&2").stderr_level(Level::WARN);
    let (mut sup, sink) = supervisor(spec);

    sup.execute(&fast_options()).await.unwrap();

    let events = sink.events();
    let warned = events.iter().find(|e| e.reason == Reason::Stderr).unwrap();
    assert_eq!(warned.level, Level::WARN);
}

#[tokio::test]
async fn filters_can_suppress_and_relevel_lines() {
    let spec = ProcessSpec::raw("echo keep; echo drop; echo noisy >&2")
        .stdout_filter(|e: &mut FilterEvent<'_>| {
            if e.line() == "drop" {
                e.suppress = true;
            }
        })
        .stderr_filter(|e: &mut FilterEvent<'_>| {
            if e.line().contains("noisy") {
                e.level = Level::DEBUG;
            }
        });
    let (mut sup, sink) = supervisor(spec);

    sup.execute(&fast_options()).await.unwrap();

    assert_eq!(sink.messages(Reason::Stdout), vec!["keep"]);
    let events = sink.events();
    let noisy = events.iter().find(|e| e.reason == Reason::Stderr).unwrap();
    assert_eq!(noisy.message, "noisy");
    assert_eq!(noisy.level, Level::DEBUG);
}

#[tokio::test]
async fn piped_stages_run_as_one_command() {
    let spec = ProcessSpec::pipe(
        ProcessSpec::raw("printf 'a\\nb\\n'"),
        [ProcessSpec::raw("grep b")],
    );
    let (mut sup, sink) = supervisor(spec);

    sup.execute(&fast_options()).await.unwrap();

    assert_eq!(sink.messages(Reason::Stdout), vec!["b"]);
    assert!(sink.contains(Reason::Command, "> printf 'a\\nb\\n' | grep b"));
}

#[tokio::test]
async fn missing_working_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let cwd = dir.path().join("nested").join("build");
    let spec = ProcessSpec::raw("pwd").cwd(&cwd);
    let (mut sup, sink) = supervisor(spec);

    sup.execute(&fast_options()).await.unwrap();

    assert!(cwd.is_dir());
    let logged = sink.messages(Reason::Stdout);
    assert_eq!(logged.len(), 1);
    assert!(logged[0].ends_with("build"), "got: {logged:?}");
    assert!(sink.contains(Reason::Command, "> cd "));
}

#[tokio::test]
async fn environment_is_passed_verbatim() {
    let env = Env::new().set("MOB_TEST_VALUE", "from-env");
    let spec = ProcessSpec::raw("echo \"$MOB_TEST_VALUE\"; echo \"home=$HOME\"").env(env);
    let (mut sup, sink) = supervisor(spec);

    sup.execute(&fast_options()).await.unwrap();

    assert_eq!(sink.messages(Reason::Stdout), vec!["from-env", "home="]);
}

#[tokio::test]
async fn dry_run_logs_without_starting() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let cwd = dir.path().join("nested");
    let spec = ProcessSpec::raw(format!("touch '{}'", marker.display())).cwd(&cwd);
    let (mut sup, sink) = supervisor(spec);
    let options = RunOptions {
        dry_run: true,
        ..fast_options()
    };

    let outcome = sup.execute(&options).await.unwrap();

    assert_eq!(outcome, ExitOutcome::NotStarted);
    assert_eq!(sup.state(), ProcessState::Configured);
    assert!(sup.exit_code().is_none());
    assert!(sink.contains(Reason::Command, "> cd "));
    assert!(sink.contains(Reason::Command, "> touch"));
    assert!(!cwd.exists());
    assert!(!marker.exists());
}

#[tokio::test]
async fn second_run_is_rejected() {
    let (mut sup, _) = supervisor(ProcessSpec::raw("true"));

    sup.execute(&fast_options()).await.unwrap();
    let err = sup.run(&fast_options()).await.unwrap_err();

    assert!(matches!(err, ProcessError::AlreadyStarted));
}

#[tokio::test]
async fn repeated_join_returns_previous_outcome() {
    let (mut sup, _) = supervisor(ProcessSpec::raw("true"));

    assert_eq!(sup.execute(&fast_options()).await.unwrap(), ExitOutcome::Success);
    assert_eq!(sup.join().await.unwrap(), ExitOutcome::Success);
}

#[tokio::test]
async fn repeated_join_after_failure_reports_failure_again() {
    let (mut sup, _) = supervisor(ProcessSpec::raw("exit 7").name("failing-step"));

    assert!(sup.execute(&fast_options()).await.is_err());
    let err = sup.join().await.unwrap_err();

    assert!(matches!(err, ProcessError::ExitCode { code: 7, .. }));
    assert_eq!(err.to_string(), "failing-step returned 7");
    assert_eq!(sup.state(), ProcessState::Terminated(7));
}

#[tokio::test]
async fn cancelled_join_can_be_resumed() {
    let (mut sup, sink) = supervisor(ProcessSpec::raw("sleep 0.5; echo done"));

    sup.run(&fast_options()).await.unwrap();
    let cancelled = tokio::time::timeout(Duration::from_millis(150), sup.join()).await;
    assert!(cancelled.is_err());

    assert_eq!(sup.state(), ProcessState::Running);
    assert!(sup.exit_code().is_none());

    let outcome = sup.join().await.unwrap();

    assert_eq!(outcome, ExitOutcome::Success);
    assert_eq!(sup.exit_code(), Some(0));
    assert_eq!(sink.messages(Reason::Stdout), vec!["done"]);
}

#[tokio::test]
async fn missing_interpreter_fails_to_spawn() {
    let (mut sup, _) = supervisor(ProcessSpec::raw("true"));
    let options = RunOptions {
        interpreter: "/nonexistent/mob-shell".to_string(),
        ..fast_options()
    };

    let err = sup.run(&options).await.unwrap_err();

    assert!(matches!(err, ProcessError::Spawn { .. }));
    assert!(err.os_error().is_some());
    assert_eq!(sup.state(), ProcessState::Configured);
}

#[tokio::test]
async fn interrupt_with_terminate_flag_kills_process() {
    let spec = ProcessSpec::raw("sleep 5").flags(RunFlags::TERMINATE_ON_INTERRUPT);
    let (mut sup, sink) = supervisor(spec);

    sup.run(&fast_options()).await.unwrap();
    sup.interrupt();

    let started = Instant::now();
    let outcome = sup.join().await.unwrap();

    assert_eq!(outcome, ExitOutcome::Killed);
    assert_eq!(sup.state(), ProcessState::Killed);
    assert!(sup.exit_code().is_none());
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(sink.contains(Reason::Command, "terminating process"));
}

#[tokio::test]
async fn interrupt_stops_process_gracefully() {
    let (mut sup, sink) = supervisor(ProcessSpec::raw("sleep 5"));

    sup.run(&fast_options()).await.unwrap();
    sup.interrupt();

    let started = Instant::now();
    let outcome = sup.join().await.unwrap();

    assert!(matches!(outcome, ExitOutcome::Interrupted(_)), "got {outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(sink.contains(Reason::Command, "sending interrupt"));
}

#[tokio::test]
async fn interrupt_is_sent_once_and_exit_code_not_judged() {
    let spec = ProcessSpec::raw("trap '' INT; sleep 1; exit 3");
    let (mut sup, sink) = supervisor(spec);

    sup.run(&fast_options()).await.unwrap();
    // give the shell time to install the trap
    tokio::time::sleep(Duration::from_millis(200)).await;
    sup.interrupt();
    let outcome = sup.join().await.unwrap();

    assert_eq!(outcome, ExitOutcome::Interrupted(3));
    assert_eq!(sup.exit_code(), Some(3));
    let sent = sink
        .messages(Reason::Command)
        .into_iter()
        .filter(|m| m.contains("sending interrupt"))
        .count();
    assert_eq!(sent, 1);
}

#[tokio::test]
async fn interrupt_from_another_task() {
    let (mut sup, sink) = supervisor(ProcessSpec::raw("sleep 5"));
    let handle = sup.interrupt_handle();

    sup.run(&fast_options()).await.unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.interrupt();
    });

    let outcome = sup.join().await.unwrap();

    assert!(matches!(outcome, ExitOutcome::Interrupted(_)), "got {outcome:?}");
    assert!(sink.contains(Reason::Command, "will interrupt"));
}

#[tokio::test]
async fn dropping_running_supervisor_does_not_panic() {
    let (mut sup, _) = supervisor(ProcessSpec::raw("sleep 5"));

    sup.run(&fast_options()).await.unwrap();
    assert_eq!(sup.state(), ProcessState::Running);
    drop(sup);
}

#[tokio::test]
async fn dropped_supervisor_finishes_join_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let spec = ProcessSpec::raw(format!("sleep 0.3; touch '{}'", marker.display()));
    let (mut sup, sink) = supervisor(spec);

    sup.run(&fast_options()).await.unwrap();
    drop(sup);

    let deadline = Instant::now() + Duration::from_secs(3);
    let completed = || sink.contains(Reason::Command, "process completed, exit code 0");
    while !completed() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert!(completed());
    assert!(marker.exists());
}
