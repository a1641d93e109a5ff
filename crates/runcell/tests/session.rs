//! Session tests against a real subprocess.
//!
//! A tiny `sh` read-eval loop stands in for the interpreter: it evaluates one
//! line at a time and ignores SIGINT itself, so an interrupt only kills the
//! foreground command, just like an interactive interpreter. Scripts run in a
//! subshell, which SIGINT does stop as a whole.

#![cfg(unix)]

use std::time::Duration;

use runcell::{
    locate, InterpreterProfile, OutputStream, Session, SessionError, SessionEvent,
    SessionStatus, Settings,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

fn shell_settings() -> Settings {
    Settings {
        interpreter: InterpreterProfile {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"trap : INT; while IFS= read -r line; do eval "$line"; done"#.to_string(),
            ],
            echo_template: "echo {marker}".to_string(),
            run_file_template: "( . '{path}' )".to_string(),
            timer_template: None,
            max_line_length: None,
            line_continuation: String::new(),
            working_dir: None,
            script_extension: Some(".sh".to_string()),
        },
        startup_timeout_secs: 10,
        interrupt_timeout_ms: 2000,
        event_capacity: 256,
    }
}

async fn started_session() -> Session {
    let session = Session::new(shell_settings());
    session.initialize().await.unwrap();
    assert_eq!(session.status().await, SessionStatus::Idle);
    session
}

/// Collect events until `done` matches one (inclusive), or panic after a timeout.
async fn collect_until(
    rx: &mut broadcast::Receiver<SessionEvent>,
    done: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let finished = done(&event);
                    seen.push(event);
                    if finished {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out; events so far: {:?}", seen);
    seen
}

fn stdout_lines(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Output {
                stream: OutputStream::Stdout,
                line,
            } => Some(line.clone()),
            _ => None,
        })
        .collect()
}

fn is_done(id: u64) -> impl Fn(&SessionEvent) -> bool {
    move |e| matches!(e, SessionEvent::ExecutionDone { request_id } if *request_id == id)
}

#[tokio::test]
async fn test_commands_before_initialize() {
    let session = Session::new(shell_settings());
    assert!(matches!(
        session.run_code("echo hi").await,
        Err(SessionError::NotInitialized)
    ));
    assert!(matches!(
        session.run_selection("echo hi").await,
        Err(SessionError::NotInitialized)
    ));
    assert_eq!(session.status().await, SessionStatus::Uninitialized);
}

#[tokio::test]
async fn test_missing_executable() {
    let mut settings = shell_settings();
    settings.interpreter.program = "/nonexistent/interpreter".to_string();
    let session = Session::new(settings);

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, SessionError::ProcessSpawn { .. }));
    assert_eq!(session.status().await, SessionStatus::Uninitialized);
}

#[tokio::test]
async fn test_interpreter_exits_during_startup() {
    let mut settings = shell_settings();
    settings.interpreter.args = vec!["-c".to_string(), "exit 1".to_string()];
    let session = Session::new(settings);

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, SessionError::ProcessSpawn { .. }));
    assert_eq!(session.status().await, SessionStatus::Uninitialized);
}

#[tokio::test]
async fn test_initialize_twice_is_noop() {
    let session = started_session().await;
    session.initialize().await.unwrap();
    assert_eq!(session.status().await, SessionStatus::Idle);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_code_streams_output() {
    let session = started_session().await;
    let mut rx = session.subscribe();

    let id = session.run_code("echo hello").await.unwrap().unwrap();
    let events = collect_until(&mut rx, is_done(id)).await;

    assert_eq!(stdout_lines(&events), vec!["hello"]);
    assert!(events.contains(&SessionEvent::Status {
        status: SessionStatus::Busy
    }));

    let events = collect_until(&mut rx, |e| {
        matches!(e, SessionEvent::Status { status: SessionStatus::Idle })
    })
    .await;
    assert!(!events.is_empty());
    assert_eq!(session.status().await, SessionStatus::Idle);
    assert!(!session.queue_state().await.processing);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stderr_is_relayed() {
    let session = started_session().await;
    let mut rx = session.subscribe();

    let id = session.run_code("echo oops 1>&2").await.unwrap().unwrap();
    let events = collect_until(&mut rx, is_done(id)).await;

    // stderr may race the sentinel on stdout, so keep listening briefly
    let mut saw_stderr = events.iter().any(|e| {
        matches!(e, SessionEvent::Output { stream: OutputStream::Stderr, line } if line == "oops")
    });
    if !saw_stderr {
        let more = collect_until(&mut rx, |e| {
            matches!(e, SessionEvent::Output { stream: OutputStream::Stderr, .. })
        })
        .await;
        saw_stderr = !more.is_empty();
    }
    assert!(saw_stderr);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_requests_run_in_submission_order() {
    let session = started_session().await;
    let mut rx = session.subscribe();

    let first = session.run_code("sleep 0.3; echo first").await.unwrap().unwrap();
    let second = session.run_code("echo second").await.unwrap().unwrap();
    assert!(second > first);

    let state = session.queue_state().await;
    assert_eq!(state.executing_request_id, Some(first));
    assert_eq!(state.requests.len(), 2);

    let events = collect_until(&mut rx, is_done(second)).await;
    assert_eq!(stdout_lines(&events), vec!["first", "second"]);

    let done: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ExecutionDone { request_id } => Some(*request_id),
            _ => None,
        })
        .collect();
    assert_eq!(done, vec![first, second]);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_blank_input_is_noop() {
    let session = started_session().await;
    assert_eq!(session.run_code("   ").await.unwrap(), None);
    assert_eq!(session.run_cell("\n%% empty\n\n").await.unwrap(), None);
    assert_eq!(session.run_selection("").await.unwrap(), None);
    assert_eq!(session.status().await, SessionStatus::Idle);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_cell_skips_marker_and_blank_lines() {
    let session = started_session().await;
    let mut rx = session.subscribe();

    let id = session
        .run_cell("%% setup\necho one\n\necho two\n")
        .await
        .unwrap()
        .unwrap();
    let events = collect_until(&mut rx, is_done(id)).await;
    assert_eq!(stdout_lines(&events), vec!["one", "two"]);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_located_cell_label_is_not_executed() {
    let session = started_session().await;
    let mut rx = session.subscribe();

    let buffer = ["echo before", "%% echo LABEL", "echo body"];
    let cell = locate(&buffer, 3);
    assert_eq!(cell.lines, vec!["echo LABEL", "echo body"]);

    let id = session
        .run_cell(&cell.source(&buffer))
        .await
        .unwrap()
        .unwrap();
    let events = collect_until(&mut rx, is_done(id)).await;
    assert_eq!(stdout_lines(&events), vec!["body"]);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_file() {
    let temp_dir = TempDir::new().unwrap();
    let script = temp_dir.path().join("script.sh");
    std::fs::write(&script, "echo from-file\n").unwrap();

    let session = started_session().await;
    let mut rx = session.subscribe();

    let missing = temp_dir.path().join("missing.sh");
    match session.run_file(missing.to_str().unwrap()).await {
        Err(SessionError::FileNotFound(path)) => assert_eq!(path, missing),
        other => panic!("expected FileNotFound, got {:?}", other),
    }

    let quoted = format!("\"{}\"", script.display());
    let id = session.run_file(&quoted).await.unwrap().unwrap();
    let events = collect_until(&mut rx, is_done(id)).await;
    assert_eq!(stdout_lines(&events), vec!["from-file"]);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_interrupt_when_idle_is_noop() {
    let session = started_session().await;
    session.interrupt().await.unwrap();
    assert_eq!(session.status().await, SessionStatus::Idle);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_interrupt_long_running_request() {
    let session = started_session().await;
    let mut rx = session.subscribe();

    let id = session.run_code("sleep 30").await.unwrap().unwrap();
    let queued = session.run_code("echo after").await.unwrap().unwrap();
    assert_eq!(session.status().await, SessionStatus::Busy);

    tokio::time::timeout(Duration::from_secs(5), session.interrupt())
        .await
        .expect("interrupt should not hang")
        .unwrap();

    let events = collect_until(&mut rx, is_done(queued)).await;
    assert!(events.contains(&SessionEvent::Interrupted { request_id: id }));
    assert!(!events.contains(&SessionEvent::ExecutionDone { request_id: id }));
    assert_eq!(stdout_lines(&events), vec!["after"]);

    // Still usable afterwards
    let next = session.run_code("echo still-alive").await.unwrap().unwrap();
    let events = collect_until(&mut rx, is_done(next)).await;
    assert_eq!(stdout_lines(&events), vec!["still-alive"]);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_interrupt_stops_whole_multiline_cell() {
    let session = started_session().await;
    let mut rx = session.subscribe();

    let id = session
        .run_cell("sleep 30\necho REST-OF-CELL")
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    session.interrupt().await.unwrap();

    let next = session.run_code("echo next").await.unwrap().unwrap();
    let events = collect_until(&mut rx, is_done(next)).await;
    assert!(events.contains(&SessionEvent::Interrupted { request_id: id }));
    assert_eq!(stdout_lines(&events), vec!["next"]);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_large_request_does_not_block_session() {
    let mut settings = shell_settings();
    // Lines go straight to stdin, so this overfills the pipe while the
    // interpreter sleeps on the first one.
    settings.interpreter.script_extension = None;
    let session = Session::new(settings);
    session.initialize().await.unwrap();
    let mut rx = session.subscribe();

    let code = format!("sleep 30\n{}", "true\n".repeat(40_000));
    let id = tokio::time::timeout(Duration::from_secs(2), session.run_code(&code))
        .await
        .expect("run_code should not wait for the interpreter")
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let status = tokio::time::timeout(Duration::from_secs(2), session.status())
        .await
        .expect("status should not block on a full pipe");
    assert_eq!(status, SessionStatus::Busy);

    tokio::time::timeout(Duration::from_secs(5), session.interrupt())
        .await
        .expect("interrupt should not block on a full pipe")
        .unwrap();
    let events = collect_until(&mut rx, |e| {
        matches!(e, SessionEvent::Interrupted { request_id } if *request_id == id)
    })
    .await;
    assert!(!events.contains(&SessionEvent::ExecutionDone { request_id: id }));
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unacknowledged_interrupt_abandons_request() {
    let mut settings = shell_settings();
    // Ignored SIGINT is inherited, so nothing the interpreter runs reacts to it
    settings.interpreter.args[1] =
        r#"trap '' INT; while IFS= read -r line; do eval "$line"; done"#.to_string();
    settings.interrupt_timeout_ms = 300;
    let session = Session::new(settings);
    session.initialize().await.unwrap();
    let mut rx = session.subscribe();

    let stuck = session.run_code("sleep 2").await.unwrap().unwrap();
    let queued = session.run_code("echo after").await.unwrap().unwrap();

    tokio::time::timeout(Duration::from_millis(1500), session.interrupt())
        .await
        .expect("interrupt should give up after its timeout")
        .unwrap();
    assert_eq!(session.queue_state().await.executing_request_id, Some(queued));

    let events = collect_until(&mut rx, is_done(queued)).await;
    assert!(events.contains(&SessionEvent::Interrupted { request_id: stuck }));
    assert!(!events.contains(&SessionEvent::ExecutionDone { request_id: stuck }));
    assert_eq!(stdout_lines(&events), vec!["after"]);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_write_failure_terminates_session() {
    let mut settings = shell_settings();
    // Answers the ready probe, then closes stdin and keeps running
    settings.interpreter.args[1] =
        r#"IFS= read -r line; eval "$line"; exec 0<&-; sleep 5"#.to_string();
    let session = Session::new(settings);
    session.initialize().await.unwrap();
    let mut rx = session.subscribe();

    let id = match session.run_code("echo unreachable").await {
        Ok(Some(id)) => Some(id),
        Err(SessionError::Write(_)) => None,
        other => panic!("unexpected result {:?}", other),
    };
    let events = collect_until(&mut rx, |e| {
        matches!(e, SessionEvent::Status { status: SessionStatus::Terminated })
    })
    .await;

    if let Some(id) = id {
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::WriteFailed { request_id, message }
                if *request_id == id && message.starts_with("failed to write to interpreter")
        )));
        assert!(events.contains(&SessionEvent::Cancelled {
            request_ids: vec![id]
        }));
    }
    assert_eq!(session.status().await, SessionStatus::Terminated);
    assert!(matches!(
        session.run_code("echo hi").await,
        Err(SessionError::Terminated)
    ));
}

#[tokio::test]
async fn test_interpreter_exit_terminates_session() {
    let session = started_session().await;
    let mut rx = session.subscribe();

    let id = session.run_code("exit 3").await.unwrap().unwrap();
    let events = collect_until(&mut rx, |e| {
        matches!(e, SessionEvent::Status { status: SessionStatus::Terminated })
    })
    .await;

    assert!(events.contains(&SessionEvent::Exited { code: Some(3) }));
    assert!(events.contains(&SessionEvent::Cancelled {
        request_ids: vec![id]
    }));
    assert_eq!(session.status().await, SessionStatus::Terminated);
    assert!(matches!(
        session.run_code("echo hi").await,
        Err(SessionError::Terminated)
    ));

    // A terminated session can be started again
    session.initialize().await.unwrap();
    assert_eq!(session.status().await, SessionStatus::Idle);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let session = started_session().await;
    let mut rx = session.subscribe();

    let id = session.run_code("sleep 30").await.unwrap().unwrap();
    session.shutdown().await.unwrap();
    session.shutdown().await.unwrap();
    assert_eq!(session.status().await, SessionStatus::Terminated);

    let events = collect_until(&mut rx, |e| matches!(e, SessionEvent::Exited { .. })).await;
    assert!(events.contains(&SessionEvent::Cancelled {
        request_ids: vec![id]
    }));
    assert!(!events.contains(&SessionEvent::ExecutionDone { request_id: id }));
}
