//! Interpreter session lifecycle and command sequencing.
//!
//! A [`Session`] owns one interpreter subprocess. The host submits requests
//! with the `run_*` methods; they go through the [`ExecutionQueue`] and are
//! written to the interpreter one at a time. Output is relayed as
//! [`SessionEvent`]s while it streams.
//!
//! Background tasks per process:
//! - stdin writer: owns the pipe, writes prepared requests in order
//! - stdout relay: forwards lines, spots completion sentinels
//! - stderr relay: forwards lines
//! - exit watcher: owns the `Child`, reports its exit status
//! - dispatcher: applies completions, write failures and exits to the
//!   session state
//!
//! All mutable state sits behind one mutex that is held for a single state
//! transition at a time. Nothing awaits interpreter I/O while holding it, so
//! a stuck interpreter never blocks `status()` or `interrupt()`.

use std::process::Stdio;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::command::{
    self, clean_cell, new_session_token, parse_sentinel, prepare, resolve_file, script_path,
    sentinel_command, ExecutionRequest, RequestId, RequestKind, READY_PROBE_ID,
};
use crate::error::{Result, SessionError};
use crate::execution_queue::{ExecutionQueue, ExecutionQueueState};
use crate::interrupt::{wait_for_ack, InterruptHandler, ProcessGroup};
use crate::protocol::{OutputStream, SessionEvent};
use crate::settings::{InterpreterProfile, Settings};

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No interpreter has been started yet
    Uninitialized,
    /// Interpreter is ready and idle
    Idle,
    /// Interpreter is executing a request
    Busy,
    /// Interpreter exited or was shut down
    Terminated,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Uninitialized => write!(f, "uninitialized"),
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Busy => write!(f, "busy"),
            SessionStatus::Terminated => write!(f, "terminated"),
        }
    }
}

/// Notifications from the background tasks to the dispatcher.
#[derive(Debug)]
enum QueueCommand {
    /// A completion sentinel was printed
    ExecutionDone { request_id: RequestId },
    /// Writing a request to stdin failed
    WriteFailed {
        request_id: RequestId,
        error: std::io::Error,
    },
    /// The interpreter process exited
    ProcessExited { code: Option<i32> },
}

/// Prepared text for the stdin writer.
#[derive(Debug)]
struct WriteJob {
    request_id: RequestId,
    text: String,
}

/// Handles to a running interpreter.
struct ProcessHandle {
    /// Feeds the stdin writer task
    stdin_tx: mpsc::UnboundedSender<WriteJob>,
    group: ProcessGroup,
    /// Per-process token embedded in completion sentinels
    token: String,
    /// Scripts for multi-line requests
    scripts: Option<TempDir>,
    /// Tells the exit watcher to kill the child
    kill_tx: Option<oneshot::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
    /// The leader has exited and been reaped; its pid may be reused
    reaped: bool,
}

impl ProcessHandle {
    /// Queue `text` for the writer. Fails only if the writer has stopped.
    fn send(&self, request_id: RequestId, text: String) -> Result<()> {
        self.stdin_tx
            .send(WriteJob { request_id, text })
            .map_err(|_| {
                SessionError::Write(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "interpreter stdin is closed",
                ))
            })
    }

    fn kill(mut self) {
        if !self.reaped {
            if let Err(e) = self.group.kill() {
                error!(
                    "[session] Failed to kill process group {}: {}",
                    self.group.leader(),
                    e
                );
            }
        }
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
        // Relays, the writer and the dispatcher wind down on their own once
        // the pipes close; dropping the handles detaches them.
        self.tasks.clear();
    }
}

/// State shared between the host-facing API and the dispatcher.
///
/// Every method is synchronous: the lock is only ever held for a state
/// transition, never across interpreter I/O.
struct SessionCore {
    status: SessionStatus,
    queue: ExecutionQueue,
    interrupts: InterruptHandler,
    process: Option<ProcessHandle>,
    /// Bumped per spawned process so late notifications from an old one are ignored
    generation: u64,
    next_request_id: RequestId,
}

impl SessionCore {
    fn new() -> Self {
        Self {
            status: SessionStatus::Uninitialized,
            queue: ExecutionQueue::new(),
            interrupts: InterruptHandler::new(),
            process: None,
            generation: 0,
            next_request_id: READY_PROBE_ID + 1,
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match self.status {
            SessionStatus::Uninitialized => Err(SessionError::NotInitialized),
            SessionStatus::Terminated => Err(SessionError::Terminated),
            SessionStatus::Idle | SessionStatus::Busy => Ok(()),
        }
    }

    fn set_status(&mut self, status: SessionStatus, events: &broadcast::Sender<SessionEvent>) {
        if self.status != status {
            debug!("[session] Status {} -> {}", self.status, status);
            self.status = status;
            let _ = events.send(SessionEvent::Status { status });
        }
    }

    fn broadcast_queue(&self, events: &broadcast::Sender<SessionEvent>) {
        let _ = events.send(SessionEvent::QueueChanged {
            executing: self.queue.executing().map(|r| r.id),
            queued: self.queue.pending_ids(),
        });
    }

    /// Hand the next queued request to the writer if nothing is executing.
    fn process_next(
        &mut self,
        profile: &InterpreterProfile,
        events: &broadcast::Sender<SessionEvent>,
    ) -> Result<()> {
        let Some(process) = self.process.as_ref() else {
            return Ok(());
        };
        let token = process.token.clone();
        let script_dir = process.scripts.as_ref().map(|d| d.path().to_path_buf());
        let Some(request) = self.queue.dequeue().cloned() else {
            return Ok(());
        };

        let command = prepare(&request, profile, &token, script_dir.as_deref());
        self.set_status(SessionStatus::Busy, events);
        let _ = events.send(SessionEvent::ExecutionStarted {
            request_id: request.id,
            kind: request.kind,
        });
        self.broadcast_queue(events);

        let sent = match self.process.as_ref() {
            Some(process) => process.send(request.id, command),
            None => return Ok(()),
        };
        match sent {
            Ok(()) => {
                info!(
                    "[session] Sent {} request {}: {}",
                    request.kind,
                    request.id,
                    request.preview()
                );
                Ok(())
            }
            Err(e) => {
                error!("[session] {}", e);
                self.terminate(events);
                Err(e)
            }
        }
    }

    /// A completion sentinel arrived for `request_id`.
    fn execution_done(
        &mut self,
        request_id: RequestId,
        profile: &InterpreterProfile,
        events: &broadcast::Sender<SessionEvent>,
    ) {
        let interrupted = self.interrupts.acknowledge(request_id);
        let Some(request) = self.queue.complete(request_id) else {
            debug!("[session] Ignoring completion for stale request {}", request_id);
            return;
        };
        self.discard_script(request_id, profile);

        let elapsed = chrono::Utc::now() - request.submitted_at;
        if interrupted {
            info!("[session] Request {} interrupted", request_id);
            let _ = events.send(SessionEvent::Interrupted { request_id });
        } else {
            info!(
                "[session] Request {} done ({} ms since submission)",
                request_id,
                elapsed.num_milliseconds()
            );
            let _ = events.send(SessionEvent::ExecutionDone { request_id });
        }
        self.set_status(SessionStatus::Idle, events);
        self.broadcast_queue(events);

        if let Err(e) = self.process_next(profile, events) {
            error!("[session] Failed to start next request: {}", e);
        }
    }

    fn discard_script(&self, request_id: RequestId, profile: &InterpreterProfile) {
        let dir = self.process.as_ref().and_then(|p| p.scripts.as_ref());
        if let (Some(dir), Some(ext)) = (dir, profile.script_extension.as_deref()) {
            let _ = std::fs::remove_file(script_path(dir.path(), request_id, ext));
        }
    }

    fn write_failed(
        &mut self,
        request_id: RequestId,
        error: std::io::Error,
        events: &broadcast::Sender<SessionEvent>,
    ) {
        if self.status == SessionStatus::Terminated {
            debug!("[session] Write failure after shutdown: {}", error);
            return;
        }
        let message = SessionError::Write(error).to_string();
        error!("[session] Request {}: {}", request_id, message);
        let _ = events.send(SessionEvent::WriteFailed {
            request_id,
            message,
        });
        self.terminate(events);
    }

    fn process_exited(&mut self, code: Option<i32>, events: &broadcast::Sender<SessionEvent>) {
        if let Some(process) = self.process.as_mut() {
            process.reaped = true;
        }
        let _ = events.send(SessionEvent::Exited { code });
        if self.status == SessionStatus::Terminated {
            debug!("[session] Interpreter exited after shutdown (code {:?})", code);
            return;
        }
        warn!("[session] Interpreter exited unexpectedly (code {:?})", code);
        self.terminate(events);
    }

    /// Kill the interpreter, drop all requests, and become Terminated.
    fn terminate(&mut self, events: &broadcast::Sender<SessionEvent>) {
        if let Some(process) = self.process.take() {
            process.kill();
        }
        self.interrupts.disarm();
        let cancelled = self.queue.clear();
        if !cancelled.is_empty() {
            info!("[session] Cancelled {} request(s)", cancelled.len());
            let _ = events.send(SessionEvent::Cancelled {
                request_ids: cancelled,
            });
            self.broadcast_queue(events);
        }
        self.set_status(SessionStatus::Terminated, events);
    }
}

/// A host-owned interpreter session.
///
/// Methods take `&self`, so a host may share the session (e.g. in an `Arc`)
/// and call [`Session::interrupt`] while a request is in flight.
pub struct Session {
    name: String,
    settings: Settings,
    core: Arc<Mutex<SessionCore>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let name = petname::petname(2, "-").unwrap_or_else(command::new_session_token);
        Self {
            name,
            settings,
            core: Arc::new(Mutex::new(SessionCore::new())),
            events,
        }
    }

    /// Human-friendly session name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Receive events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> SessionStatus {
        self.core.lock().await.status
    }

    pub async fn queue_state(&self) -> ExecutionQueueState {
        self.core.lock().await.queue.get_state()
    }

    /// Start the interpreter and wait until it is ready.
    ///
    /// A no-op when the interpreter is already running. From `Terminated`
    /// this starts a fresh process.
    pub async fn initialize(&self) -> Result<()> {
        if matches!(
            self.status().await,
            SessionStatus::Idle | SessionStatus::Busy
        ) {
            info!("[session] {} already running", self.name);
            return Ok(());
        }

        let profile = &self.settings.interpreter;
        let program = profile.program.as_str();
        let scripts = match profile.script_extension {
            Some(_) => Some(
                tempfile::Builder::new()
                    .prefix("runcell-")
                    .tempdir()
                    .map_err(|e| SessionError::spawn(program, e))?,
            ),
            None => None,
        };
        info!(
            "[session] Starting {} for session {} with args {:?}",
            program, self.name, profile.args
        );

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(&profile.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = profile.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::spawn(program, e))?;

        let pid = child
            .id()
            .ok_or_else(|| SessionError::spawn(program, "process exited immediately"))?;
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(SessionError::spawn(program, "standard streams unavailable"));
        };

        let token = new_session_token();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<QueueCommand>();
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel::<WriteJob>();
        let (kill_tx, kill_rx) = oneshot::channel();

        let tasks = vec![
            spawn_stdin_writer(stdin, stdin_rx, cmd_tx.clone()),
            spawn_stdout_relay(stdout, token.clone(), self.events.clone(), cmd_tx.clone()),
            spawn_stderr_relay(stderr, self.events.clone()),
            spawn_exit_watcher(child, kill_rx, cmd_tx),
        ];
        let mut process = ProcessHandle {
            stdin_tx,
            group: ProcessGroup::from_leader(pid),
            token,
            scripts,
            kill_tx: Some(kill_tx),
            tasks,
            reaped: false,
        };

        let probe = format!(
            "{}\n",
            sentinel_command(profile, &process.token, READY_PROBE_ID)
        );
        if let Err(e) = process.send(READY_PROBE_ID, probe) {
            process.kill();
            return Err(SessionError::spawn(program, e));
        }

        let startup_timeout = self.settings.startup_timeout();
        match tokio::time::timeout(startup_timeout, wait_until_ready(&mut cmd_rx)).await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                process.kill();
                return Err(SessionError::spawn(program, reason));
            }
            Err(_) => {
                process.kill();
                return Err(SessionError::spawn(
                    program,
                    format!(
                        "no ready indication within {}s",
                        startup_timeout.as_secs()
                    ),
                ));
            }
        }

        let mut core = self.core.lock().await;
        if matches!(core.status, SessionStatus::Idle | SessionStatus::Busy) {
            // Lost a race with a concurrent initialize().
            process.kill();
            return Ok(());
        }
        core.generation += 1;
        core.queue = ExecutionQueue::new();
        core.interrupts.disarm();
        process.tasks.push(tokio::spawn(run_dispatcher(
            self.core.clone(),
            core.generation,
            self.settings.interpreter.clone(),
            self.events.clone(),
            cmd_rx,
        )));
        core.process = Some(process);
        core.set_status(SessionStatus::Idle, &self.events);

        info!("[session] {} ready (pid {})", self.name, pid);
        Ok(())
    }

    /// Run a code fragment. Blank code is a no-op (`Ok(None)`).
    pub async fn run_code(&self, code: &str) -> Result<Option<RequestId>> {
        let source = Some(code).filter(|c| !c.trim().is_empty()).map(str::to_string);
        self.submit(RequestKind::Code, source).await
    }

    /// Run a visual selection. Blank text is a no-op.
    pub async fn run_selection(&self, text: &str) -> Result<Option<RequestId>> {
        let source = Some(text).filter(|t| !t.trim().is_empty()).map(str::to_string);
        self.submit(RequestKind::Selection, source).await
    }

    /// Run cell text. Blank and marker lines are dropped; an empty cell is a no-op.
    pub async fn run_cell(&self, text: &str) -> Result<Option<RequestId>> {
        self.submit(RequestKind::Cell, clean_cell(text)).await
    }

    /// Run a file by path. The file must exist.
    pub async fn run_file(&self, path: &str) -> Result<Option<RequestId>> {
        self.core.lock().await.ensure_running()?;
        let path = resolve_file(path)?;
        self.submit(RequestKind::File, Some(path.to_string_lossy().into_owned()))
            .await
    }

    async fn submit(
        &self,
        kind: RequestKind,
        source: Option<String>,
    ) -> Result<Option<RequestId>> {
        let mut core = self.core.lock().await;
        core.ensure_running()?;
        let Some(source) = source else {
            debug!("[session] Nothing to run for empty {}", kind);
            return Ok(None);
        };

        let id = core.next_request_id;
        core.next_request_id += 1;
        let request = ExecutionRequest::new(id, kind, source);
        if core.status == SessionStatus::Busy {
            info!("[session] Queuing {} request {} behind running request", kind, id);
        }
        core.queue.submit(request);
        core.broadcast_queue(&self.events);
        core.process_next(&self.settings.interpreter, &self.events)?;
        Ok(Some(id))
    }

    /// Interrupt the running request.
    ///
    /// Does nothing unless the session is Busy. Otherwise signals the
    /// interpreter's process group and waits (bounded) for it to finish the
    /// request; the request is then discarded and the backlog resumes.
    pub async fn interrupt(&self) -> Result<()> {
        let (request_id, ack) = {
            let mut core = self.core.lock().await;
            if core.status != SessionStatus::Busy {
                debug!("[interrupt] Session is {}, nothing to interrupt", core.status);
                return Ok(());
            }
            let Some(request_id) = core.queue.executing().map(|r| r.id) else {
                return Ok(());
            };
            if let Some(ref process) = core.process {
                match process.group.interrupt() {
                    Ok(()) => info!(
                        "[interrupt] Sent SIGINT to process group {} for request {}",
                        process.group.leader(),
                        request_id
                    ),
                    Err(e) => warn!("[interrupt] Could not signal interpreter: {}", e),
                }
            }
            (request_id, core.interrupts.arm(request_id))
        };

        let acknowledged = wait_for_ack(ack, self.settings.interrupt_timeout()).await;

        let mut core = self.core.lock().await;
        if acknowledged || !core.queue.is_executing(request_id) {
            return Ok(());
        }

        warn!(
            "[interrupt] No acknowledgment within {} ms, abandoning request {}",
            self.settings.interrupt_timeout_ms, request_id
        );
        core.interrupts.disarm();
        core.queue.complete(request_id);
        let _ = self.events.send(SessionEvent::Interrupted { request_id });
        core.set_status(SessionStatus::Idle, &self.events);
        core.broadcast_queue(&self.events);
        core.process_next(&self.settings.interpreter, &self.events)
    }

    /// Stop the interpreter. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        if core.status == SessionStatus::Terminated {
            return Ok(());
        }
        info!("[session] Shutting down {}", self.name);
        core.terminate(&self.events);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        match self.core.try_lock() {
            Ok(mut core) => {
                if let Some(process) = core.process.take() {
                    process.kill();
                    info!("[session] {} dropped - interpreter killed", self.name);
                }
            }
            Err(_) => warn!(
                "[session] {} dropped while locked, interpreter not killed",
                self.name
            ),
        }
    }
}

/// Wait for the ready probe's sentinel. `Err` says why the interpreter
/// never got there.
async fn wait_until_ready(
    cmd_rx: &mut mpsc::UnboundedReceiver<QueueCommand>,
) -> std::result::Result<(), String> {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            QueueCommand::ExecutionDone { request_id } if request_id == READY_PROBE_ID => {
                return Ok(())
            }
            QueueCommand::ExecutionDone { request_id } => {
                debug!("[session] Ignoring completion {} during startup", request_id)
            }
            QueueCommand::WriteFailed { error, .. } => {
                return Err(format!("could not write to stdin: {}", error))
            }
            QueueCommand::ProcessExited { code } => {
                return Err(format!(
                    "exited before becoming ready (exit code {:?})",
                    code
                ))
            }
        }
    }
    Err("exited before becoming ready".to_string())
}

async fn run_dispatcher(
    core: Arc<Mutex<SessionCore>>,
    generation: u64,
    profile: InterpreterProfile,
    events: broadcast::Sender<SessionEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<QueueCommand>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        let mut core = core.lock().await;
        if core.generation != generation {
            debug!("[session] Dropping {:?} from a previous interpreter", cmd);
            continue;
        }
        match cmd {
            QueueCommand::ExecutionDone { request_id } => {
                core.execution_done(request_id, &profile, &events)
            }
            QueueCommand::WriteFailed { request_id, error } => {
                core.write_failed(request_id, error, &events)
            }
            QueueCommand::ProcessExited { code } => core.process_exited(code, &events),
        }
    }
    debug!("[session] Dispatcher for generation {} stopped", generation);
}

fn spawn_stdin_writer(
    mut stdin: ChildStdin,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
    cmd_tx: mpsc::UnboundedSender<QueueCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            let written = match stdin.write_all(job.text.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            if let Err(error) = written {
                let _ = cmd_tx.send(QueueCommand::WriteFailed {
                    request_id: job.request_id,
                    error,
                });
                break;
            }
        }
        debug!("[session] stdin writer finished");
    })
}

/// Read one line, replacing invalid UTF-8. `None` at end of stream.
async fn read_line_lossy<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

fn spawn_stdout_relay<R>(
    stdout: R,
    token: String,
    events: broadcast::Sender<SessionEvent>,
    cmd_tx: mpsc::UnboundedSender<QueueCommand>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            match read_line_lossy(&mut reader, &mut buf).await {
                Ok(Some(line)) => match parse_sentinel(&line, &token) {
                    Some((request_id, before)) => {
                        if !before.trim().is_empty() {
                            relay(&events, OutputStream::Stdout, before.to_string());
                        }
                        let _ = cmd_tx.send(QueueCommand::ExecutionDone { request_id });
                    }
                    None => relay(&events, OutputStream::Stdout, line),
                },
                Ok(None) => break,
                Err(e) => {
                    error!("[session] stdout read error: {}", e);
                    break;
                }
            }
        }
        debug!("[session] stdout relay finished");
    })
}

fn spawn_stderr_relay<R>(stderr: R, events: broadcast::Sender<SessionEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        loop {
            match read_line_lossy(&mut reader, &mut buf).await {
                Ok(Some(line)) => relay(&events, OutputStream::Stderr, line),
                Ok(None) => break,
                Err(e) => {
                    error!("[session] stderr read error: {}", e);
                    break;
                }
            }
        }
        debug!("[session] stderr relay finished");
    })
}

fn relay(events: &broadcast::Sender<SessionEvent>, stream: OutputStream, line: String) {
    let _ = events.send(SessionEvent::Output { stream, line });
}

fn spawn_exit_watcher(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    cmd_tx: mpsc::UnboundedSender<QueueCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // A dropped sender also means "kill".
        let status = tokio::select! {
            status = child.wait() => status,
            _ = kill_rx => {
                if let Err(e) = child.start_kill() {
                    debug!("[session] start_kill: {}", e);
                }
                child.wait().await
            }
        };
        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                error!("[session] Failed to wait for interpreter: {}", e);
                None
            }
        };
        let _ = cmd_tx.send(QueueCommand::ProcessExited { code });
    })
}
