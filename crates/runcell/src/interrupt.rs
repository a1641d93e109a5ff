//! Out-of-band cancellation of the running request.
//!
//! The interpreter is spawned as the leader of its own process group, so an
//! interrupt reaches it and anything it forked without touching our own
//! process. After signalling, the session waits for the interpreter to
//! acknowledge (the interrupted request's sentinel arrives) for a bounded
//! time before abandoning the request.

use std::io;
use std::time::Duration;

use log::debug;
use tokio::sync::oneshot;

use crate::command::RequestId;

/// The interpreter's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    leader: u32,
}

impl ProcessGroup {
    /// Group led by `pid` (spawned with `process_group(0)`).
    pub fn from_leader(pid: u32) -> Self {
        Self { leader: pid }
    }

    pub fn leader(&self) -> u32 {
        self.leader
    }

    /// Send SIGINT to every process in the group.
    #[cfg(unix)]
    pub fn interrupt(&self) -> io::Result<()> {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        killpg(Pid::from_raw(self.leader as i32), Signal::SIGINT).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    pub fn interrupt(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process group interrupts require a Unix platform",
        ))
    }

    /// SIGKILL the whole group. A group that is already gone is not an error.
    #[cfg(unix)]
    pub fn kill(&self) -> io::Result<()> {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(self.leader as i32), Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }

    // The leader itself is killed through its child handle.
    #[cfg(not(unix))]
    pub fn kill(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Tracks the request an interrupt is waiting on.
#[derive(Debug, Default)]
pub struct InterruptHandler {
    waiting: Option<(RequestId, Vec<oneshot::Sender<()>>)>,
}

impl InterruptHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for `request_id` to wind down.
    ///
    /// Arming again for the same request joins the existing wait. Arming for
    /// another request replaces it; earlier receivers see a closed channel.
    pub fn arm(&mut self, request_id: RequestId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if let Some((id, waiters)) = self.waiting.as_mut() {
            if *id == request_id {
                waiters.push(tx);
                return rx;
            }
        }
        self.waiting = Some((request_id, vec![tx]));
        rx
    }

    /// Record that `request_id` finished. Returns true if an interrupt was
    /// waiting on it.
    pub fn acknowledge(&mut self, request_id: RequestId) -> bool {
        match self.waiting.take() {
            Some((id, waiters)) if id == request_id => {
                for tx in waiters {
                    let _ = tx.send(());
                }
                true
            }
            other => {
                self.waiting = other;
                false
            }
        }
    }

    /// Stop waiting without an acknowledgment.
    pub fn disarm(&mut self) {
        self.waiting = None;
    }

    pub fn is_armed(&self) -> bool {
        self.waiting.is_some()
    }
}

/// Wait up to `timeout` for an armed interrupt to be acknowledged.
pub async fn wait_for_ack(ack: oneshot::Receiver<()>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, ack).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => {
            debug!("[interrupt] Wait cancelled before acknowledgment");
            false
        }
        Err(_) => false,
    }
}
