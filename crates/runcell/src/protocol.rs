//! Events broadcast from a session to its host.
//!
//! Serialized as JSON objects tagged with `"event"`, so a host can forward
//! them over any line-oriented channel unchanged.

use serde::{Deserialize, Serialize};

use crate::command::{RequestId, RequestKind};
use crate::session::SessionStatus;

/// Which interpreter stream a relayed line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Everything the host may want to render or react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Session status changed.
    Status { status: SessionStatus },

    /// A request was written to the interpreter.
    ExecutionStarted {
        request_id: RequestId,
        kind: RequestKind,
    },

    /// One line of interpreter output, in emission order per stream.
    Output { stream: OutputStream, line: String },

    /// The interpreter reached the end of a request.
    ExecutionDone { request_id: RequestId },

    /// A request was cut short by `interrupt()`.
    Interrupted { request_id: RequestId },

    /// The backlog changed.
    QueueChanged {
        executing: Option<RequestId>,
        queued: Vec<RequestId>,
    },

    /// Writing a request to the interpreter failed; the session terminates.
    WriteFailed {
        request_id: RequestId,
        message: String,
    },

    /// Requests dropped because the session ended.
    Cancelled { request_ids: Vec<RequestId> },

    /// The interpreter process exited.
    Exited { code: Option<i32> },
}
