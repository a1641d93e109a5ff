use std::collections::VecDeque;

use serde::Serialize;

use crate::command::{ExecutionRequest, RequestId, RequestKind};

/// Status of a queued request
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RequestQueueStatus {
    /// Waiting in queue
    Pending,
    /// Currently executing
    Executing,
}

/// A request in the execution queue
#[derive(Debug, Clone, Serialize)]
pub struct QueuedRequest {
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub status: RequestQueueStatus,
    /// Position in queue (0 = currently executing or next)
    pub position: usize,
}

/// Snapshot of the queue for the host
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionQueueState {
    /// Is the queue processing (has pending or executing requests)?
    pub processing: bool,
    /// Requests currently in queue (executing first, then pending)
    pub requests: Vec<QueuedRequest>,
    /// ID of the currently executing request (if any)
    pub executing_request_id: Option<RequestId>,
}

/// The execution queue - owns the pending/executing state.
///
/// Requests run strictly in submission order, at most one at a time.
/// The queue never drops, reorders or merges requests on its own.
#[derive(Debug, Default)]
pub struct ExecutionQueue {
    /// Pending requests (FIFO)
    pending: VecDeque<ExecutionRequest>,
    /// Currently executing request
    executing: Option<ExecutionRequest>,
}

impl ExecutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request to the backlog
    pub fn submit(&mut self, request: ExecutionRequest) {
        self.pending.push_back(request);
    }

    /// Get next request to execute (if queue is non-empty and nothing executing)
    pub fn dequeue(&mut self) -> Option<&ExecutionRequest> {
        if self.executing.is_some() {
            return None;
        }
        self.executing = Some(self.pending.pop_front()?);
        self.executing.as_ref()
    }

    /// Mark the executing request as finished, returning it.
    ///
    /// A stale id (e.g. a request already abandoned by an interrupt) is ignored.
    pub fn complete(&mut self, request_id: RequestId) -> Option<ExecutionRequest> {
        if self.is_executing(request_id) {
            self.executing.take()
        } else {
            None
        }
    }

    /// Clear all pending (but not currently executing)
    pub fn clear_pending(&mut self) -> Vec<RequestId> {
        self.pending.drain(..).map(|r| r.id).collect()
    }

    /// Drop everything, returning the ids of the discarded requests
    pub fn clear(&mut self) -> Vec<RequestId> {
        let mut cleared: Vec<RequestId> = self.executing.take().map(|r| r.id).into_iter().collect();
        cleared.extend(self.clear_pending());
        cleared
    }

    /// Check if a request is currently executing
    pub fn is_executing(&self, request_id: RequestId) -> bool {
        self.executing.as_ref().map(|r| r.id) == Some(request_id)
    }

    /// The currently executing request
    pub fn executing(&self) -> Option<&ExecutionRequest> {
        self.executing.as_ref()
    }

    /// Ids of the pending requests, in order
    pub fn pending_ids(&self) -> Vec<RequestId> {
        self.pending.iter().map(|r| r.id).collect()
    }

    /// Check if queue is empty (no pending and no executing)
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.executing.is_none()
    }

    /// Get current state for the host
    pub fn get_state(&self) -> ExecutionQueueState {
        let requests = self
            .executing
            .iter()
            .map(|r| (r, RequestQueueStatus::Executing))
            .chain(self.pending.iter().map(|r| (r, RequestQueueStatus::Pending)))
            .enumerate()
            .map(|(position, (r, status))| QueuedRequest {
                request_id: r.id,
                kind: r.kind,
                status,
                position,
            })
            .collect();

        ExecutionQueueState {
            processing: !self.is_empty(),
            requests,
            executing_request_id: self.executing.as_ref().map(|r| r.id),
        }
    }
}
