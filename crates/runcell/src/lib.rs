//! Drive a long-running interpreter from an editor.
//!
//! - [`cell`]: find the `%%`-delimited cell around a cursor line
//! - [`session`]: one interpreter subprocess, a FIFO of requests, interrupts
//! - [`protocol`]: events a session broadcasts to its host
//! - [`settings`]: interpreter profile and timeouts, persisted as JSON

pub mod cell;
pub mod command;
pub mod error;
pub mod execution_queue;
pub mod interrupt;
pub mod protocol;
pub mod session;
pub mod settings;

pub use cell::{locate, locate_in_text, Cell};
pub use command::{RequestId, RequestKind};
pub use error::{Result, SessionError};
pub use execution_queue::ExecutionQueueState;
pub use protocol::{OutputStream, SessionEvent};
pub use session::{Session, SessionStatus};
pub use settings::{load_settings, load_settings_from, InterpreterProfile, Settings};
