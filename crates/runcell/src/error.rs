//! Error types for runcell sessions.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced to the host by a [`Session`](crate::session::Session).
///
/// Every variant renders as a single human-readable line.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A command was issued before `initialize()` succeeded.
    #[error("interpreter session is not initialized")]
    NotInitialized,

    /// The interpreter executable could not be started or never became ready.
    #[error("failed to start interpreter '{program}': {reason}")]
    ProcessSpawn { program: String, reason: String },

    /// The interpreter exited or the session was shut down.
    #[error("interpreter session has terminated; initialize a new one")]
    Terminated,

    /// Writing to the interpreter's stdin failed.
    #[error("failed to write to interpreter: {0}")]
    Write(#[source] std::io::Error),

    /// `run_file` was given a path that does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl SessionError {
    pub(crate) fn spawn(program: &str, reason: impl std::fmt::Display) -> Self {
        SessionError::ProcessSpawn {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_single_line() {
        let errors = [
            SessionError::NotInitialized,
            SessionError::spawn("matlab", "No such file or directory (os error 2)"),
            SessionError::Terminated,
            SessionError::Write(std::io::Error::from(std::io::ErrorKind::BrokenPipe)),
            SessionError::FileNotFound(PathBuf::from("/tmp/missing.m")),
        ];
        for err in &errors {
            let msg = err.to_string();
            assert!(!msg.is_empty());
            assert!(!msg.contains('\n'), "multi-line message: {msg}");
        }
    }

    #[test]
    fn test_spawn_message_names_program() {
        let err = SessionError::spawn("matlab", "not found");
        assert_eq!(
            err.to_string(),
            "failed to start interpreter 'matlab': not found"
        );
    }

    #[test]
    fn test_file_not_found_message() {
        let err = SessionError::FileNotFound(PathBuf::from("/work/script.m"));
        assert_eq!(err.to_string(), "file not found: /work/script.m");
    }
}
