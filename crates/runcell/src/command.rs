//! Execution requests and the text written to the interpreter for them.
//!
//! Every prepared command ends with a sentinel command from the profile's
//! `echo_template`. When the interpreter reaches it, it prints a marker line
//! `__runcell_<token>_<id>__` that the stdout relay recognizes as the end of
//! request `<id>`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cell::is_marker;
use crate::error::{Result, SessionError};
use crate::settings::{InterpreterProfile, MARKER_PLACEHOLDER};

/// Per-session request identifier. Id 0 is reserved for the ready probe.
pub type RequestId = u64;

/// Id used by the startup ready probe.
pub const READY_PROBE_ID: RequestId = 0;

const SENTINEL_PREFIX: &str = "__runcell_";
const SENTINEL_SUFFIX: &str = "__";
const TIMER_VAR_LEN: usize = 12;

/// What an execution request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Free-form code typed or sent by the host
    Code,
    /// A file to run by path
    File,
    /// An editor cell (see `cell::locate`)
    Cell,
    /// A visual selection
    Selection,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Code => write!(f, "code"),
            RequestKind::File => write!(f, "file"),
            RequestKind::Cell => write!(f, "cell"),
            RequestKind::Selection => write!(f, "selection"),
        }
    }
}

/// A unit of work submitted by the host.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    /// Source text, or the resolved path for `RequestKind::File`
    pub source: String,
    pub submitted_at: DateTime<Utc>,
}

impl ExecutionRequest {
    pub fn new(id: RequestId, kind: RequestKind, source: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            source: source.into(),
            submitted_at: Utc::now(),
        }
    }

    /// Short single-line preview for logs.
    pub fn preview(&self) -> String {
        let first = self.source.lines().next().unwrap_or("");
        if first.chars().count() > 50 || self.source.lines().nth(1).is_some() {
            format!("{}...", first.chars().take(50).collect::<String>())
        } else {
            first.to_string()
        }
    }
}

/// Generate a fresh session token for sentinel markers.
pub fn new_session_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// The marker line printed when request `id` completes.
pub fn sentinel(token: &str, id: RequestId) -> String {
    format!("{SENTINEL_PREFIX}{token}_{id}{SENTINEL_SUFFIX}")
}

/// Recognize a sentinel at the end of an output line.
///
/// Returns the request id and whatever text preceded the marker on that
/// line (an interpreter prompt, typically). The marker must end the line,
/// so an interpreter echoing the sentinel command itself is not mistaken
/// for completion.
pub fn parse_sentinel<'a>(line: &'a str, token: &str) -> Option<(RequestId, &'a str)> {
    let line = line.trim_end();
    let prefix = format!("{SENTINEL_PREFIX}{token}_");
    let start = line.rfind(&prefix)?;
    let id = line[start + prefix.len()..].strip_suffix(SENTINEL_SUFFIX)?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((id.parse().ok()?, &line[..start]))
}

/// The command that makes the interpreter print the sentinel for `id`.
pub fn sentinel_command(profile: &InterpreterProfile, token: &str, id: RequestId) -> String {
    profile
        .echo_template
        .replace(MARKER_PLACEHOLDER, &sentinel(token, id))
}

/// Build the full text written to stdin for `request`, sentinel included.
///
/// With a `script_dir` and a profile `script_extension`, a multi-line body is
/// saved as a script there and sent through `run_file_template`, so that one
/// interrupt stops the whole request rather than only its current line.
pub fn prepare(
    request: &ExecutionRequest,
    profile: &InterpreterProfile,
    token: &str,
    script_dir: Option<&Path>,
) -> String {
    let mut body = match request.kind {
        RequestKind::Code => {
            let code = request.source.trim();
            match &profile.timer_template {
                Some(template) if !code.contains('\n') => template
                    .replace("{var}", &timer_var())
                    .replace("{code}", code),
                _ => code.to_string(),
            }
        }
        RequestKind::Selection => request.source.trim().to_string(),
        RequestKind::Cell => request.source.clone(),
        RequestKind::File => profile.run_file_template.replace("{path}", &request.source),
    };

    if body.contains('\n') {
        if let (Some(dir), Some(ext)) = (script_dir, profile.script_extension.as_deref()) {
            let path = script_path(dir, request.id, ext);
            match std::fs::write(&path, format!("{body}\n")) {
                Ok(()) => {
                    body = profile
                        .run_file_template
                        .replace("{path}", &path.to_string_lossy())
                }
                Err(e) => log::warn!(
                    "[session] Could not write {:?}, sending lines directly: {}",
                    path,
                    e
                ),
            }
        }
    }

    let mut command = format!(
        "{}\n{}\n",
        body,
        sentinel_command(profile, token, request.id)
    );
    if let Some(max) = profile.max_line_length {
        command = split_long_lines(&command, max, &profile.line_continuation);
    }
    command
}

/// Where the script for request `id` is saved.
pub fn script_path(dir: &Path, id: RequestId, extension: &str) -> PathBuf {
    dir.join(format!("cell_{id}{extension}"))
}

/// Random uppercase scratch variable name for the timing wrapper.
fn timer_var() -> String {
    let mut rng = rand::thread_rng();
    (0..TIMER_VAR_LEN)
        .map(|_| rng.gen_range(b'A'..=b'Z') as char)
        .collect()
}

/// Break lines that exceed `max_len` (newline included) into continued chunks.
pub fn split_long_lines(text: &str, max_len: usize, continuation: &str) -> String {
    let chunk_len = max_len
        .saturating_sub(1 + continuation.chars().count())
        .max(1);
    let joiner = format!("{continuation}\n");

    text.split('\n')
        .map(|line| {
            if line.chars().count() < max_len {
                return line.to_string();
            }
            let chars: Vec<char> = line.chars().collect();
            chars
                .chunks(chunk_len)
                .map(|c| c.iter().collect::<String>())
                .collect::<Vec<_>>()
                .join(&joiner)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop blank and marker lines from cell text. `None` when nothing remains.
pub fn clean_cell(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty() && !is_marker(l))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Resolve a host-supplied path for `run_file`.
///
/// Surrounding quotes are stripped and relative paths are resolved against
/// the current directory. The file must exist.
pub fn resolve_file(path: &str) -> Result<PathBuf> {
    let trimmed = path.trim().trim_matches(|c: char| c == '\'' || c == '"');
    let candidate = Path::new(trimmed);
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(candidate))
            .unwrap_or_else(|_| candidate.to_path_buf())
    };
    if absolute.is_file() {
        Ok(absolute)
    } else {
        Err(SessionError::FileNotFound(absolute))
    }
}
