//! Cell boundary detection.
//!
//! A cell is a contiguous run of buffer lines delimited by marker lines
//! (lines whose content, after leading whitespace, starts with `%%`).
//! Lookups are linear scans over the buffer on every call; editor buffers
//! are small and calls are user-paced, so nothing is cached.

use serde::Serialize;

/// Token that opens a marker line.
pub const MARKER: &str = "%%";

/// A located cell.
///
/// Line numbers are 1-indexed and inclusive. `lines` holds the executable
/// content: the start marker is stripped to its label (or dropped when the
/// label is empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub start_line: usize,
    pub end_line: usize,
    pub lines: Vec<String>,
}

impl Cell {
    /// Whether there is nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Content joined with newlines, label included. For display.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// The buffer lines `start_line..=end_line`, markers intact, ready for
    /// `Session::run_cell` (which drops marker and blank lines).
    pub fn source<S: AsRef<str>>(&self, buffer: &[S]) -> String {
        let end = self.end_line.min(buffer.len());
        if self.start_line == 0 || self.start_line > end {
            return String::new();
        }
        buffer[self.start_line - 1..end]
            .iter()
            .map(|l| l.as_ref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Check if a line is a cell marker.
pub fn is_marker(line: &str) -> bool {
    line.trim_start().starts_with(MARKER)
}

/// Strip the marker token from a marker line, returning the remaining label.
///
/// Returns `None` when nothing but whitespace follows the marker.
fn marker_label(line: &str) -> Option<&str> {
    let label = line.trim_start().strip_prefix(MARKER)?.trim();
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

/// Locate the cell enclosing `cursor_line` (1-indexed) in `buffer`.
///
/// The cursor is clamped into the buffer. A cursor sitting on a marker line
/// starts a new cell at that line. An empty buffer yields the empty range
/// `1..=0` with no content.
pub fn locate<S: AsRef<str>>(buffer: &[S], cursor_line: usize) -> Cell {
    let total = buffer.len();
    if total == 0 {
        return Cell {
            start_line: 1,
            end_line: 0,
            lines: Vec::new(),
        };
    }

    let line = |n: usize| buffer[n - 1].as_ref();
    let cursor = cursor_line.clamp(1, total);

    let start_line = (1..=cursor).rev().find(|&n| is_marker(line(n))).unwrap_or(1);
    let end_line = (cursor + 1..=total)
        .find(|&n| is_marker(line(n)))
        .map(|n| n - 1)
        .unwrap_or(total);

    let mut lines = Vec::with_capacity(end_line + 1 - start_line);
    let mut body_start = start_line;
    if is_marker(line(start_line)) {
        if let Some(label) = marker_label(line(start_line)) {
            lines.push(label.to_string());
        }
        body_start += 1;
    }
    lines.extend((body_start..=end_line).map(|n| line(n).to_string()));

    Cell {
        start_line,
        end_line,
        lines,
    }
}

/// Locate a cell in raw buffer text, splitting on `\n` / `\r\n`.
pub fn locate_in_text(text: &str, cursor_line: usize) -> Cell {
    let buffer: Vec<&str> = text.lines().collect();
    locate(&buffer, cursor_line)
}
