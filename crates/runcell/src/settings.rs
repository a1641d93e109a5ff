//! Interpreter and session settings.
//!
//! Settings are stored in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/runcell/settings.json
//! - Linux: ~/.config/runcell/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\runcell\settings.json
//!
//! Every field has a default, so a partial file only overrides what it names.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Placeholder replaced by the completion sentinel in `echo_template`.
pub const MARKER_PLACEHOLDER: &str = "{marker}";

/// How to launch and talk to one kind of interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterProfile {
    /// Executable to spawn
    pub program: String,

    /// Fixed argument list
    pub args: Vec<String>,

    /// Command that prints `{marker}` on its own line
    pub echo_template: String,

    /// Command that runs the file at `{path}`
    pub run_file_template: String,

    /// Wrapper that times `{code}` using a scratch variable `{var}`.
    /// `None` disables timing.
    pub timer_template: Option<String>,

    /// Longest line the interpreter accepts, including the newline
    pub max_line_length: Option<usize>,

    /// Appended to a line that continues on the next one
    pub line_continuation: String,

    /// Working directory for the interpreter (inherits ours when unset)
    pub working_dir: Option<PathBuf>,

    /// Extension for the scripts multi-line requests are saved to and run
    /// with `run_file_template`. `None` writes their lines to stdin directly,
    /// so an interrupt only stops the line that is running.
    pub script_extension: Option<String>,
}

impl Default for InterpreterProfile {
    fn default() -> Self {
        Self {
            program: "matlab".to_string(),
            args: vec!["-nosplash".to_string(), "-nodesktop".to_string()],
            echo_template: "disp('{marker}');".to_string(),
            run_file_template: "run('{path}');".to_string(),
            timer_template: Some(
                "{var}=tic;{code},try,toc({var}),catch,end,clear('{var}');".to_string(),
            ),
            max_line_length: Some(4096),
            line_continuation: " ...".to_string(),
            working_dir: None,
            script_extension: Some(".m".to_string()),
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub interpreter: InterpreterProfile,

    /// How long `initialize()` waits for the interpreter to become ready
    pub startup_timeout_secs: u64,

    /// How long `interrupt()` waits for the interpreter to acknowledge
    pub interrupt_timeout_ms: u64,

    /// Buffered events per subscriber before slow receivers lag
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interpreter: InterpreterProfile::default(),
            startup_timeout_secs: 120,
            interrupt_timeout_ms: 2000,
            event_capacity: 1024,
        }
    }
}

impl Settings {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn interrupt_timeout(&self) -> Duration {
        Duration::from_millis(self.interrupt_timeout_ms)
    }
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("runcell")
        .join("settings.json")
}

/// Load settings from the default location, returning defaults if the file
/// doesn't exist or can't be parsed.
pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// Load settings from `path`, returning defaults on any failure.
pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }
    match std::fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            log::warn!(
                "[settings] Ignoring invalid settings file {:?}: {}",
                path,
                e
            );
            Settings::default()
        }),
        Err(e) => {
            log::warn!("[settings] Failed to read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

/// Save settings to `path`, creating parent directories.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}
