//! runcell CLI entry point.
//!
//! A line-oriented host for a runcell session: commands arrive on stdin,
//! interpreter output is relayed to stdout, diagnostics go to stderr.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{info, warn};
use runcell::{OutputStream, Session, SessionEvent, Settings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(name = "runcell")]
#[command(about = "Drive a long-running interpreter session from stdin")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Settings file (default: <config dir>/runcell/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Interpreter executable, overriding the settings file
    #[arg(long, global = true)]
    program: Option<String>,

    /// Interpreter argument (repeatable), replacing the configured args
    #[arg(long = "arg", global = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interpreter and read commands from stdin (default)
    Serve {
        /// Start a fresh interpreter whenever the current one exits
        #[arg(long)]
        auto_restart: bool,
    },

    /// Print the cell enclosing a line of a file
    Locate {
        file: PathBuf,

        /// 1-indexed line number
        line: usize,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective settings
    Config {
        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Write the effective settings (flags included) to the settings file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let settings = effective_settings(&cli);

    match cli.command {
        None => serve(settings, false).await,
        Some(Commands::Serve { auto_restart }) => serve(settings, auto_restart).await,
        Some(Commands::Locate { file, line, json }) => locate(&file, line, json),
        Some(Commands::Config { json, save }) => {
            if save {
                let path = cli
                    .settings
                    .clone()
                    .unwrap_or_else(runcell::settings::settings_path);
                runcell::settings::save_settings(&settings, &path)
                    .with_context(|| format!("Failed to save {}", path.display()))?;
                info!("Saved settings to {}", path.display());
            }
            config(&settings, json)
        }
    }
}

fn effective_settings(cli: &Cli) -> Settings {
    let mut settings = match cli.settings {
        Some(ref path) => runcell::load_settings_from(path),
        None => runcell::load_settings(),
    };
    if let Some(ref program) = cli.program {
        settings.interpreter.program = program.clone();
    }
    if !cli.args.is_empty() {
        settings.interpreter.args = cli.args.clone();
    }
    settings
}

fn locate(file: &Path, line: usize, json: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let cell = runcell::locate_in_text(&text, line);

    if json {
        println!("{}", serde_json::to_string_pretty(&cell)?);
    } else {
        println!("lines {}-{}", cell.start_line, cell.end_line);
        for l in &cell.lines {
            println!("{}", l);
        }
    }
    Ok(())
}

fn config(settings: &Settings, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(settings)?);
        return Ok(());
    }

    let profile = &settings.interpreter;
    println!("Settings file: {}", runcell::settings::settings_path().display());
    println!("Program: {}", profile.program);
    println!("Args: {:?}", profile.args);
    println!("Echo template: {}", profile.echo_template);
    println!("Run file template: {}", profile.run_file_template);
    match profile.timer_template {
        Some(ref t) => println!("Timer template: {}", t),
        None => println!("Timer template: (disabled)"),
    }
    match profile.max_line_length {
        Some(max) => println!("Max line length: {}", max),
        None => println!("Max line length: (unlimited)"),
    }
    if let Some(ref dir) = profile.working_dir {
        println!("Working dir: {}", dir.display());
    }
    println!("Startup timeout: {}s", settings.startup_timeout_secs);
    println!("Interrupt timeout: {}ms", settings.interrupt_timeout_ms);
    Ok(())
}

async fn serve(settings: Settings, auto_restart: bool) -> anyhow::Result<()> {
    let session = Arc::new(Session::new(settings));
    info!(
        "runcell session {} starting {}",
        session.name(),
        session.settings().interpreter.program
    );

    let events = session.subscribe();
    session
        .initialize()
        .await
        .context("Interpreter failed to start")?;

    let quitting = Arc::new(AtomicBool::new(false));
    let printer = tokio::spawn(print_events(
        events,
        session.clone(),
        auto_restart,
        quitting.clone(),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if let HostCommand::Quit = handle_line(&session, &line).await {
            break;
        }
    }

    quitting.store(true, Ordering::SeqCst);
    session.shutdown().await?;
    printer.abort();
    info!("runcell session {} stopped", session.name());
    Ok(())
}

enum HostCommand {
    Continue,
    Quit,
}

/// Dispatch one stdin line. Errors are reported and never end the loop.
async fn handle_line(session: &Session, line: &str) -> HostCommand {
    match dispatch(session, line).await {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            HostCommand::Continue
        }
    }
}

async fn dispatch(session: &Session, line: &str) -> anyhow::Result<HostCommand> {
    let command = line.trim();
    if let Some(path) = command.strip_prefix("run_file:") {
        session.run_file(path).await?;
    } else if let Some(rest) = command.strip_prefix("run_cell:") {
        run_cell(session, rest).await?;
    } else {
        match command {
            "cancel" => session.interrupt().await?,
            "status" => println!("{}", session.status().await),
            "kill" | "quit" => return Ok(HostCommand::Quit),
            _ => {
                session.run_code(line).await?;
            }
        }
    }
    Ok(HostCommand::Continue)
}

/// `<path>:<line>`: locate the cell around `line` in `path` and run it.
async fn run_cell(session: &Session, target: &str) -> anyhow::Result<()> {
    let (path, line) = target
        .rsplit_once(':')
        .context("Expected run_cell:<path>:<line>")?;
    let line: usize = line
        .trim()
        .parse()
        .with_context(|| format!("Invalid line number '{}'", line))?;
    let text = std::fs::read_to_string(path.trim())
        .with_context(|| format!("Failed to read {}", path.trim()))?;

    let buffer: Vec<&str> = text.lines().collect();
    let cell = runcell::locate(&buffer, line);
    info!(
        "Running cell at lines {}-{} of {}",
        cell.start_line,
        cell.end_line,
        path.trim()
    );
    session.run_cell(&cell.source(&buffer)).await?;
    Ok(())
}

async fn print_events(
    mut events: broadcast::Receiver<SessionEvent>,
    session: Arc<Session>,
    auto_restart: bool,
    quitting: Arc<AtomicBool>,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Output { stream, line }) => match stream {
                OutputStream::Stdout => println!("{}", line),
                OutputStream::Stderr => eprintln!("{}", line),
            },
            Ok(SessionEvent::Interrupted { request_id }) => {
                eprintln!("Interrupted request {}", request_id)
            }
            Ok(SessionEvent::Cancelled { request_ids }) => {
                eprintln!("Cancelled requests {:?}", request_ids)
            }
            Ok(SessionEvent::Exited { code }) => {
                if quitting.load(Ordering::SeqCst) {
                    continue;
                }
                eprintln!("Interpreter exited (code {:?})", code);
                if auto_restart {
                    restart(&session).await;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Dropped {} session events", n)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn restart(session: &Session) {
    // Exited is broadcast while the session is being marked Terminated, so
    // initialize() below sees the terminated state.
    info!("Restarting interpreter");
    if let Err(e) = session.initialize().await {
        eprintln!("Error: {}", e);
    }
}
