//! LiveGraph bridge: entry point.
//!
//! Watches a graph script, re-evaluates it a short moment after every edit,
//! and streams the resulting node graph to a running rendering engine.
//!
//! # Usage
//!
//! ```text
//! livegraph [OPTIONS] <COMMAND>
//!
//! Commands:
//!   watch <FILE>          live session; type start / run / clear / end / quit
//!   run <FILE>            one cycle, exit 0 on "Correct"
//!   check <FILE>          evaluate and validate offline
//!   init-config           write the effective settings to config.toml
//!
//! Options:
//!   --host <HOST>         engine host            [env: LIVEGRAPH_HOST]
//!   --port <PORT>         engine port            [env: LIVEGRAPH_PORT]
//!   --config <PATH>       settings file          [env: LIVEGRAPH_CONFIG]
//!   --debounce-ms <MS>    quiet window before a cycle
//!   --retry-ms <MS>       delay between reconnect attempts
//! ```
//!
//! Precedence: command-line flag, then environment variable, then
//! `config.toml`, then built-in default.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use livegraph_bridge::application::{Command, ScriptRunner, Session};
use livegraph_bridge::domain::BridgeConfig;
use livegraph_bridge::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, AppConfig, ConfigError,
};
use livegraph_bridge::infrastructure::{ConsoleStatus, DocumentSource, FileDocument, FileWatcher};
use livegraph_core::domain::change::substitute_changes;
use livegraph_core::{extract, EvaluationOutcome};

/// How often the watch loop checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Live-coding bridge for node-graph rendering engines.
#[derive(Debug, Parser)]
#[command(name = "livegraph", version)]
struct Cli {
    /// Rendering engine host name or IP address.
    #[arg(long, global = true, env = "LIVEGRAPH_HOST")]
    host: Option<String>,

    /// Rendering engine TCP port.
    #[arg(long, global = true, env = "LIVEGRAPH_PORT")]
    port: Option<u16>,

    /// Settings file to use instead of the platform default.
    #[arg(long, global = true, env = "LIVEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Quiet window after the last edit before a cycle runs, in milliseconds.
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,

    /// Delay between reconnect attempts, in milliseconds.
    #[arg(long, global = true)]
    retry_ms: Option<u64>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Start a live session on FILE and read commands from stdin.
    Watch { file: PathBuf },
    /// Run one update cycle on FILE and exit.
    Run { file: PathBuf },
    /// Evaluate and validate FILE without connecting to the engine.
    Check {
        file: PathBuf,
        /// Print the serialized graph instead of "Correct".
        #[arg(long)]
        print: bool,
    },
    /// Write the effective settings to the settings file.
    InitConfig,
}

impl Cli {
    /// The settings file to read and write, if one can be determined.
    fn settings_path(&self) -> anyhow::Result<Option<PathBuf>> {
        if let Some(path) = &self.config {
            return Ok(Some(path.clone()));
        }
        match config_file_path() {
            Ok(path) => Ok(Some(path)),
            Err(ConfigError::NoPlatformConfigDir) => Ok(None),
            Err(e) => Err(e).context("locating config file"),
        }
    }

    fn load_settings(&self) -> anyhow::Result<AppConfig> {
        match self.settings_path()? {
            Some(path) => load_config_from(&path)
                .with_context(|| format!("loading settings from {}", path.display())),
            None => Ok(AppConfig::default()),
        }
    }

    /// Applies command-line overrides on top of the file settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting host is empty or the debounce window
    /// is zero.
    fn into_bridge_config(&self, settings: &AppConfig) -> anyhow::Result<BridgeConfig> {
        let mut config = settings.to_bridge_config();
        if let Some(host) = &self.host {
            config.engine_host = host.clone();
        }
        if let Some(port) = self.port {
            config.engine_port = port;
        }
        if let Some(ms) = self.debounce_ms {
            config.debounce_window = Duration::from_millis(ms);
        }
        if let Some(ms) = self.retry_ms {
            config.retry_interval = Duration::from_millis(ms);
        }

        if config.engine_host.trim().is_empty() {
            anyhow::bail!("engine host must not be empty");
        }
        if config.debounce_window.is_zero() {
            anyhow::bail!("debounce window must be at least 1 ms");
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.bridge.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.into_bridge_config(&settings)?;

    match &cli.command {
        CliCommand::Watch { file } => watch(config, file).await,
        CliCommand::Run { file } => run_once(config, file).await,
        CliCommand::Check { file, print } => check(file, *print).await,
        CliCommand::InitConfig => {
            let path = cli
                .settings_path()?
                .context("no platform config directory; pass --config <PATH>")?;
            let mut out = AppConfig::from(&config);
            out.bridge.log_level = settings.bridge.log_level.clone();
            save_config_to(&path, &out)
                .with_context(|| format!("writing settings to {}", path.display()))?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// `livegraph watch`: a live session driven by file changes and stdin.
async fn watch(config: BridgeConfig, file: &Path) -> anyhow::Result<ExitCode> {
    let mut watcher =
        FileWatcher::new(file).with_context(|| format!("watching {}", file.display()))?;

    let session = Session::new(
        config,
        Arc::new(FileDocument::new(file)),
        Arc::new(ConsoleStatus),
    );
    let id = session.start();
    info!(session = %id, file = %file.display(), "watching; commands: run, start, clear, end, quit");

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut poll = tokio::time::interval(SHUTDOWN_POLL);

    while running.load(Ordering::Relaxed) {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Some(text) = session.execute(command).await {
                            println!("{text}");
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                },
                Ok(None) => {
                    info!("stdin closed; still watching (Ctrl+C to stop)");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("stdin read failed: {e}");
                    stdin_open = false;
                }
            },
            activity = watcher.next() => match activity {
                Some(()) => session.on_editor_activity(),
                None => {
                    warn!("file watcher stopped");
                    break;
                }
            },
            _ = poll.tick() => {}
        }
    }

    session.end();
    Ok(ExitCode::SUCCESS)
}

/// `livegraph run`: connect, run one cycle, report.
async fn run_once(config: BridgeConfig, file: &Path) -> anyhow::Result<ExitCode> {
    let connect_timeout = config.connect_timeout;
    let session = Session::new(
        config,
        Arc::new(FileDocument::new(file)),
        Arc::new(ConsoleStatus),
    );
    session.open();
    if !session.wait_connected(connect_timeout).await {
        warn!(
            engine = %session.config().engine_addr(),
            "engine not reachable; the graph will not be sent"
        );
    }

    let status = session.run().await;
    session.end();
    Ok(exit_code(is_correct(&status)))
}

/// `livegraph check`: offline evaluation of the file as a first cycle sees it.
async fn check(file: &Path, print: bool) -> anyhow::Result<ExitCode> {
    let document = FileDocument::new(file);
    let source = document
        .read_text()
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let program = substitute_changes(&source, &extract("", &source).to_token());

    let outcome = ScriptRunner::new(document.base_dir()).run(&program).await;
    match (&outcome, print) {
        (EvaluationOutcome::Ok(graph), true) => println!("{graph}"),
        _ => println!("{}", outcome.status()),
    }
    Ok(exit_code(outcome.is_ok()))
}

fn is_correct(status: &str) -> bool {
    status == livegraph_core::outcome::CORRECT_STATUS
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("livegraph").chain(args.iter().copied()))
    }

    #[test]
    fn test_watch_takes_a_file() {
        let cli = parse(&["watch", "patch.lg"]);
        assert!(matches!(cli.command, CliCommand::Watch { ref file } if file == Path::new("patch.lg")));
    }

    #[test]
    fn test_check_print_flag() {
        let cli = parse(&["check", "patch.lg", "--print"]);
        assert!(matches!(cli.command, CliCommand::Check { print: true, .. }));
    }

    #[test]
    fn test_global_options_after_subcommand() {
        // Arrange / Act
        let cli = parse(&["run", "patch.lg", "--port", "7000", "--debounce-ms", "50"]);

        // Assert
        assert_eq!(cli.port, Some(7000));
        assert_eq!(cli.debounce_ms, Some(50));
    }

    #[test]
    fn test_into_bridge_config_defaults() {
        let cli = parse(&["check", "patch.lg"]);
        let config = cli.into_bridge_config(&AppConfig::default()).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_flags_override_file_settings() {
        // Arrange
        let mut settings = AppConfig::default();
        settings.engine.host = "from-file".to_string();
        settings.bridge.retry_ms = 5_000;
        let cli = parse(&["--host", "from-flag", "--retry-ms", "250", "run", "patch.lg"]);

        // Act
        let config = cli.into_bridge_config(&settings).unwrap();

        // Assert
        assert_eq!(config.engine_host, "from-flag");
        assert_eq!(config.retry_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_file_settings_apply_without_flags() {
        let mut settings = AppConfig::default();
        settings.engine.port = 7100;
        let cli = parse(&["check", "patch.lg"]);
        let config = cli.into_bridge_config(&settings).unwrap();
        assert_eq!(config.engine_port, 7100);
    }

    #[test]
    fn test_zero_debounce_is_rejected() {
        let cli = parse(&["--debounce-ms", "0", "watch", "patch.lg"]);
        assert!(cli.into_bridge_config(&AppConfig::default()).is_err());
    }

    #[test]
    fn test_empty_host_is_rejected() {
        let cli = parse(&["--host", " ", "watch", "patch.lg"]);
        assert!(cli.into_bridge_config(&AppConfig::default()).is_err());
    }

    #[test]
    fn test_explicit_config_path_is_used() {
        let cli = parse(&["--config", "/tmp/lg.toml", "init-config"]);
        assert_eq!(cli.settings_path().unwrap(), Some(PathBuf::from("/tmp/lg.toml")));
    }

    #[test]
    fn test_only_correct_counts_as_success() {
        assert!(is_correct("Correct"));
        assert!(!is_correct("Validation failed\nx"));
        assert!(!is_correct("Problem sending\nbroken pipe"));
    }
}
