//! dynscan CLI - rate-limited full-table scans of DynamoDB.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dynscan_core::config::LogFormat;
use dynscan_core::{Config, StoreError};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, missing table, bad options)
    ConfigError = 1,
    /// The table does not exist
    TableNotFound = 2,
    /// Store transport failure (network, throttling past the retry budget)
    TransportError = 3,
    /// General runtime error
    RuntimeError = 10,
    /// Signal interrupt (SIGINT = 2, so 128 + 2 = 130)
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Map an error to an exit code by its library error kind.
    fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<dynscan_core::Error>() {
            Some(dynscan_core::Error::Config(_)) => ExitCode::ConfigError,
            Some(dynscan_core::Error::Store(StoreError::TableNotFound { .. })) => {
                ExitCode::TableNotFound
            }
            Some(dynscan_core::Error::Store(_)) => ExitCode::TransportError,
            Some(dynscan_core::Error::Interrupted) => ExitCode::SignalInterrupt,
            Some(_) => ExitCode::RuntimeError,
            None if error.downcast_ref::<toml::de::Error>().is_some() => ExitCode::ConfigError,
            None => ExitCode::RuntimeError,
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "dynscan")]
#[command(about = "Rate-limited full-table scans of DynamoDB", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a table and print its items as JSON lines
    Scan {
        #[command(flatten)]
        overrides: commands::ScanOverrides,

        /// How items are delivered
        #[arg(long, value_enum, default_value_t = commands::scan::Mode::Collect)]
        mode: commands::scan::Mode,

        /// Pretty-print each item
        #[arg(long)]
        pretty: bool,

        /// Print Prometheus metrics to stderr when the scan completes
        #[arg(long)]
        metrics: bool,
    },

    /// Count the items of a table
    Count {
        #[command(flatten)]
        overrides: commands::ScanOverrides,
    },

    /// Validate configuration file
    Validate,
}

fn main() {
    let exit_code = run_cli();
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Peek at the config for logging settings (optional - falls back to defaults)
    let monitoring = config_path(&cli.config)
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.monitoring)
        .unwrap_or_default();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(monitoring.log_level.as_directive()),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Logs go to stderr; stdout carries scan output only
    match monitoring.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }

    match execute_command(cli) {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan {
            overrides,
            mode,
            pretty,
            metrics,
        } => {
            let config = overrides.apply(load_config(&cli.config)?)?;
            commands::scan::run(config, mode, pretty, metrics)?;
        }

        Commands::Count { overrides } => {
            let config = overrides.apply(load_config(&cli.config)?)?;
            commands::count::run(config)?;
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config.validate()?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}

/// Explicit `--config`, else `config.toml` if present.
fn config_path(path: &Option<PathBuf>) -> Option<PathBuf> {
    match path {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from("config.toml")).filter(|p| p.exists()),
    }
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match config_path(path) {
        Some(path) => Ok(read_config(&path)?),
        None => Ok(Config::default()),
    }
}

fn read_config(path: &Path) -> dynscan_core::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        dynscan_core::Error::Config(format!("Couldn't read {}: {e}", path.display()))
    })?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_exit_codes() {
        let cases = [
            (dynscan_core::Error::Config("bad".into()), ExitCode::ConfigError),
            (
                StoreError::TableNotFound {
                    table: "t".into(),
                }
                .into(),
                ExitCode::TableNotFound,
            ),
            (
                StoreError::Transport("reset".into()).into(),
                ExitCode::TransportError,
            ),
            (
                StoreError::Throttled {
                    table: "t".into(),
                    attempts: 6,
                }
                .into(),
                ExitCode::TransportError,
            ),
            (dynscan_core::Error::Interrupted, ExitCode::SignalInterrupt),
            (
                dynscan_core::Error::Consumer("closed".into()),
                ExitCode::RuntimeError,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ExitCode::from_error(&anyhow::Error::new(error)), expected);
        }
        assert_eq!(
            ExitCode::from_error(&anyhow::anyhow!("something else")),
            ExitCode::RuntimeError
        );
    }

    #[test]
    fn test_load_explicit_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [store]
            table_name = "Orders"

            [scan]
            items_per_page = 25
            "#
        )
        .unwrap();

        let config = load_config(&Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.store.table_name.as_deref(), Some("Orders"));
        assert_eq!(config.scan.items_per_page, 25);
    }

    #[test]
    fn test_missing_config_file_is_config_error() {
        let err = load_config(&Some(PathBuf::from("/nonexistent/dynscan.toml"))).unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::ConfigError);
    }

    #[test]
    fn test_malformed_config_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scan]\nitems_per_page = \"many\"").unwrap();

        let err = load_config(&Some(file.path().to_path_buf())).unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::ConfigError);
    }
}
