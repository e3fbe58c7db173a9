//! Hive Writer CLI - loads CSV tables into Apache Hive.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hive_writer_core::config::{Action, LogFormat};
use hive_writer_core::{Config, ConnectionFactory, Runner};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// - 0: Success
/// - 1: User error (configuration, data, destination schema, server state)
/// - 2: Application error (unexpected failure)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Error caused by configuration, input data or the destination
    UserError = 1,
    /// Unexpected internal error
    ApplicationError = 2,
}

impl ExitCode {
    /// Classify an error by the core error it wraps.
    fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<hive_writer_core::Error>() {
            Some(e) if e.is_user_error() => ExitCode::UserError,
            _ => ExitCode::ApplicationError,
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "hive-writer")]
#[command(about = "Batch writer loading CSV tables into Apache Hive", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Data directory holding config.json and in/tables
    #[arg(long, global = true, env = "KBC_DATADIR", default_value = "/data/")]
    data_dir: PathBuf,

    /// Path to configuration file (defaults to <data-dir>/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory with bundled certificates for `internal:` CA references
    #[arg(long, global = true, env = "BUNDLED_FILES_PATH")]
    bundled_files: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Load all exported tables
    Run,

    /// Check that the database is reachable
    TestConnection,

    /// Print columns of every table in the database
    GetTablesInfo,

    /// Validate configuration file
    Validate,
}

impl Commands {
    fn from_action(action: Action) -> Self {
        match action {
            Action::Run => Commands::Run,
            Action::TestConnection => Commands::TestConnection,
            Action::GetTablesInfo => Commands::GetTablesInfo,
        }
    }

    /// Sync actions answer with JSON on stdout and log only errors.
    fn is_sync(&self) -> bool {
        matches!(self, Commands::TestConnection | Commands::GetTablesInfo)
    }
}

fn main() {
    let exit_code = run_cli();
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
fn run_cli() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.data_dir.join("config.json"));

    let config = Config::from_file(&config_path);

    let command = cli.command.unwrap_or_else(|| {
        let action = config.as_ref().map(|c| c.action).unwrap_or_default();
        Commands::from_action(action)
    });
    let log_format = config
        .as_ref()
        .map(|c| c.logging.format)
        .unwrap_or_default();
    let log_level = config
        .as_ref()
        .map(|c| c.logging.level.as_directive())
        .unwrap_or("info");

    init_logging(log_format, log_level, cli.verbose, command.is_sync());

    let result = config
        .with_context(|| format!("Cannot load configuration from {}", config_path.display()))
        .and_then(|config| execute_command(command, config, &cli));

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            let exit_code = ExitCode::from_error(&e);
            match exit_code {
                ExitCode::UserError => tracing::error!(error = %e, "Command failed"),
                _ => tracing::error!(error = ?e, "Application error"),
            }
            exit_code
        }
    }
}

/// Initialize logging on stderr, keeping stdout free for JSON answers.
fn init_logging(format: LogFormat, level: &str, verbose: u8, sync: bool) {
    let filter = if sync {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new(level),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    match format {
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
}

/// Execute the CLI command.
fn execute_command(command: Commands, mut config: Config, cli: &Cli) -> Result<()> {
    config.validate()?;

    if let Commands::Validate = command {
        println!("Configuration is valid");
        return Ok(());
    }

    config.parameters.data_dir = Some(cli.data_dir.clone());
    let runner = build_runner(config, &cli.data_dir, cli.bundled_files.clone());

    match command {
        Commands::Run => commands::run::run(&runner)?,
        Commands::TestConnection => commands::test_connection::run(&runner)?,
        Commands::GetTablesInfo => commands::tables_info::run(&runner)?,
        Commands::Validate => {}
    }

    Ok(())
}

fn build_runner(config: Config, data_dir: &Path, bundled_files: Option<PathBuf>) -> Runner {
    Runner::new(config, data_dir, ConnectionFactory::new(bundled_files))
}
