//! Cacheprog - remote-backed build cache
//!
//! CLI entry point that dispatches to subcommands. stdout belongs to the
//! protocol, so logs and errors always go to stderr.

use cacheprog::cli::{Cli, Commands};
use cacheprog::config::{Config, ConfigManager, LogFormat};
use cacheprog::error::CacheResult;
use clap::Parser;
use console::{style, Term};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let term = Term::stderr();
            let _ = term.write_line(&format!("{} {}", style("Error:").red().bold(), e));
            if let Some(hint) = e.hint() {
                let _ = term.write_line(&format!("{} {}", style("Hint:").yellow(), hint));
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    let mut config = config_manager.load().await?;
    cli.overrides.apply(&mut config);
    init_logging(cli.verbose, &config);
    debug!(path = %config_manager.path().display(), "Configuration resolved");

    let command = cli.command.unwrap_or(Commands::Serve);
    if !matches!(command, Commands::Config(_)) {
        config_manager.validate(&config)?;
    }

    match command {
        Commands::Serve => cacheprog::cli::commands::serve(&config).await,
        Commands::Clear(args) => cacheprog::cli::commands::clear(args, &config).await,
        Commands::Config(args) => {
            cacheprog::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `--debug` needs at least info.
/// `RUST_LOG` overrides both.
fn init_logging(verbose: u8, config: &Config) {
    let level = match verbose {
        0 if config.logging.debug => "info",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cacheprog={}", level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.without_time().init(),
    }
}
