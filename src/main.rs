// ABOUTME: Command-line entry point: serve the website, mirror the repository, or write a config
// ABOUTME: Initializes logging, loads .env and configuration, then dispatches the subcommand

use anyhow::{bail, Context, Result};
use brokersite::{config::Config, paths, server, upload};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "brokersite")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults to the standard search order)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the website
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Mirror the local tree onto the configured repository branch
    Upload {
        /// Walk and upload against an in-memory API; nothing is sent
        #[arg(long)]
        dry_run: bool,

        /// Commit message (defaults to one naming the file count)
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Generate a default configuration file
    InitConfig {
        /// Output path (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Serve { port } => {
            init_daemon_logging(&paths::log_dir(), filter)?;
            let mut config = Config::load_from(cli.config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            tracing::info!(
                host = %config.server.host,
                port = config.server.port,
                public_dir = %config.server.public_dir,
                "Configuration loaded"
            );
            server::run(config).await
        }
        Commands::Upload { dry_run, message } => {
            init_cli_logging(filter);
            let config = Config::load_from(cli.config.as_deref())?;
            upload::run_upload(&config.mirror, upload::UploadArgs { dry_run, message }).await?;
            Ok(())
        }
        Commands::InitConfig { output, force } => {
            init_cli_logging(filter);
            generate_config(output.as_deref(), force)
        }
    }
}

/// Initialize logging for CLI commands (stdout only).
fn init_cli_logging(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Initialize logging for the server (stdout + rotating file).
fn init_daemon_logging(log_dir: &Path, filter: EnvFilter) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    // e.g. brokersite.2026-01-15.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("brokersite")
        .filename_suffix("log")
        .build(log_dir)
        .context("Failed to create log file appender")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // the writer must outlive the server
    std::mem::forget(guard);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_target(true).with_ansi(false).with_writer(non_blocking))
        .init();

    tracing::info!("Logging to: {}", log_dir.display());
    Ok(())
}

fn generate_config(output: Option<&Path>, force: bool) -> Result<()> {
    let content = Config::default_toml();
    match output {
        Some(path) => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Configuration written");
        }
        None => print!("{content}"),
    }
    Ok(())
}
