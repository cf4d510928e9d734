//! Safegrade CLI: batch runner for grading platform runs and diffing the
//! capability registry.
//!
//! Results are written to stdout as JSON; logs go to stderr and a JSON log
//! file.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Safegrade: parental-control safety grading for streaming platforms
#[derive(Parser, Debug)]
#[command(name = "safegrade", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Grade one or more platform-run bundles
    Grade {
        /// Platform-run bundle files (JSON)
        #[arg(required = true)]
        bundles: Vec<PathBuf>,
        /// Framework file (overrides the configured one)
        #[arg(long)]
        framework: Option<PathBuf>,
        /// Critical failure override registry (overrides the configured one)
        #[arg(long)]
        overrides: Option<PathBuf>,
    },
    /// Show the cross-profile comparison for a bundle
    Compare {
        /// Platform-run bundle file (JSON)
        bundle: PathBuf,
    },
    /// Diff research findings against the capability registry
    Diff {
        /// Research findings (JSON array)
        #[arg(long)]
        findings: PathBuf,
        /// Canonical capability registry (JSON array)
        #[arg(long)]
        registry: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = safegrade_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Apply CLI overrides
    if cli.pretty {
        config.output.pretty = true;
    }
    if let Commands::Grade {
        framework,
        overrides,
        ..
    } = &cli.command
    {
        if let Some(framework) = framework {
            config.framework = Some(framework.clone());
        }
        if let Some(overrides) = overrides {
            config.overrides = Some(overrides.clone());
        }
    }

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let (json_layer, _guard) = if config.logging.file {
        let log_dir = config.log_dir();
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "safegrade.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, &config).await
}
