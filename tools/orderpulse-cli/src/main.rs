//! OrderPulse CLI - stability probe for the realtime order channel
//!
//! Runs scripted connection checks against a deployment and prints a
//! per-check summary with an aggregate verdict. The process exits 0 only
//! when the channel is judged stable.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orderpulse_core::ProbeConfig;
use orderpulse_probe::{CheckKind, ProbeRunner};

/// OrderPulse - connection stability probe for realtime order channels
#[derive(Parser)]
#[command(name = "orderpulse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// REST base URL of the platform, overrides the config file
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Explicit channel endpoint, overrides the config file
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Business whose order channel is probed, overrides the config file
    #[arg(long, global = true)]
    business_id: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full check battery (the default)
    All,
    /// Connection establishment for the business and admin roles
    Connect,
    /// Heartbeat ping/pong round-trips
    Heartbeat,
    /// Hold an idle connection open
    Idle,
    /// Subscribe, reconnect, subscribe again
    Resubscribe,
    /// Inject a test order and await its push
    Notify,
    /// Connect without a business_id and expect refusal
    Reject,
}

impl Commands {
    fn checks(&self) -> Vec<CheckKind> {
        match self {
            Commands::All => CheckKind::ALL.to_vec(),
            Commands::Connect => vec![CheckKind::ConnectBusiness, CheckKind::ConnectAdmin],
            Commands::Heartbeat => vec![CheckKind::Heartbeat],
            Commands::Idle => vec![CheckKind::IdleHold],
            Commands::Resubscribe => vec![CheckKind::Resubscribe],
            Commands::Notify => vec![CheckKind::OrderNotification],
            Commands::Reject => vec![CheckKind::RejectionPath],
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    let config = load_config(&cli)?;
    let checks = cli.command.as_ref().unwrap_or(&Commands::All).checks();
    let runner = ProbeRunner::with_checks(config, checks);

    // Ctrl-C stops the battery between checks; the partial summary still
    // prints
    let interrupted = runner.interrupt_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current check");
            interrupted.store(true, Ordering::SeqCst);
        }
    });

    println!(
        "{} probing {}",
        "OrderPulse".cyan().bold(),
        runner.config().base_url
    );
    let report = runner.run().await?;
    report.print_summary();

    Ok(if report.is_stable() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose { "debug" } else { &cli.log_level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

/// Config file if given, built-in defaults otherwise, flags on top
fn load_config(cli: &Cli) -> Result<ProbeConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let parsed: ProbeConfig = toml::from_str(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            info!("loaded config from {}", path.display());
            parsed
        }
        None => {
            info!("no config file given, using built-in demo credentials");
            ProbeConfig::default()
        }
    };

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(ws_url) = &cli.ws_url {
        config.ws_url = Some(ws_url.clone());
    }
    if let Some(business_id) = cli.business_id {
        config.business_id = business_id;
    }
    Ok(config)
}
