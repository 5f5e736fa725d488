use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stt_core::{AppConfig, DaemonClient};

mod commands;

#[derive(Parser)]
#[command(name = "stt")]
#[command(author, version, about = "Route selected domains around the VPN tunnel")]
struct Cli {
    /// Configuration file (defaults to ~/.config/split-the-tunnel/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the routing daemon in the foreground
    Daemon {
        /// Unix socket to listen on
        #[arg(long)]
        socket: Option<PathBuf>,
        /// State file
        #[arg(long)]
        state: Option<PathBuf>,
        /// Minutes between DNS re-checks (0 disables)
        #[arg(long)]
        check_interval_min: Option<u64>,
        /// Debug logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Route domains through the non-VPN gateway
    Add {
        #[arg(required = true, value_parser = clap::builder::NonEmptyStringValueParser::new())]
        domains: Vec<String>,
    },
    /// Stop routing domains around the VPN
    Remove {
        #[arg(required = true, value_parser = clap::builder::NonEmptyStringValueParser::new())]
        domains: Vec<String>,
    },
    /// Show routed domains
    List,
    /// Remove every route and entry
    Purge,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    if let Commands::Daemon {
        socket,
        state,
        check_interval_min,
        verbose,
    } = &cli.command
    {
        if socket.is_some() {
            config.daemon.socket_path = socket.clone();
        }
        if state.is_some() {
            config.daemon.state_path = state.clone();
        }
        if let Some(minutes) = check_interval_min {
            config.daemon.check_interval_min = *minutes;
        }
        config.general.verbose |= *verbose;
    }

    init_logging(config.general.verbose);

    let client = || DaemonClient::new(config.socket_path());
    let ok = match cli.command {
        Commands::Daemon { .. } => {
            commands::daemon::run(&config).await?;
            true
        }
        Commands::Add { domains } => commands::routes::add(&client(), domains).await?,
        Commands::Remove { domains } => commands::routes::remove(&client(), domains).await?,
        Commands::List => commands::routes::list(&client()).await?,
        Commands::Purge => commands::routes::purge(&client()).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
