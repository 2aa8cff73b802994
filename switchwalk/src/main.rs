use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::net::TcpListener;

use switchwalk::config::AppConfig;
use switchwalk::error::TransportError;
use switchwalk::{Inventory, OuiLookup, TerminalRelay, WalkAdmission, WalkerBuilder};

#[derive(Debug, Parser)]
#[command(version, about = "Walk network switches and relay interactive sessions")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "switchwalk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Walk configured devices and print their latest history entry
    Walk {
        /// Only walk devices with this host
        #[arg(long)]
        host: Option<String>,
    },

    /// Serve the interactive terminal protocol
    Relay {
        /// Address to listen on (overrides `relay.listen`)
        #[arg(short, long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> switchwalk::Result<ExitCode> {
    let config = AppConfig::load(&cli.config)?;
    let inventory = Arc::new(config.inventory());
    if inventory.devices().is_empty() {
        warn!("no devices configured in {}", cli.config.display());
    }

    match cli.command {
        Command::Walk { host } => walk(&config, inventory, host.as_deref()).await,
        Command::Relay { listen } => {
            let listen = listen.unwrap_or_else(|| config.relay.listen.clone());
            let listener = TcpListener::bind(&listen)
                .await
                .map_err(TransportError::from)?;
            let manager = Arc::new(config.session_manager(inventory));
            TerminalRelay::new(manager).serve(listener).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn walk(
    config: &AppConfig,
    inventory: Arc<Inventory>,
    host: Option<&str>,
) -> switchwalk::Result<ExitCode> {
    let walker = WalkerBuilder::new(inventory.clone())
        .executor(config.executor())
        .lookup(OuiLookup::new()?)
        .config(config.walk_config())
        .build()?;

    let mut pending = Vec::new();
    for device in inventory.devices() {
        if host.is_some_and(|host| host != device.host) {
            continue;
        }
        match walker.start_walk(device.id)? {
            WalkAdmission::Accepted(handle) => pending.push((device, handle)),
            WalkAdmission::Busy => info!("{}:{} is busy", device.host, device.port),
        }
    }

    if pending.is_empty() {
        warn!("nothing to walk");
        return Ok(ExitCode::FAILURE);
    }

    let mut failures = 0;
    for (device, handle) in pending {
        match handle.await {
            Ok(outcome) => {
                if !outcome.is_completed() {
                    failures += 1;
                }
                let line = serde_json::to_string(&outcome.history).unwrap_or_default();
                println!("{}:{} {}", device.host, device.port, line);
            }
            Err(e) => {
                failures += 1;
                error!("walk of {}:{} did not finish: {}", device.host, device.port, e);
            }
        }
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
