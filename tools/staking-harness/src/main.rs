//! staking-harness: keeps a supervised connection to a staking chain and
//! logs the session, reward and offline notifications it produces.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rpc_failover::{ConnectionSupervisor, DomainNotification, WsTransport};
use staking_harness::load_config_dir;

/// Staking test harness
#[derive(Parser, Debug)]
#[command(name = "staking-harness", version)]
#[command(about = "Supervised chain connection with live staking notifications")]
struct Args {
    /// The path to the config directory.
    #[arg(long, default_value = "config")]
    config: PathBuf,

    /// Seconds between connection status log lines
    #[arg(long, default_value = "60")]
    status_interval: u64,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Args::parse()).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = load_config_dir(&args.config)?;
    info!("Starting the backend services.");
    info!(
        network_prefix = config.global.network_prefix,
        network = %config.network(),
        "Network selected"
    );

    let endpoints = config.endpoint_list()?;
    let transport = WsTransport::new(config.transport.clone())?;
    let supervisor = ConnectionSupervisor::create(transport, endpoints, config.supervisor.clone())
        .await
        .context("could not connect to any chain endpoint")?;

    supervisor
        .normalizer()
        .subscribe(|notification: &DomainNotification| match notification {
            DomainNotification::SessionRotated { session_index } => {
                info!(session_index, "New session");
            }
            DomainNotification::RewardPaid { stash, amount } => {
                info!(stash, amount, "Reward paid");
            }
            DomainNotification::ValidatorsOffline { offline_ids } => {
                info!(count = offline_ids.len(), ?offline_ids, "Validators offline");
            }
        });

    let mut status = tokio::time::interval(Duration::from_secs(args.status_interval.max(1)));
    info!("Harness is running. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                break;
            }
            _ = status.tick() => {
                info!(
                    state = %supervisor.state(),
                    endpoint = ?supervisor.current_endpoint().map(|e| e.to_string()),
                    reconnect_attempts = supervisor.reconnect_attempts(),
                    notifications = supervisor.normalizer().notifications_emitted(),
                    "Connection status"
                );
            }
        }
    }

    supervisor.shutdown().await;
    Ok(())
}
