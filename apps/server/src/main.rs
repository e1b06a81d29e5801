//! Snapspot Server - Standalone headless Spotify Connect endpoint.
//!
//! Advertises the device over mDNS, completes the zeroconf handshake with
//! Connect clients and hands the resulting credentials to the player process
//! through the data directory.

mod config;
mod credentials;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use snapspot_core::{
    bootstrap_services, LocalIpDetector, LoggingEventEmitter, MdnsAdvertiser, NetworkContext,
    SessionState,
};
use tokio::signal;

use crate::config::ServerConfig;
use crate::credentials::CredentialHandoffAuthenticator;

/// Snapspot Server - Headless Spotify Connect zeroconf endpoint.
#[derive(Parser, Debug)]
#[command(name = "snapspot-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SNAPSPOT_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "SNAPSPOT_BIND_PORT")]
    port: Option<u16>,

    /// Device name shown in Connect clients (overrides config file).
    #[arg(short = 'n', long, env = "SNAPSPOT_DEVICE_NAME")]
    name: Option<String>,

    /// Advertise IP address (overrides config file).
    #[arg(short = 'a', long, env = "SNAPSPOT_ADVERTISE_IP")]
    advertise_ip: Option<std::net::IpAddr>,

    /// Data directory for the device id and handed-off credentials.
    #[arg(short = 'd', long, env = "SNAPSPOT_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Snapspot Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(name) = args.name {
        config.device_name = name;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    // Resolve advertise IP: use explicit config, or fall back to auto-detection
    let network = if let Some(ip) = config.advertise_ip {
        log::info!(
            "Configuration: bind_port={}, advertise_ip={}",
            config.bind_port,
            ip
        );
        NetworkContext::explicit(config.bind_port, ip)
    } else {
        log::info!(
            "Configuration: bind_port={}, advertise_ip=auto",
            config.bind_port
        );
        NetworkContext::auto_detect(config.bind_port, LocalIpDetector::arc()).context(
            "Failed to auto-detect local IP address. \
             Please specify --advertise-ip or set SNAPSPOT_ADVERTISE_IP to the IP \
             address that Connect clients can reach.",
        )?
    };

    let handoff_dir = match &config.data_dir {
        Some(dir) => dir.clone(),
        None => {
            let dir = std::env::temp_dir().join("snapspot");
            log::warn!(
                "No data directory configured - device id will not persist, credentials go to {}",
                dir.display()
            );
            dir
        }
    };
    let authenticator = Arc::new(CredentialHandoffAuthenticator::new(handoff_dir));

    // Bootstrap services with explicit network configuration
    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config, network, authenticator)
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    // Surface handshake and session events in debug logs
    services
        .event_bridge
        .set_external_emitter(Arc::new(LoggingEventEmitter));

    let port = services
        .start()
        .await
        .context("Failed to start zeroconf listener")?;
    log::info!("Zeroconf endpoint listening on port {}", port);

    // mDNS is best effort; clients can still be pointed at the port directly
    let advertiser = if config.mdns {
        match MdnsAdvertiser::new(&services.identity, services.network.get_local_ip(), port) {
            Ok(advertiser) => Some(advertiser),
            Err(e) => {
                log::warn!("mDNS advertisement failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut states = services.sessions.stream();
    let state_logger = tokio::spawn(async move {
        while let Some(state) = states.next().await {
            match state {
                SessionState::Idle => log::info!("Session: idle"),
                SessionState::Creating { username } => {
                    log::info!("Session: creating for {}", username)
                }
                SessionState::Created(info) => {
                    log::info!("Session: active for {}", info.username)
                }
                SessionState::Error { message } => log::warn!("Session: failed: {}", message),
            }
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    if let Some(advertiser) = advertiser {
        advertiser.shutdown();
    }
    services.shutdown().await;
    state_logger.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
