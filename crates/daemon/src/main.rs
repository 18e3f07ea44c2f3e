//! ObexGate Daemon
//!
//! Bluetooth OBEX gateway for line-oriented controllers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use daemon::bluetooth::LoopbackAdapter;
use daemon::config::{Backend, Config};
use daemon::devices::{DeviceStore, PinStore};
use daemon::indicator::{CommandIndicator, Indicator, LedState, LogIndicator};
use daemon::{logging, Dispatcher, DispatcherConfig, GatewayServer};
use tokio_util::sync::CancellationToken;

/// ObexGate Daemon - Bluetooth OBEX gateway for line-oriented controllers.
#[derive(Parser, Debug)]
#[command(name = "obexgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging, including every command received
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to a legacy key=value settings file
    #[arg(long, value_name = "FILE")]
    pub legacy_config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    let legacy = cli
        .legacy_config
        .clone()
        .or_else(|| config.daemon.legacy_config.clone());
    if let Some(path) = legacy {
        config.apply_legacy(&path)?;
    }

    config.apply_env_overrides();
    if let Some(listen) = cli.listen {
        config.listener.address = listen.ip().to_string();
        config.listener.port = listen.port();
    }
    config.validate().context("Invalid configuration")?;

    let _log_guard = logging::init(&config.daemon, cli.verbose)?;
    tracing::info!("ObexGate daemon starting...");
    if let Some(path) = &cli.config {
        tracing::info!("Using config file: {:?}", path);
    }

    let devices = Arc::new(DeviceStore::new(config.device_store_path()));
    devices.load()?;
    let pins = PinStore::new(&config.bluetooth.pin_file);

    let indicator: Arc<dyn Indicator> = if config.indicator.enabled {
        Arc::new(CommandIndicator::new(
            config.indicator.command.clone(),
            LedState::Off,
        ))
    } else {
        Arc::new(LogIndicator::default())
    };
    indicator.set(LedState::FlashDiscoverable);

    let adapter = match config.bluetooth.backend {
        Backend::Loopback => {
            tracing::info!(root = ?config.bluetooth.root, "using loopback Bluetooth backend");
            LoopbackAdapter::new(&config.bluetooth)
        }
    };

    let dispatcher = Dispatcher::new(
        adapter,
        devices,
        pins,
        indicator.clone(),
        DispatcherConfig::from_config(&config, cli.verbose),
    );
    dispatcher.restore_local_name().await;

    let addr = config.listener.socket_addr()?;
    let server = GatewayServer::bind(addr)
        .await
        .with_context(|| format!("Failed to listen on {}", addr))?;
    tracing::info!("Listening on {}", addr);

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        token.cancel();
    });

    server.serve(&dispatcher, shutdown).await;

    indicator.set(LedState::Off);
    tracing::info!("ObexGate daemon stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("Failed to register signal handlers: {}", e);
            std::future::pending::<()>().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["obexgate"]).unwrap();
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
        assert!(cli.listen.is_none());
    }

    #[test]
    fn test_cli_options() {
        let cli = Cli::try_parse_from([
            "obexgate",
            "--config",
            "/etc/obexgate.toml",
            "-v",
            "--legacy-config",
            "/tmp/bt_obex.conf",
            "--listen",
            "127.0.0.1:2004",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/obexgate.toml")));
        assert!(cli.verbose);
        assert_eq!(cli.legacy_config, Some(PathBuf::from("/tmp/bt_obex.conf")));
        assert_eq!(cli.listen, Some("127.0.0.1:2004".parse().unwrap()));
    }

    #[test]
    fn test_cli_rejects_bad_listen_address() {
        assert!(Cli::try_parse_from(["obexgate", "--listen", "nowhere"]).is_err());
    }
}
