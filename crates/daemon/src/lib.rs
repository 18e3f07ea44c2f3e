//! # ObexGate Daemon Library
//!
//! This crate provides the gateway daemon that lets a line-oriented
//! controller drive Bluetooth pairing, discovery and OBEX file transfer.
//!
//! ## Overview
//!
//! The daemon listens on a TCP port and serves one controller at a time. It
//! provides:
//!
//! - **Command Dispatch**: General `AT` commands for naming, inquiry, PINs,
//!   pairing and bonded-device management
//! - **File Transfer Sessions**: Folder browsing and uploads over an OBEX
//!   transport, with an inactivity watchdog and `ABORT` during listings
//! - **Device Store**: Persisted friendly name, paired devices and cached names
//! - **Status Indicator**: LED states for discovery, inquiry and active links
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Gateway Server (TCP)                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                      Dispatcher                           │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │          │ start-session                                        │
//! │          ▼                                                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐   │
//! │  │ FTP Session  │──│   Watchdog   │  │   Abort Listener     │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘   │
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐   │
//! │  │  Bluetooth   │  │   Devices    │  │     Indicator        │   │
//! │  │   Adapter    │  │  PIN Store   │  │                      │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use daemon::bluetooth::LoopbackAdapter;
//! use daemon::devices::{DeviceStore, PinStore};
//! use daemon::indicator::LogIndicator;
//! use daemon::{Config, Dispatcher, DispatcherConfig, GatewayServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!
//!     let dispatcher = Dispatcher::new(
//!         LoopbackAdapter::new(&config.bluetooth),
//!         Arc::new(DeviceStore::new(config.device_store_path())),
//!         PinStore::new(&config.bluetooth.pin_file),
//!         Arc::new(LogIndicator::default()),
//!         DispatcherConfig::from_config(&config, false),
//!     );
//!
//!     let server = GatewayServer::bind(config.listener.socket_addr()?).await?;
//!     server.serve(&dispatcher, CancellationToken::new()).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, legacy file and defaults
//! - [`connection`]: Framed reader and response writer over a stream
//! - [`dispatcher`]: General command handling
//! - [`session`]: File-transfer session, watchdog, abort listener and hooks
//! - [`bluetooth`]: Adapter and transport traits with a loopback backend
//! - [`devices`]: Device store and PIN file
//! - [`indicator`]: Status LED
//! - [`server`]: TCP accept loop
//! - [`logging`]: Tracing setup

pub mod bluetooth;
pub mod config;
pub mod connection;
pub mod devices;
pub mod dispatcher;
pub mod indicator;
pub mod logging;
pub mod server;
pub mod session;

pub use config::Config;
pub use connection::{Connection, FrameReader, ResponseWriter, TcpConnection};
pub use dispatcher::{ConnectionEnd, Dispatcher, DispatcherConfig};
pub use server::GatewayServer;
pub use session::{FtpSession, SessionOutcome, SessionSettings, SessionState};
