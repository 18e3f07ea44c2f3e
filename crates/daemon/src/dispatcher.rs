//! Command dispatcher for one controller connection.
//!
//! The dispatcher reads general `AT` commands, carries them out against the
//! Bluetooth adapter and the device store, and answers each with one
//! response. A start-session command hands the connection to an
//! [`FtpSession`] and takes it back when the session ends.

use std::str::FromStr;
use std::sync::Arc;

use protocol::{
    classify_general, parse_dial_string, parse_pair_target, strip_quotes, validate_name,
    validate_pin, validate_register, DeviceAddress, ErrorCode, GeneralCommand, Line,
    ProtocolError, Response, Result,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bluetooth::{AdapterError, BluetoothAdapter, PairOutcome};
use crate::config::Config;
use crate::connection::Connection;
use crate::devices::{DeviceStore, PairedDevice, PinStore};
use crate::indicator::{Indicator, LedState};
use crate::session::{run_hook, FtpSession, SessionOutcome, SessionSettings};

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The controller closed the channel.
    PeerClosed,
    /// The controller sent a hang-up.
    HungUp,
    /// Reading or writing the channel failed.
    ChannelError,
    /// The daemon is stopping.
    Shutdown,
}

/// Settings fixed for the lifetime of a dispatcher.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Log every command line received.
    pub verbose: bool,
    /// Settings handed to each file-transfer session.
    pub session: SessionSettings,
    /// Command run after the link comes up.
    pub start_hook: Option<String>,
    /// Command run after the session ends.
    pub end_hook: Option<String>,
}

impl DispatcherConfig {
    /// Build from the daemon configuration.
    pub fn from_config(config: &Config, verbose: bool) -> Self {
        let hook = |command: &str| {
            let command = command.trim();
            (!command.is_empty()).then(|| command.to_string())
        };

        Self {
            verbose,
            session: SessionSettings {
                inactive_timeout: config.session.inactive_timeout(),
                drain_quiet: config.session.drain_quiet(),
            },
            start_hook: hook(&config.session.start_hook),
            end_hook: hook(&config.session.end_hook),
        }
    }
}

enum Next<R, W> {
    Continue(Connection<R, W>),
    Closed,
    Shutdown,
}

/// Carries out general commands for one connection at a time.
pub struct Dispatcher<A: BluetoothAdapter> {
    adapter: A,
    devices: Arc<DeviceStore>,
    pins: PinStore,
    indicator: Arc<dyn Indicator>,
    config: DispatcherConfig,
}

impl<A: BluetoothAdapter> Dispatcher<A> {
    /// Create a dispatcher over its collaborators.
    pub fn new(
        adapter: A,
        devices: Arc<DeviceStore>,
        pins: PinStore,
        indicator: Arc<dyn Indicator>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            adapter,
            devices,
            pins,
            indicator,
            config,
        }
    }

    /// The adapter in use.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// The device store in use.
    pub fn devices(&self) -> &Arc<DeviceStore> {
        &self.devices
    }

    /// Put the stored friendly name back on the adapter.
    pub async fn restore_local_name(&self) {
        match self.devices.friendly_name() {
            Ok(Some(name)) => match self.adapter.set_local_name(&name).await {
                Ok(()) => info!(name = %name, "restored friendly name"),
                Err(e) => warn!("Failed to restore friendly name: {}", e),
            },
            Ok(None) => debug!("no stored friendly name"),
            Err(e) => warn!("Failed to read friendly name: {}", e),
        }
    }

    /// Serve commands until the controller hangs up or the channel closes.
    pub async fn serve<R, W>(&self, conn: Connection<R, W>) -> Result<ConnectionEnd>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        self.serve_until(conn, &CancellationToken::new()).await
    }

    /// Like [`Dispatcher::serve`], also ending when `shutdown` is cancelled.
    ///
    /// A running session is told to stop and is awaited, so its transport is
    /// released before this returns.
    pub async fn serve_until<R, W>(
        &self,
        conn: Connection<R, W>,
        shutdown: &CancellationToken,
    ) -> Result<ConnectionEnd>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let mut conn = conn;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(ConnectionEnd::Shutdown),
                next = conn.reader.next_line() => next,
            };
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(ConnectionEnd::PeerClosed),
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "command channel failed");
                    return Ok(ConnectionEnd::ChannelError);
                }
                Err(e) => {
                    warn!(error = %e, "discarding unreadable line");
                    conn.writer
                        .send(&Response::Error(ErrorCode::UnknownCommand))
                        .await?;
                    continue;
                }
            };

            if self.config.verbose {
                info!(line = %line, "command received");
            }

            let command = classify_general(&line);
            debug!(command = command.name(), "general command");

            match command {
                GeneralCommand::HangUp => {
                    conn.writer.send(&Response::BtDown).await?;
                    return Ok(ConnectionEnd::HungUp);
                }
                GeneralCommand::StartSession(dial) => {
                    conn = match self.start_session(conn, &dial, shutdown).await? {
                        Next::Continue(conn) => conn,
                        Next::Closed => return Ok(ConnectionEnd::PeerClosed),
                        Next::Shutdown => return Ok(ConnectionEnd::Shutdown),
                    };
                }
                command => {
                    for response in self.execute(command, &line).await {
                        conn.writer.send(&response).await?;
                    }
                }
            }
        }
    }

    /// Responses for every command that does not take over the connection.
    async fn execute(&self, command: GeneralCommand, line: &Line) -> Vec<Response> {
        match command {
            GeneralCommand::NoEcho => vec![Response::Ok],
            GeneralCommand::SetRegister(assignment) => vec![match validate_register(&assignment) {
                Ok(()) => Response::Ok,
                Err(e) => {
                    debug!(error = %e, "rejecting register");
                    Response::Error(ErrorCode::InvalidArgument)
                }
            }],
            GeneralCommand::RemoveDevice(arg) => vec![self.remove_device(&arg).await],
            GeneralCommand::RemoveAllDevices => vec![self.remove_all_devices().await],
            GeneralCommand::SetName(arg) => vec![self.set_name(&arg).await],
            GeneralCommand::GetName => self.get_name(),
            GeneralCommand::Inquire => self.inquire().await,
            GeneralCommand::SetPin(arg) => vec![self.set_pin(&arg)],
            GeneralCommand::ListDevices => self.list_devices(),
            GeneralCommand::InitPair(arg) => self.init_pair(&arg).await,
            GeneralCommand::Unknown => {
                debug!(line = %line, "unknown command");
                vec![Response::Error(ErrorCode::UnknownCommand)]
            }
            GeneralCommand::HangUp | GeneralCommand::StartSession(_) => {
                vec![Response::Error(ErrorCode::UnknownCommand)]
            }
        }
    }

    async fn remove_device(&self, arg: &str) -> Response {
        let Ok(address) = DeviceAddress::from_str(arg.trim()) else {
            debug!(arg, "remove-device with invalid address");
            return Response::Error(ErrorCode::InvalidDevice);
        };

        let bonded = match self.adapter.remove_bond(&address).await {
            Ok(bonded) => bonded,
            Err(e) => {
                warn!(%address, "Failed to remove bond: {}", e);
                return Response::Error(ErrorCode::AdapterFailure);
            }
        };
        let recorded = match self.devices.remove(&address) {
            Ok(record) => record.is_some(),
            Err(e) => {
                warn!(%address, "Failed to remove device record: {}", e);
                return Response::Error(ErrorCode::AdapterFailure);
            }
        };

        if recorded {
            self.persist();
        }
        if bonded || recorded {
            info!(%address, "device removed");
            Response::Ok
        } else {
            Response::Error(ErrorCode::InvalidDevice)
        }
    }

    async fn remove_all_devices(&self) -> Response {
        let removed = match self.devices.remove_all() {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Failed to clear device records: {}", e);
                return Response::Error(ErrorCode::AdapterFailure);
            }
        };

        for device in &removed {
            if let Err(e) = self.adapter.remove_bond(&device.address).await {
                warn!(address = %device.address, "Failed to remove bond: {}", e);
            }
        }
        self.persist();
        info!(count = removed.len(), "all devices removed");
        Response::Ok
    }

    async fn set_name(&self, arg: &str) -> Response {
        let name = match strip_quotes(arg) {
            Ok(name) => name,
            Err(e) => {
                debug!(error = %e, "rejecting name");
                return Response::Error(ErrorCode::InvalidArgument);
            }
        };
        if validate_name(name).is_err() {
            return Response::Error(ErrorCode::ArgumentTooLong);
        }

        if let Err(e) = self.adapter.set_local_name(name).await {
            warn!("Failed to set friendly name: {}", e);
            return Response::Error(ErrorCode::AdapterFailure);
        }

        let stored = (!name.is_empty()).then(|| name.to_string());
        match self.devices.set_friendly_name(stored) {
            Ok(()) => {
                self.persist();
                info!(name, "friendly name set");
                Response::Ok
            }
            Err(e) => {
                warn!("Failed to store friendly name: {}", e);
                Response::Error(ErrorCode::AdapterFailure)
            }
        }
    }

    fn get_name(&self) -> Vec<Response> {
        match self.devices.friendly_name() {
            Ok(Some(name)) => vec![Response::Data(name), Response::Ok],
            Ok(None) => vec![Response::Ok],
            Err(e) => {
                warn!("Failed to read friendly name: {}", e);
                vec![Response::Error(ErrorCode::AdapterFailure)]
            }
        }
    }

    async fn inquire(&self) -> Vec<Response> {
        let previous = self.indicator.current();
        self.indicator.set(LedState::FlashInquiry);

        let responses = match self.adapter.inquire().await {
            Ok(found) => {
                info!(count = found.len(), "inquiry finished");
                let mut responses = Vec::with_capacity(found.len() + 1);
                for device in found {
                    if let Some(name) = &device.name {
                        if let Err(e) = self.devices.cache_name(device.address, name.as_str()) {
                            warn!("Failed to cache device name: {}", e);
                        }
                    }
                    responses.push(Response::Data(device.to_line()));
                }
                self.persist();
                responses.push(Response::Ok);
                responses
            }
            Err(e) => {
                warn!("Inquiry failed: {}", e);
                vec![Response::Error(ErrorCode::AdapterFailure)]
            }
        };

        self.indicator.set(previous);
        responses
    }

    fn set_pin(&self, arg: &str) -> Response {
        let pin = match strip_quotes(arg) {
            Ok(pin) => pin,
            Err(e) => {
                debug!(error = %e, "rejecting PIN");
                return Response::Error(ErrorCode::InvalidArgument);
            }
        };
        if validate_pin(pin).is_err() {
            return Response::Error(ErrorCode::ArgumentTooLong);
        }

        match self.pins.set(pin) {
            Ok(()) => Response::Ok,
            Err(e) => {
                warn!("{:#}", e);
                Response::Error(ErrorCode::PinRejected)
            }
        }
    }

    fn list_devices(&self) -> Vec<Response> {
        match self.devices.list() {
            Ok(devices) => devices
                .iter()
                .map(|device| Response::Data(device.to_line()))
                .chain(std::iter::once(Response::Ok))
                .collect(),
            Err(e) => {
                warn!("Failed to list devices: {}", e);
                vec![Response::Error(ErrorCode::AdapterFailure)]
            }
        }
    }

    async fn init_pair(&self, arg: &str) -> Vec<Response> {
        let parsed = parse_pair_target(arg).and_then(|compact| compact.parse::<DeviceAddress>());
        let address = match parsed {
            Ok(address) => address,
            Err(e) => {
                debug!(error = %e, "pairing with invalid address");
                return vec![Response::Error(ErrorCode::InvalidDevice)];
            }
        };

        let name = self.lookup_name(&address).await;
        let previous = self.indicator.current();
        self.indicator.set(LedState::Solid);

        let responses = match self.adapter.pair(&address).await {
            PairOutcome::NotStarted => {
                warn!(%address, "pairing did not start");
                vec![Response::Error(ErrorCode::InvalidDevice)]
            }
            PairOutcome::Completed(code) => {
                info!(%address, code, "pairing finished");
                if code == 0 {
                    let stored = name.clone().unwrap_or_default();
                    match self.devices.upsert(PairedDevice::new(address, stored)) {
                        Ok(()) => self.persist(),
                        Err(e) => warn!("Failed to record paired device: {}", e),
                    }
                }
                vec![Response::Ok, Response::pair(code, arg)]
            }
        };

        if let Err(e) = self.pins.clear() {
            warn!("{:#}", e);
        }
        self.indicator.set(previous);
        responses
    }

    async fn start_session<R, W>(
        &self,
        conn: Connection<R, W>,
        dial: &str,
        shutdown: &CancellationToken,
    ) -> Result<Next<R, W>>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let mut conn = conn;

        let parsed =
            parse_dial_string(dial).and_then(|target| target.address.parse::<DeviceAddress>());
        let address = match parsed {
            Ok(address) => address,
            Err(ProtocolError::MalformedAddress(e)) => {
                debug!(dial, "dial string without usable address: {}", e);
                conn.writer
                    .send(&Response::Error(ErrorCode::InvalidDevice))
                    .await?;
                return Ok(Next::Continue(conn));
            }
            Err(e) => {
                debug!(dial, error = %e, "rejecting dial string");
                conn.writer
                    .send(&Response::Error(ErrorCode::InvalidArgument))
                    .await?;
                return Ok(Next::Continue(conn));
            }
        };

        let name = self
            .lookup_name(&address)
            .await
            .unwrap_or_else(|| format!("*{}", address.compact()));
        info!(%address, name = %name, "starting file-transfer link");

        let previous = self.indicator.current();
        self.indicator.set(LedState::Solid);

        let link = match self.adapter.find_obex_channel(&address).await {
            Ok(channel) => self.adapter.connect(&address, channel).await,
            Err(e) => Err(e),
        };
        let transport = match link {
            Ok(transport) => transport,
            Err(e) => {
                let response = match e {
                    AdapterError::InvalidDevice(_) => Response::Error(ErrorCode::InvalidDevice),
                    _ => Response::BtDown,
                };
                warn!(%address, "Failed to open link: {}", e);
                self.indicator.set(previous);
                conn.writer.send(&response).await?;
                return Ok(Next::Continue(conn));
            }
        };

        conn.writer.send(&Response::BtUp(dial.to_string())).await?;
        if let Some(hook) = &self.config.start_hook {
            run_hook(hook).await;
        }

        let session = FtpSession::new(
            conn,
            transport,
            self.indicator.clone(),
            previous,
            self.config.session.clone(),
        )
        .with_shutdown(shutdown.clone());
        let result = session.run().await;

        if let Some(hook) = &self.config.end_hook {
            run_hook(hook).await;
        }
        match self.devices.touch(&address) {
            Ok(true) => self.persist(),
            Ok(false) => {}
            Err(e) => warn!("Failed to update device record: {}", e),
        }
        self.indicator.set(previous);

        let (mut conn, outcome) = match result {
            Ok(ended) => ended,
            Err(e) if e.is_fatal() => {
                info!(error = %e, "channel lost during session");
                return Ok(Next::Closed);
            }
            Err(e) => return Err(e),
        };

        match outcome {
            SessionOutcome::Quit => {
                conn.writer.send(&Response::BtDown).await?;
                Ok(Next::Continue(conn))
            }
            SessionOutcome::TimedOut => Ok(Next::Continue(conn)),
            SessionOutcome::ChannelClosed => Ok(Next::Closed),
            SessionOutcome::Shutdown => Ok(Next::Shutdown),
        }
    }

    fn persist(&self) {
        if let Err(e) = self.devices.save() {
            warn!("Failed to save device store: {:#}", e);
        }
    }

    /// Best-effort friendly name: inquiry cache first, then the remote device.
    async fn lookup_name(&self, address: &DeviceAddress) -> Option<String> {
        match self.devices.cached_name(address) {
            Ok(Some(name)) => return Some(name),
            Ok(None) => {}
            Err(e) => debug!("Failed to read name cache: {}", e),
        }

        let name = self.adapter.remote_name(address).await?;
        if let Err(e) = self.devices.cache_name(*address, name.as_str()) {
            debug!("Failed to cache device name: {}", e);
        }
        Some(name)
    }
}
