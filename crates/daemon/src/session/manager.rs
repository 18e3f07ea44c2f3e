//! File-transfer session over the command channel.
//!
//! An [`FtpSession`] owns the connection and the OBEX transport from the
//! moment the link is up until the controller quits, the channel closes or
//! the inactivity watchdog ends it. Commands are handled one at a time:
//!
//! ```text
//! command ──► classify ──► pause watchdog ──► transport op ──► resume ──► reply
//! ```
//!
//! While a listing runs, an [`AbortListener`] holds the reader and watches
//! for `ABORT`.

use std::sync::Arc;
use std::time::Duration;

use protocol::command::ROOT_FOLDER;
use protocol::{
    classify_ftp_with_cause, FtpCommand, Line, ProtocolError, Response, Result, ServiceCode,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::abort::AbortListener;
use super::watchdog::Watchdog;
use crate::bluetooth::{ObexTransport, OpError};
use crate::connection::{Connection, FrameReader, ResponseWriter};
use crate::indicator::{Indicator, LedState};

/// Chunk size reported when the transport does not know its MTU.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Tunables for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Time without a command before the transport is released.
    pub inactive_timeout: Duration,
    /// Quiet period that ends the discard after a failed upload.
    pub drain_quiet: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            inactive_timeout: Duration::from_secs(120),
            drain_quiet: Duration::from_millis(200),
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, start not yet acknowledged.
    Idle,
    /// Accepting commands.
    Active,
    /// Transport released; waiting to report the end.
    Closing,
    /// Finished.
    Terminated,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The controller sent `QUIT`.
    Quit,
    /// The watchdog fired; `BTDOWN` has already been sent.
    TimedOut,
    /// The controller closed the channel.
    ChannelClosed,
    /// The daemon is stopping.
    Shutdown,
}

enum Flow {
    Continue,
    End(SessionOutcome),
}

enum Step {
    Reply(ServiceCode),
    Closed,
    Shutdown,
}

enum UploadStatus {
    Stored(u64),
    Failed(OpError),
    Interrupted,
}

/// One file-transfer session.
pub struct FtpSession<T, R, W> {
    id: Uuid,
    state: SessionState,
    transport: Option<T>,
    reader: Option<FrameReader<R>>,
    writer: ResponseWriter<W>,
    indicator: Arc<dyn Indicator>,
    restore_led: LedState,
    settings: SessionSettings,
    max_chunk: usize,
    shutdown: CancellationToken,
}

impl<T, R, W> FtpSession<T, R, W>
where
    T: ObexTransport,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    /// Prepare a session on an open transport.
    ///
    /// `restore_led` is the indicator state put back if the watchdog ends
    /// the session.
    pub fn new(
        conn: Connection<R, W>,
        transport: T,
        indicator: Arc<dyn Indicator>,
        restore_led: LedState,
        settings: SessionSettings,
    ) -> Self {
        let (reader, writer) = conn.into_parts();
        let max_chunk = match transport.mtu() {
            mtu if mtu > 0 => mtu as usize,
            _ => DEFAULT_CHUNK_SIZE,
        };

        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            transport: Some(transport),
            reader: Some(reader),
            writer,
            indicator,
            restore_led,
            settings,
            max_chunk,
            shutdown: CancellationToken::new(),
        }
    }

    /// End the session when `shutdown` is cancelled.
    ///
    /// A running listing is cancelled and its abort listener joined; a
    /// running upload is abandoned.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Session identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Largest upload chunk accepted, as reported by `MAX`.
    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    /// Run the session to completion and hand the connection back.
    ///
    /// The transport is released before this returns, whatever the outcome.
    /// An error means the connection is no longer usable.
    pub async fn run(mut self) -> Result<(Connection<R, W>, SessionOutcome)> {
        let span = tracing::info_span!("ftp_session", session_id = %self.id);

        async move {
            let outcome = self.serve().await;
            self.release_transport().await;
            self.state = SessionState::Terminated;

            let outcome = outcome?;
            tracing::info!(outcome = ?outcome, "session ended");

            let reader = self.reader.take().ok_or_else(reader_lost)?;
            Ok((Connection::from_parts(reader, self.writer), outcome))
        }
        .instrument(span)
        .await
    }

    async fn serve(&mut self) -> Result<SessionOutcome> {
        self.reply(ServiceCode::Success).await?;
        self.state = SessionState::Active;
        tracing::info!(max_chunk = self.max_chunk, "session active");

        let mut watchdog = Watchdog::start(self.settings.inactive_timeout);
        let outcome = self.command_loop(&mut watchdog).await;
        watchdog.stop().await;
        outcome
    }

    async fn command_loop(&mut self, watchdog: &mut Watchdog) -> Result<SessionOutcome> {
        let shutdown = self.shutdown.clone();

        loop {
            let armed = self.state == SessionState::Active;
            let reader = self.reader.as_mut().ok_or_else(reader_lost)?;

            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("daemon stopping, ending session");
                    return Ok(SessionOutcome::Shutdown);
                }
                line = reader.next_line() => Some(line),
                _ = watchdog.expired(), if armed => None,
            };

            let line = match event {
                None => {
                    self.expire().await;
                    continue;
                }
                Some(Ok(Some(line))) => line,
                Some(Ok(None)) => {
                    tracing::info!("controller closed the channel");
                    return Ok(SessionOutcome::ChannelClosed);
                }
                Some(Err(e)) if e.is_fatal() => {
                    tracing::warn!(error = %e, "channel failed");
                    return Ok(SessionOutcome::ChannelClosed);
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "discarding unreadable line");
                    self.reply(ServiceCode::Unacceptable).await?;
                    continue;
                }
            };

            if self.state == SessionState::Closing {
                tracing::debug!(line = %line, "session already timed out");
                self.writer.send(&Response::BtDown).await?;
                return Ok(SessionOutcome::TimedOut);
            }

            if let Flow::End(outcome) = self.execute(&line, watchdog).await? {
                return Ok(outcome);
            }
        }
    }

    async fn execute(&mut self, line: &Line, watchdog: &mut Watchdog) -> Result<Flow> {
        let (command, cause) = classify_ftp_with_cause(line);
        tracing::debug!(command = command.name(), "ftp command");

        match command {
            FtpCommand::Quit => {
                watchdog.stop().await;
                self.state = SessionState::Closing;
                self.release_transport().await;
                self.reply(ServiceCode::Success).await?;
                return Ok(Flow::End(SessionOutcome::Quit));
            }
            FtpCommand::Abort => {
                self.reply(ServiceCode::Success).await?;
                return Ok(Flow::Continue);
            }
            FtpCommand::GetMaxSize => {
                self.writer
                    .send(&Response::Data(self.max_chunk.to_string()))
                    .await?;
                self.reply(ServiceCode::Success).await?;
                return Ok(Flow::Continue);
            }
            FtpCommand::Unknown => {
                if let Some(cause) = cause {
                    tracing::debug!(line = %line, error = %cause, "rejecting command");
                }
                self.reply(ServiceCode::Unacceptable).await?;
                return Ok(Flow::Continue);
            }
            FtpCommand::Put(_) => {
                self.writer.send(&Response::Received).await?;
            }
            FtpCommand::ChangeDir(_) | FtpCommand::MakeDir(_) | FtpCommand::ListDir => {}
        }

        if !watchdog.pause().await {
            self.expire().await;
            self.writer.send(&Response::BtDown).await?;
            return Ok(Flow::End(SessionOutcome::TimedOut));
        }

        let step = match self.run_operation(command).await {
            Ok(step) => step,
            Err(e) if e.is_fatal() => {
                tracing::info!(error = %e, "channel lost during operation");
                Step::Closed
            }
            Err(e) => return Err(e),
        };
        watchdog.resume().await;

        match step {
            Step::Reply(code) => {
                self.reply(code).await?;
                Ok(Flow::Continue)
            }
            Step::Closed => Ok(Flow::End(SessionOutcome::ChannelClosed)),
            Step::Shutdown => Ok(Flow::End(SessionOutcome::Shutdown)),
        }
    }

    async fn run_operation(&mut self, command: FtpCommand) -> Result<Step> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(Step::Reply(ServiceCode::InternalError));
        };

        match command {
            FtpCommand::ChangeDir(path) => Ok(Step::Reply(match transport.change_dir(&path).await {
                Ok(()) => ServiceCode::Success,
                Err(e) => {
                    tracing::debug!(path = %path, error = %e, "change dir failed");
                    ServiceCode::NotFound
                }
            })),
            FtpCommand::MakeDir(path) => Ok(Step::Reply(match transport.make_dir(&path).await {
                Ok(()) => ServiceCode::Success,
                Err(OpError::Refused) => ServiceCode::Unauthorized,
                Err(e) => {
                    tracing::debug!(path = %path, error = %e, "make dir failed");
                    ServiceCode::InternalError
                }
            })),
            FtpCommand::Put(name) => self.receive_upload(&name).await,
            FtpCommand::ListDir => self.list_folder().await,
            _ => Ok(Step::Reply(ServiceCode::Unacceptable)),
        }
    }

    async fn receive_upload(&mut self, name: &str) -> Result<Step> {
        let (Some(transport), Some(reader)) = (self.transport.as_mut(), self.reader.as_mut())
        else {
            return Ok(Step::Reply(ServiceCode::InternalError));
        };

        let shutdown = self.shutdown.clone();
        let status = match transport.begin_put(name).await {
            Ok(()) => tokio::select! {
                biased;
                _ = shutdown.cancelled() => Ok(UploadStatus::Interrupted),
                status = pump_upload(transport, reader, &mut self.writer, self.max_chunk) => status,
            },
            Err(e) => Ok(UploadStatus::Failed(e)),
        };
        let status = match status {
            Err(e) if !e.is_fatal() => Ok(UploadStatus::Failed(OpError::Failed(e.to_string()))),
            other => other,
        };
        if !matches!(status, Ok(UploadStatus::Stored(_))) {
            transport.cancel_put().await;
        }

        match status? {
            UploadStatus::Stored(bytes) => {
                tracing::info!(name, bytes, "upload stored");
                Ok(Step::Reply(ServiceCode::Success))
            }
            UploadStatus::Failed(e) => {
                tracing::warn!(name, error = %e, "upload failed");
                let discarded = reader.drain(self.settings.drain_quiet).await;
                tracing::debug!(discarded, "discarded pending upload data");
                Ok(Step::Reply(match e {
                    OpError::Refused => ServiceCode::Unauthorized,
                    _ => ServiceCode::InternalError,
                }))
            }
            UploadStatus::Interrupted => {
                tracing::info!(name, "upload abandoned for shutdown");
                Ok(Step::Shutdown)
            }
        }
    }

    async fn list_folder(&mut self) -> Result<Step> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(Step::Reply(ServiceCode::InternalError));
        };
        let reader = self.reader.take().ok_or_else(reader_lost)?;

        let cancel = self.shutdown.child_token();
        let listener = AbortListener::spawn(reader, cancel.clone());
        let listing = transport.list_dir(&cancel).await;
        let (reader, report) = listener.join().await?;
        self.reader = Some(reader);

        if self.shutdown.is_cancelled() {
            return Ok(Step::Shutdown);
        }
        if report.closed {
            return Ok(Step::Closed);
        }
        if report.aborted {
            tracing::info!("listing aborted");
            if let Err(e) = transport.change_dir(ROOT_FOLDER).await {
                tracing::debug!(error = %e, "Failed to reset folder after abort");
            }
            return Ok(Step::Reply(ServiceCode::Success));
        }

        match listing {
            Ok(listing) => {
                for entry in listing.lines().filter(|entry| !entry.trim().is_empty()) {
                    self.writer.send(&Response::Data(entry.to_string())).await?;
                }
                Ok(Step::Reply(ServiceCode::Success))
            }
            Err(OpError::Cancelled) => Ok(Step::Reply(ServiceCode::Success)),
            Err(e) => {
                tracing::warn!(error = %e, "listing failed");
                Ok(Step::Reply(ServiceCode::Unacceptable))
            }
        }
    }

    async fn expire(&mut self) {
        tracing::warn!(
            timeout_secs = self.settings.inactive_timeout.as_secs(),
            "no command within the inactivity timeout, releasing transport"
        );
        self.state = SessionState::Closing;
        self.release_transport().await;
        self.indicator.set(self.restore_led);
    }

    async fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.release().await;
        }
    }

    async fn reply(&mut self, code: ServiceCode) -> Result<()> {
        self.writer.send(&Response::Ftp(code)).await
    }
}

/// Move one upload from the channel to the transport.
///
/// Each chunk is announced by a decimal length line, answered with `?`,
/// followed by exactly that many raw bytes, answered with `!`. A zero length
/// ends the file.
async fn pump_upload<T, R, W>(
    transport: &mut T,
    reader: &mut FrameReader<R>,
    writer: &mut ResponseWriter<W>,
    max_chunk: usize,
) -> Result<UploadStatus>
where
    T: ObexTransport,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;

    loop {
        let line = match reader.next_line().await? {
            Some(line) => line,
            None => {
                return Err(ProtocolError::ChannelClosed(
                    "channel closed during upload".to_string(),
                ))
            }
        };

        let len = match line.original().trim().parse::<usize>() {
            Ok(len) if len <= max_chunk => len,
            _ => {
                return Ok(UploadStatus::Failed(OpError::Failed(format!(
                    "bad chunk length {:?}",
                    line.original()
                ))))
            }
        };

        if len == 0 {
            return Ok(match transport.finish_put().await {
                Ok(()) => UploadStatus::Stored(total),
                Err(e) => UploadStatus::Failed(e),
            });
        }

        writer.send(&Response::Ready).await?;
        let data = reader.read_exact_raw(len).await?;
        if let Err(e) = transport.write_chunk(&data).await {
            return Ok(UploadStatus::Failed(e));
        }
        total += len as u64;
        writer.send(&Response::Received).await?;
    }
}

fn reader_lost() -> ProtocolError {
    ProtocolError::ChannelClosed("command reader unavailable".to_string())
}
