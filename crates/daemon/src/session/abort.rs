//! Listens for `ABORT` while a folder listing is in flight.
//!
//! The listener takes the session's [`FrameReader`] for the duration of the
//! listing, so the channel has exactly one reader at any time, and hands it
//! back when joined.

use std::time::Duration;

use protocol::{classify_ftp, FtpCommand, ProtocolError, Result};
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection::FrameReader;

/// How long each read waits before the stop flag is checked again.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the listener saw while it held the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerReport {
    /// An `ABORT` arrived and the listing was cancelled.
    pub aborted: bool,
    /// The channel closed.
    pub closed: bool,
    /// Lines that were not `ABORT` and were dropped.
    pub discarded: usize,
}

/// A running abort listener.
#[derive(Debug)]
pub struct AbortListener<R> {
    stop: CancellationToken,
    handle: JoinHandle<(FrameReader<R>, ListenerReport)>,
}

impl<R> AbortListener<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Start listening on `reader`; `listing` is cancelled when `ABORT` arrives.
    pub fn spawn(reader: FrameReader<R>, listing: CancellationToken) -> Self {
        let stop = CancellationToken::new();
        let handle = tokio::spawn(listen(reader, stop.clone(), listing));
        Self { stop, handle }
    }

    /// Stop listening and take the reader back.
    pub async fn join(self) -> Result<(FrameReader<R>, ListenerReport)> {
        self.stop.cancel();
        self.handle
            .await
            .map_err(|e| ProtocolError::ChannelClosed(format!("abort listener failed: {}", e)))
    }
}

async fn listen<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    stop: CancellationToken,
    listing: CancellationToken,
) -> (FrameReader<R>, ListenerReport) {
    let mut report = ListenerReport::default();

    loop {
        let polled = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            polled = tokio::time::timeout(POLL_INTERVAL, reader.next_line()) => polled,
        };

        match polled {
            Err(_) => continue,
            Ok(Ok(Some(line))) => {
                if classify_ftp(&line) == FtpCommand::Abort {
                    tracing::info!("abort requested during listing");
                    report.aborted = true;
                    listing.cancel();
                    break;
                }
                tracing::warn!(line = %line, "ignoring command during listing");
                report.discarded += 1;
            }
            Ok(Ok(None)) => {
                report.closed = true;
                listing.cancel();
                break;
            }
            Ok(Err(e)) if e.is_fatal() => {
                tracing::warn!(error = %e, "channel failed during listing");
                report.closed = true;
                listing.cancel();
                break;
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "ignoring unreadable line during listing");
                report.discarded += 1;
            }
        }
    }

    (reader, report)
}
