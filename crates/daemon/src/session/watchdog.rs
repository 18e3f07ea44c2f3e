//! Inactivity watchdog for file-transfer sessions.
//!
//! The watchdog counts down while the session waits for a command. The
//! session pauses it around transport operations and resumes it afterwards;
//! every control message restarts the countdown. Pause and resume are
//! acknowledged, so once `pause()` returns the watchdog cannot fire until the
//! next `resume()`.
//!
//! The watchdog never touches the transport itself. It only reports expiry
//! and the session performs the release.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Why the watchdog task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogExit {
    /// The countdown ran out.
    Expired,
    /// The session stopped it.
    Stopped,
}

enum Control {
    Pause(oneshot::Sender<bool>),
    Resume(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
}

/// Handle to a running watchdog task.
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    control: mpsc::Sender<Control>,
    expiry: Option<oneshot::Receiver<()>>,
    handle: Option<JoinHandle<WatchdogExit>>,
    fired: bool,
}

impl Watchdog {
    /// Start counting down from `timeout`.
    pub fn start(timeout: Duration) -> Self {
        let (control, control_rx) = mpsc::channel(4);
        let (expired_tx, expired_rx) = oneshot::channel();
        let handle = tokio::spawn(countdown(timeout, control_rx, expired_tx));

        Self {
            timeout,
            control,
            expiry: Some(expired_rx),
            handle: Some(handle),
            fired: false,
        }
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Suspend the countdown.
    ///
    /// Returns `false` when the watchdog has already fired or been stopped.
    pub async fn pause(&self) -> bool {
        let (ack, acked) = oneshot::channel();
        if self.control.send(Control::Pause(ack)).await.is_err() {
            return false;
        }
        acked.await.unwrap_or(false)
    }

    /// Restart the countdown from the full timeout.
    ///
    /// Returns `false` when the watchdog is no longer running.
    pub async fn resume(&self) -> bool {
        let (ack, acked) = oneshot::channel();
        if self.control.send(Control::Resume(ack)).await.is_err() {
            return false;
        }
        acked.await.is_ok()
    }

    /// Resolves when the watchdog fires. Never resolves if it was stopped.
    ///
    /// Cancel safe.
    pub async fn expired(&mut self) {
        if let Some(expiry) = self.expiry.as_mut() {
            let fired = expiry.await.is_ok();
            self.expiry = None;
            if fired {
                self.fired = true;
                return;
            }
        }
        std::future::pending::<()>().await
    }

    /// Whether the watchdog has fired.
    pub fn has_fired(&mut self) -> bool {
        if let Some(expiry) = self.expiry.as_mut() {
            match expiry.try_recv() {
                Ok(()) => {
                    self.fired = true;
                    self.expiry = None;
                }
                Err(oneshot::error::TryRecvError::Closed) => self.expiry = None,
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
        }
        self.fired
    }

    /// Stop the watchdog and wait for its task to finish.
    ///
    /// Returns `None` if it was already stopped.
    pub async fn stop(&mut self) -> Option<WatchdogExit> {
        let handle = self.handle.take()?;

        let (ack, acked) = oneshot::channel();
        if self.control.send(Control::Stop(ack)).await.is_ok() {
            let _ = acked.await;
        }

        match handle.await {
            Ok(exit) => {
                if exit == WatchdogExit::Expired {
                    self.fired = true;
                }
                Some(exit)
            }
            Err(e) => {
                tracing::warn!("Watchdog task failed: {}", e);
                None
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn countdown(
    timeout: Duration,
    mut control: mpsc::Receiver<Control>,
    expired: oneshot::Sender<()>,
) -> WatchdogExit {
    let mut armed = true;

    loop {
        let message = if armed {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    tracing::debug!(timeout_ms = timeout.as_millis() as u64, "watchdog fired");
                    let _ = expired.send(());
                    return WatchdogExit::Expired;
                }
                message = control.recv() => message,
            }
        } else {
            control.recv().await
        };

        match message {
            Some(Control::Pause(ack)) => {
                armed = false;
                let _ = ack.send(true);
            }
            Some(Control::Resume(ack)) => {
                armed = true;
                let _ = ack.send(());
            }
            Some(Control::Stop(ack)) => {
                let _ = ack.send(());
                return WatchdogExit::Stopped;
            }
            None => return WatchdogExit::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(40);
    const LONG_WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fires_after_timeout() {
        let mut watchdog = Watchdog::start(SHORT);

        tokio::time::timeout(LONG_WAIT, watchdog.expired())
            .await
            .expect("watchdog should fire");

        assert!(watchdog.has_fired());
        assert!(!watchdog.pause().await);
        assert_eq!(watchdog.stop().await, Some(WatchdogExit::Expired));
    }

    #[tokio::test]
    async fn test_pause_holds_countdown() {
        let mut watchdog = Watchdog::start(SHORT);

        assert!(watchdog.pause().await);
        tokio::time::sleep(SHORT * 3).await;
        assert!(!watchdog.has_fired());

        assert!(watchdog.resume().await);
        tokio::time::timeout(LONG_WAIT, watchdog.expired())
            .await
            .expect("watchdog should fire after resume");
    }

    #[tokio::test]
    async fn test_resume_restarts_countdown() {
        let mut watchdog = Watchdog::start(Duration::from_millis(200));

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(watchdog.resume().await);
        }
        assert!(!watchdog.has_fired());
        assert_eq!(watchdog.stop().await, Some(WatchdogExit::Stopped));
    }

    #[tokio::test]
    async fn test_stop_before_expiry() {
        let mut watchdog = Watchdog::start(LONG_WAIT);

        assert_eq!(watchdog.stop().await, Some(WatchdogExit::Stopped));
        assert_eq!(watchdog.stop().await, None);
        assert!(!watchdog.pause().await);
        assert!(!watchdog.resume().await);
        assert!(!watchdog.has_fired());
    }

    #[tokio::test]
    async fn test_expired_pending_after_stop() {
        let mut watchdog = Watchdog::start(LONG_WAIT);
        watchdog.stop().await;

        let waited = tokio::time::timeout(SHORT, watchdog.expired()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_timeout_accessor() {
        let mut watchdog = Watchdog::start(SHORT);
        assert_eq!(watchdog.timeout(), SHORT);
        watchdog.stop().await;
    }
}
