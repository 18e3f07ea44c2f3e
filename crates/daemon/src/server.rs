//! TCP listener for the command channel.
//!
//! Controllers are served one at a time: the next connection is accepted only
//! after the current one has ended.

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use crate::bluetooth::BluetoothAdapter;
use crate::connection::Connection;
use crate::dispatcher::{ConnectionEnd, Dispatcher};

/// Listening socket of the gateway.
pub struct GatewayServer {
    listener: TcpListener,
}

impl GatewayServer {
    /// Bind to `addr`.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound. This is the only startup error
    /// that stops the daemon.
    pub async fn bind(addr: SocketAddr) -> Result<Self, io::Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.listener.local_addr()
    }

    /// Accept and serve connections until `shutdown` is cancelled.
    ///
    /// Cancelling also interrupts the connection being served.
    pub async fn serve<A: BluetoothAdapter>(
        &self,
        dispatcher: &Dispatcher<A>,
        shutdown: CancellationToken,
    ) {
        info!(addr = ?self.listener.local_addr().ok(), "accepting controllers");

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY: {}", e);
            }

            let span = tracing::info_span!("connection", %peer);
            let stopping = async {
                info!("controller connected");
                let conn = Connection::from_tcp(stream);
                match dispatcher.serve_until(conn, &shutdown).await {
                    Ok(ConnectionEnd::Shutdown) => {
                        info!("closing connection for shutdown");
                        true
                    }
                    Ok(end) => {
                        info!(?end, "controller disconnected");
                        false
                    }
                    Err(e) => {
                        warn!(error = %e, "connection ended with error");
                        false
                    }
                }
            }
            .instrument(span)
            .await;

            if stopping {
                break;
            }
        }

        info!("listener stopped");
    }
}
