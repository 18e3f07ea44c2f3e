//! Bluetooth adapter and OBEX transport seams.
//!
//! The dispatcher and the file-transfer session talk to the radio only through
//! these traits:
//!
//! - [`BluetoothAdapter`]: local adapter operations (name, inquiry, pairing,
//!   bonds, service discovery) and opening a transport to a remote device
//! - [`ObexTransport`]: folder-browsing operations on an open transport
//!
//! [`loopback`] implements both on the local filesystem.

pub mod loopback;

use protocol::DeviceAddress;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use loopback::{LoopbackAdapter, LoopbackTransport};

/// Errors from adapter-level operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The address does not name a usable device.
    #[error("invalid device: {0}")]
    InvalidDevice(String),

    /// The device did not answer or offers no file-transfer service.
    #[error("no carrier: {0}")]
    NoCarrier(String),

    /// The transport could not be opened.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The local adapter rejected the request.
    #[error("adapter failure: {0}")]
    Failed(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single transport operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OpError {
    /// The remote refused the request.
    #[error("refused by remote")]
    Refused,

    /// The request could not be carried out.
    #[error("operation failed: {0}")]
    Failed(String),

    /// The request was cancelled locally.
    #[error("operation cancelled")]
    Cancelled,
}

/// One device found by an inquiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryResult {
    /// Device address.
    pub address: DeviceAddress,
    /// Class of device, 24 bits.
    pub class: u32,
    /// Friendly name, if the device reported one.
    pub name: Option<String>,
}

impl InquiryResult {
    /// Text of the data line reported to the controller.
    ///
    /// `ADDR,CCCCCC,"name"`, or `"*ADDR"` when the name is unknown.
    pub fn to_line(&self) -> String {
        match &self.name {
            Some(name) => format!(
                "{},{:06X},\"{}\"",
                self.address.compact(),
                self.class & 0x00ff_ffff,
                name
            ),
            None => format!("\"*{}\"", self.address.compact()),
        }
    }
}

/// Result of a pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// Pairing could not be started.
    NotStarted,
    /// Pairing ran and finished with a result code, 0 on success.
    Completed(u8),
}

/// Local Bluetooth adapter.
#[allow(async_fn_in_trait)]
pub trait BluetoothAdapter {
    /// Transport type returned by [`BluetoothAdapter::connect`].
    type Transport: ObexTransport;

    /// Set the adapter's friendly name.
    async fn set_local_name(&self, name: &str) -> Result<(), AdapterError>;

    /// Run an inquiry and return the devices found.
    async fn inquire(&self) -> Result<Vec<InquiryResult>, AdapterError>;

    /// Ask a remote device for its friendly name.
    async fn remote_name(&self, address: &DeviceAddress) -> Option<String>;

    /// Pair with a remote device.
    async fn pair(&self, address: &DeviceAddress) -> PairOutcome;

    /// Remove the bond with a device. Returns whether a bond existed.
    async fn remove_bond(&self, address: &DeviceAddress) -> Result<bool, AdapterError>;

    /// Find the RFCOMM channel of the device's file-transfer service.
    ///
    /// The FTP profile is preferred; object push is the fallback.
    async fn find_obex_channel(&self, address: &DeviceAddress) -> Result<u8, AdapterError>;

    /// Open a transport to the device on `channel`.
    async fn connect(
        &self,
        address: &DeviceAddress,
        channel: u8,
    ) -> Result<Self::Transport, AdapterError>;
}

/// An open OBEX folder-browsing transport.
///
/// Paths use `/` between components; [`protocol::command::ROOT_FOLDER`]
/// names the root.
#[allow(async_fn_in_trait)]
pub trait ObexTransport {
    /// Change the current folder.
    async fn change_dir(&mut self, path: &str) -> Result<(), OpError>;

    /// Create a folder and enter it.
    async fn make_dir(&mut self, path: &str) -> Result<(), OpError>;

    /// Start an upload named `name` in the current folder.
    async fn begin_put(&mut self, name: &str) -> Result<(), OpError>;

    /// Append a chunk to the current upload.
    async fn write_chunk(&mut self, data: &[u8]) -> Result<(), OpError>;

    /// Complete the current upload.
    async fn finish_put(&mut self) -> Result<(), OpError>;

    /// Abandon the current upload, if any.
    async fn cancel_put(&mut self);

    /// Fetch the listing of the current folder.
    ///
    /// Returns [`OpError::Cancelled`] once `cancel` fires.
    async fn list_dir(&mut self, cancel: &CancellationToken) -> Result<String, OpError>;

    /// Largest chunk the remote accepts. Non-positive when unknown.
    fn mtu(&self) -> i32;

    /// Close the transport. Calling it again has no effect.
    async fn release(&mut self);
}
