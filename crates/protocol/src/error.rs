//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all failure modes of the command channel.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Argument errors
    /// An argument did not have the expected shape (quoting, digits, length).
    #[error("malformed argument: {0}")]
    MalformedArgument(String),

    /// A device address was neither 12 hex digits nor colon-delimited form.
    #[error("malformed device address: {0}")]
    MalformedAddress(String),

    // Frame errors
    /// Frame exceeds maximum allowed size.
    #[error("frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A line did not match any command in the active grammar.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    // Connection errors
    /// Read or write on the command channel failed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// Operation timed out.
    #[error("operation timed out: {0}")]
    Timeout(String),
}

impl ProtocolError {
    /// Returns true for errors that end the connection rather than a single command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::ChannelClosed(_))
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut => ProtocolError::Timeout(err.to_string()),
            _ => ProtocolError::ChannelClosed(err.to_string()),
        }
    }
}
