//! # ObexGate Protocol Library
//!
//! This crate defines the line-oriented command channel spoken between a
//! controller and the ObexGate daemon.
//!
//! ## Overview
//!
//! - **Codec**: CR/LF line framing, case normalization, quote stripping and
//!   device address conversion
//! - **Commands**: the general `AT` grammar and the in-session FTP grammar
//! - **Responses**: `OK`, `ERROR nn`, `BTUP`, `BTDOWN`, `PAIR`, data lines
//!   and `nnn FTP` status lines
//! - **Arguments**: register, name, PIN and dial-string validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Dispatcher / FTP session (daemon)     │
//! ├─────────────────────────────────────────┤
//! │     Command classification + args       │
//! ├─────────────────────────────────────────┤
//! │          Line codec (CR/LF)             │
//! ├─────────────────────────────────────────┤
//! │            TCP stream                   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use bytes::BytesMut;
//! use protocol::{classify_general, GeneralCommand, LineCodec, Response};
//!
//! let codec = LineCodec::new();
//! let mut buf = BytesMut::from(&b"AT+BTF=\"Workshop\"\r"[..]);
//!
//! let line = codec.decode(&mut buf).unwrap().unwrap();
//! let command = classify_general(&line);
//! assert_eq!(command, GeneralCommand::SetName("\"Workshop\"".to_string()));
//!
//! assert_eq!(Response::Ok.encode(), b"\r\nOK\r\n");
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: Framing, quoting and addresses
//! - [`command`]: Command grammars
//! - [`response`]: Response vocabulary
//! - [`args`]: Argument validation
//! - [`error`]: Error types

pub mod args;
pub mod codec;
pub mod command;
pub mod error;
pub mod response;

pub use args::{
    parse_dial_string, parse_pair_target, validate_name, validate_pin, validate_register,
    DialTarget, FILE_TRANSFER_QUALIFIER, MAX_NAME_LENGTH, MAX_PIN_LENGTH,
};
pub use codec::{
    address_add_separator, address_remove_separator, decode_line, encode_response, strip_quotes,
    DeviceAddress, Line, LineCodec, Terminator, MAX_LINE_LENGTH,
};
pub use command::{
    classify_ftp, classify_ftp_with_cause, classify_general, FtpCommand, GeneralCommand,
};
pub use error::{ProtocolError, Result};
pub use response::{ErrorCode, Response, ServiceCode};
