//! Responses the gateway sends to the controller.
//!
//! Every response is a single framed line (see [`crate::codec`]):
//!
//! | Response | Wire text |
//! |---|---|
//! | [`Response::Ok`] | `OK` |
//! | [`Response::Error`] | `ERROR 02` |
//! | [`Response::BtUp`] | `BTUP 001122334455` |
//! | [`Response::BtDown`] | `BTDOWN` |
//! | [`Response::Pair`] | `PAIR 0 001122334455 00` |
//! | [`Response::Data`] | raw text |
//! | [`Response::Ftp`] | `200 FTP` |
//! | [`Response::Ready`] / [`Response::Received`] | `?` / `!` |

use std::fmt;

use crate::codec::encode_response;

/// Numeric code carried by an `ERROR` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The command was not recognized.
    UnknownCommand,
    /// The device address is invalid or the device is unknown.
    InvalidDevice,
    /// The argument is malformed.
    InvalidArgument,
    /// The argument exceeds its length limit.
    ArgumentTooLong,
    /// The PIN could not be stored.
    PinRejected,
    /// The local adapter did not carry out the request.
    AdapterFailure,
}

impl ErrorCode {
    /// Numeric value as sent on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::UnknownCommand => 0,
            Self::InvalidDevice => 1,
            Self::InvalidArgument => 2,
            Self::ArgumentTooLong => 3,
            Self::PinRejected => 4,
            Self::AdapterFailure => 5,
        }
    }
}

/// FTP-style status code used inside a file-transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCode {
    /// 200
    Success,
    /// 401
    Unauthorized,
    /// 404
    NotFound,
    /// 406
    Unacceptable,
    /// 500
    InternalError,
}

impl ServiceCode {
    /// Numeric value as sent on the wire.
    pub fn code(self) -> u16 {
        match self {
            Self::Success => 200,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::Unacceptable => 406,
            Self::InternalError => 500,
        }
    }
}

/// Highest pairing result code reported to the controller.
pub const MAX_PAIR_CODE: u8 = 2;

/// A response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Command accepted.
    Ok,
    /// Command failed.
    Error(ErrorCode),
    /// Transport to the device is up; carries the dial string as received.
    BtUp(String),
    /// Transport is down or the session has ended.
    BtDown,
    /// Pairing finished with `code`; `target` is the argument as received.
    Pair {
        /// Pairing result, 0 on success.
        code: u8,
        /// The pairing argument echoed back.
        target: String,
    },
    /// A raw data line (inquiry result, listing line, name).
    Data(String),
    /// FTP status line.
    Ftp(ServiceCode),
    /// Ready for the next chunk of raw data.
    Ready,
    /// Raw data received.
    Received,
}

impl Response {
    /// Build a pairing response, capping the result code.
    pub fn pair(code: u8, target: impl Into<String>) -> Self {
        Self::Pair {
            code: code.min(MAX_PAIR_CODE),
            target: target.into(),
        }
    }

    /// Framed bytes ready to write.
    pub fn encode(&self) -> Vec<u8> {
        encode_response(&self.to_string())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Error(code) => write!(f, "ERROR {:02}", code.code()),
            Self::BtUp(arg) => write!(f, "BTUP {}", arg),
            Self::BtDown => f.write_str("BTDOWN"),
            Self::Pair { code, target } => {
                write!(f, "PAIR {} {}", code, target)?;
                if *code == 0 {
                    f.write_str(" 00")?;
                }
                Ok(())
            }
            Self::Data(line) => f.write_str(line),
            Self::Ftp(code) => write!(f, "{} FTP", code.code()),
            Self::Ready => f.write_str("?"),
            Self::Received => f.write_str("!"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_responses() {
        assert_eq!(Response::Ok.to_string(), "OK");
        assert_eq!(Response::BtDown.to_string(), "BTDOWN");
        assert_eq!(Response::Ready.to_string(), "?");
        assert_eq!(Response::Received.to_string(), "!");
    }

    #[test]
    fn test_error_codes_are_two_digits() {
        assert_eq!(
            Response::Error(ErrorCode::UnknownCommand).to_string(),
            "ERROR 00"
        );
        assert_eq!(
            Response::Error(ErrorCode::InvalidArgument).to_string(),
            "ERROR 02"
        );
        assert_eq!(
            Response::Error(ErrorCode::AdapterFailure).to_string(),
            "ERROR 05"
        );
    }

    #[test]
    fn test_bt_up_echoes_argument() {
        assert_eq!(
            Response::BtUp("001122334455,1106".into()).to_string(),
            "BTUP 001122334455,1106"
        );
    }

    #[test]
    fn test_pair_success_appends_suffix() {
        assert_eq!(
            Response::pair(0, "001122334455").to_string(),
            "PAIR 0 001122334455 00"
        );
    }

    #[test]
    fn test_pair_code_is_capped() {
        assert_eq!(
            Response::pair(7, "001122334455").to_string(),
            "PAIR 2 001122334455"
        );
        assert_eq!(
            Response::pair(1, "001122334455").to_string(),
            "PAIR 1 001122334455"
        );
    }

    #[test]
    fn test_ftp_codes() {
        let cases = [
            (ServiceCode::Success, "200 FTP"),
            (ServiceCode::Unauthorized, "401 FTP"),
            (ServiceCode::NotFound, "404 FTP"),
            (ServiceCode::Unacceptable, "406 FTP"),
            (ServiceCode::InternalError, "500 FTP"),
        ];
        for (code, text) in cases {
            assert_eq!(Response::Ftp(code).to_string(), text);
        }
    }

    #[test]
    fn test_encode_frames_response() {
        assert_eq!(Response::Ok.encode(), b"\r\nOK\r\n".to_vec());
        assert_eq!(
            Response::Data("4096".into()).encode(),
            b"\r\n4096\r\n".to_vec()
        );
    }
}
