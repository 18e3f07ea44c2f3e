//! Line codec for the controller command channel.
//!
//! # Frame Format
//!
//! The controller sends one command per text line, terminated by CR, LF or
//! CRLF. The gateway answers with lines wrapped on both sides:
//!
//! ```text
//! \r\n<payload>\r\n
//! ```
//!
//! A terminator that sits inside a double-quoted argument does not end the
//! frame as long as the closing quote has already been received, so names
//! and filenames are never cut short.
//!
//! # Case
//!
//! Keywords are case-insensitive, arguments are not. Every decoded [`Line`]
//! carries the original text and an ASCII upper-cased copy with identical
//! byte offsets, so an offset found on one indexes the other.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ProtocolError, Result};

/// Response line terminator.
pub const CRLF: &str = "\r\n";

/// Longest accepted command line, in bytes, excluding the terminator.
pub const MAX_LINE_LENGTH: usize = 512;

/// Digits in a compact device address (`AABBCCDDEEFF`).
pub const ADDRESS_COMPACT_LEN: usize = 12;

/// Characters in a colon-delimited device address (`AA:BB:CC:DD:EE:FF`).
pub const ADDRESS_COLON_LEN: usize = 17;

/// A decoded command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    original: String,
    normalized: String,
}

impl Line {
    /// Build a line from already-stripped text.
    pub fn new(text: impl Into<String>) -> Self {
        let original = text.into();
        let normalized = original.to_ascii_uppercase();
        Self {
            original,
            normalized,
        }
    }

    /// The text exactly as received.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The upper-cased copy used for keyword matching.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Returns true if the line carries no text.
    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Original-case text from `offset` to the end of the line.
    ///
    /// Returns an empty string when `offset` is past the end.
    pub fn argument_from(&self, offset: usize) -> &str {
        self.original.get(offset..).unwrap_or("")
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

#[inline]
fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// Decode one raw frame into a [`Line`].
///
/// Strips terminators at the very start and the very end of the frame and
/// leaves interior ones untouched. Invalid UTF-8 is replaced rather than
/// rejected so a noisy byte never stalls the command loop.
pub fn decode_line(raw: &[u8]) -> Line {
    let start = raw
        .iter()
        .position(|b| !is_terminator(*b))
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !is_terminator(*b))
        .map_or(start, |i| i + 1);

    Line::new(String::from_utf8_lossy(&raw[start..end]).into_owned())
}

/// Wrap a response payload for transmission.
pub fn encode_response(payload: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2 * CRLF.len());
    out.extend_from_slice(CRLF.as_bytes());
    out.extend_from_slice(payload.as_bytes());
    out.extend_from_slice(CRLF.as_bytes());
    out
}

/// Remove the surrounding double quotes from an argument.
///
/// Fails when the argument is shorter than two characters or does not both
/// start and end with `"`.
pub fn strip_quotes(arg: &str) -> Result<&str> {
    if arg.len() < 2 {
        return Err(ProtocolError::MalformedArgument(format!(
            "quoted argument too short: {:?}",
            arg
        )));
    }
    if !arg.starts_with('"') || !arg.ends_with('"') {
        return Err(ProtocolError::MalformedArgument(format!(
            "argument is not wrapped in double quotes: {:?}",
            arg
        )));
    }
    Ok(&arg[1..arg.len() - 1])
}

fn malformed_address(addr: &str) -> ProtocolError {
    ProtocolError::MalformedAddress(addr.to_string())
}

fn check_compact(addr: &str) -> Result<()> {
    hex::decode(addr)
        .map(|_| ())
        .map_err(|_| malformed_address(addr))
}

fn check_colon(addr: &str) -> Result<()> {
    let groups: Vec<&str> = addr.split(':').collect();
    if groups.len() != 6 || groups.iter().any(|g| g.len() != 2) {
        return Err(malformed_address(addr));
    }
    if groups.iter().all(|g| hex::decode(g).is_ok()) {
        Ok(())
    } else {
        Err(malformed_address(addr))
    }
}

/// Convert `AABBCCDDEEFF` to `AA:BB:CC:DD:EE:FF`.
///
/// Input already in colon form is validated and returned unchanged. Letter
/// case is preserved.
pub fn address_add_separator(addr: &str) -> Result<String> {
    match addr.len() {
        ADDRESS_COMPACT_LEN => {
            check_compact(addr)?;
            let groups: Vec<&str> = (0..6).map(|i| &addr[i * 2..i * 2 + 2]).collect();
            Ok(groups.join(":"))
        }
        ADDRESS_COLON_LEN => {
            check_colon(addr)?;
            Ok(addr.to_string())
        }
        _ => Err(malformed_address(addr)),
    }
}

/// Convert `AA:BB:CC:DD:EE:FF` to `AABBCCDDEEFF`.
///
/// Input already in compact form is validated and returned unchanged. Letter
/// case is preserved.
pub fn address_remove_separator(addr: &str) -> Result<String> {
    match addr.len() {
        ADDRESS_COLON_LEN => {
            check_colon(addr)?;
            Ok(addr.replace(':', ""))
        }
        ADDRESS_COMPACT_LEN => {
            check_compact(addr)?;
            Ok(addr.to_string())
        }
        _ => Err(malformed_address(addr)),
    }
}

/// A Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    /// Create an address from its six bytes, most significant first.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// The raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// The 12-digit upper-case form used on the command channel.
    pub fn compact(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl FromStr for DeviceAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let compact = address_remove_separator(s)?;
        let bytes = hex::decode(&compact).map_err(|_| malformed_address(s))?;
        let bytes: [u8; 6] = bytes.try_into().map_err(|_| malformed_address(s))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Terminator that ended a decoded line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// A bare CR with no LF buffered after it.
    Cr,
    /// A bare LF.
    Lf,
    /// A CR LF pair.
    CrLf,
}

/// Streaming decoder that splits a byte buffer into command lines.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Create a codec with the default line limit.
    pub fn new() -> Self {
        Self {
            max_length: MAX_LINE_LENGTH,
        }
    }

    /// Create a codec with a custom line limit.
    pub fn with_max_length(max_length: usize) -> Self {
        Self { max_length }
    }

    /// The longest line this codec accepts.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Try to take one line off the front of `buf`.
    ///
    /// Returns `Ok(None)` when no complete line is buffered yet; the partial
    /// bytes stay in `buf` for the next call. Empty lines are skipped. An
    /// oversized line is dropped from the buffer and reported as
    /// [`ProtocolError::FrameTooLarge`].
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Line>> {
        Ok(self.decode_terminated(buf)?.map(|(line, _)| line))
    }

    /// Like [`LineCodec::decode`], also reporting how the line ended.
    ///
    /// A line ended by [`Terminator::Cr`] may still have its LF in flight;
    /// callers switching to raw reads after it must discard that LF.
    pub fn decode_terminated(&self, buf: &mut BytesMut) -> Result<Option<(Line, Terminator)>> {
        loop {
            match find_boundary(buf) {
                Some(0) => {
                    buf.advance(1);
                }
                Some(end) => {
                    let mut consumed = end + 1;
                    let terminator = match (buf[end], buf.get(consumed).copied()) {
                        (b'\r', Some(b'\n')) => {
                            consumed += 1;
                            Terminator::CrLf
                        }
                        (b'\r', _) => Terminator::Cr,
                        _ => Terminator::Lf,
                    };
                    let frame = buf.split_to(consumed);
                    if end > self.max_length {
                        return Err(ProtocolError::FrameTooLarge {
                            size: end,
                            max: self.max_length,
                        });
                    }
                    return Ok(Some((decode_line(&frame), terminator)));
                }
                None => {
                    if buf.len() > self.max_length {
                        let size = buf.len();
                        buf.clear();
                        return Err(ProtocolError::FrameTooLarge {
                            size,
                            max: self.max_length,
                        });
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Append a framed response to `dst`.
    pub fn encode(&self, payload: &str, dst: &mut BytesMut) {
        dst.extend_from_slice(&encode_response(payload));
    }
}

/// Index of the terminator ending the first frame in `buf`.
///
/// A terminator inside an open quote is embedded in the argument when the
/// segment up to the next terminator closes the quote; otherwise it ends the
/// frame. Until that next terminator is buffered the decision waits, so the
/// result depends only on the bytes, not on how they were split across reads.
fn find_boundary(buf: &[u8]) -> Option<usize> {
    let mut in_quotes = false;
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            b'"' => in_quotes = !in_quotes,
            b'\r' | b'\n' if !in_quotes => return Some(i),
            b'\r' | b'\n' => {
                let mut start = i + 1;
                if buf[i] == b'\r' && buf.get(start) == Some(&b'\n') {
                    start += 1;
                }
                let rest = &buf[start..];
                let next = rest.iter().position(|&b| is_terminator(b))?;
                let quotes = rest[..next].iter().filter(|&&b| b == b'"').count();
                if quotes % 2 == 0 {
                    return Some(i);
                }
                i = start;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}
