//! Validation and parsing of command arguments.

use crate::codec::{address_remove_separator, ADDRESS_COMPACT_LEN};
use crate::error::{ProtocolError, Result};

/// Longest friendly name the adapter accepts.
pub const MAX_NAME_LENGTH: usize = 247;

/// Longest PIN the pairing agent accepts.
pub const MAX_PIN_LENGTH: usize = 8;

/// Longest register assignment, `nnn=nnn`.
pub const MAX_REGISTER_LENGTH: usize = 7;

/// Service qualifier selecting OBEX file transfer in a dial string.
pub const FILE_TRANSFER_QUALIFIER: &str = "1106";

/// Check a register assignment of the form `<1-3 digits>=<1-3 digits>`.
pub fn validate_register(assignment: &str) -> Result<()> {
    let invalid = || ProtocolError::MalformedArgument(format!("invalid register: {:?}", assignment));

    if assignment.len() > MAX_REGISTER_LENGTH {
        return Err(invalid());
    }
    let (left, right) = assignment.split_once('=').ok_or_else(invalid)?;
    let digits = |s: &str| (1..=3).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit());

    if digits(left) && digits(right) {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Check the length of a friendly name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(ProtocolError::MalformedArgument(format!(
            "name is {} bytes, limit is {}",
            name.len(),
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

/// Check the length of a PIN.
pub fn validate_pin(pin: &str) -> Result<()> {
    if pin.len() > MAX_PIN_LENGTH {
        return Err(ProtocolError::MalformedArgument(format!(
            "PIN is {} bytes, limit is {}",
            pin.len(),
            MAX_PIN_LENGTH
        )));
    }
    Ok(())
}

/// Parsed start-session dial string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    /// Device address, 12 digits.
    pub address: String,
    /// Service qualifier after the comma, if one was given.
    pub qualifier: Option<String>,
}

/// Parse `<...address>[,<qualifier>]`.
///
/// The address is the last 12 characters before the comma, so dial prefixes
/// are tolerated. A qualifier must select file transfer.
pub fn parse_dial_string(dial: &str) -> Result<DialTarget> {
    let (head, qualifier) = match dial.split_once(',') {
        Some((head, qualifier)) => {
            if !qualifier.starts_with(FILE_TRANSFER_QUALIFIER) {
                return Err(ProtocolError::MalformedArgument(format!(
                    "unsupported service qualifier: {:?}",
                    qualifier
                )));
            }
            (head, Some(qualifier.to_string()))
        }
        None => (dial, None),
    };

    let head = head.trim();
    if head.is_empty() {
        return Err(ProtocolError::MalformedAddress(
            "no device address given".to_string(),
        ));
    }

    let start = head
        .char_indices()
        .rev()
        .nth(ADDRESS_COMPACT_LEN - 1)
        .map_or(0, |(i, _)| i);

    Ok(DialTarget {
        address: head[start..].to_string(),
        qualifier,
    })
}

/// Address part of a pairing argument `<addr>[,<uuid>]`, in compact form.
pub fn parse_pair_target(arg: &str) -> Result<String> {
    let address = arg.split(',').next().unwrap_or("").trim();
    address_remove_separator(address)
}
