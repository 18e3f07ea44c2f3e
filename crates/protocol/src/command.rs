//! Command grammar for the controller channel.
//!
//! Two grammars share the channel. Outside a file-transfer session every
//! line is an `AT` command ([`GeneralCommand`]); inside one, lines are bare
//! FTP keywords ([`FtpCommand`]). Both classifiers match on the upper-cased
//! copy of the line and take arguments from the original-case copy.

use std::fmt;

use crate::codec::{strip_quotes, Line};
use crate::error::ProtocolError;

/// Prefix every general command starts with.
pub const AT_PREFIX: &str = "AT";

/// Argument of `CD` that selects the root folder without quoting.
pub const ROOT_FOLDER: &str = "\\";

// ============================================================================
// General grammar
// ============================================================================

/// A command outside a file-transfer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneralCommand {
    /// `ATE0`
    NoEcho,
    /// `ATH`
    HangUp,
    /// `ATS<n>=<n>`, argument is the raw assignment.
    SetRegister(String),
    /// `AT+BTD<addr>`
    RemoveDevice(String),
    /// `AT+BTD*`
    RemoveAllDevices,
    /// `AT+BTF=<name>`, argument still quoted.
    SetName(String),
    /// `AT+BTF?`
    GetName,
    /// `AT+BTIN`
    Inquire,
    /// `AT+BTK=<pin>`, argument still quoted.
    SetPin(String),
    /// `AT+BTT?`
    ListDevices,
    /// `AT+BTW<addr>[,<uuid>]`
    InitPair(String),
    /// `ATD<dial-string>`
    StartSession(String),
    /// Anything else.
    Unknown,
}

impl GeneralCommand {
    /// Stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoEcho => "no-echo",
            Self::HangUp => "hang-up",
            Self::SetRegister(_) => "set-register",
            Self::RemoveDevice(_) => "remove-device",
            Self::RemoveAllDevices => "remove-all-devices",
            Self::SetName(_) => "set-name",
            Self::GetName => "get-name",
            Self::Inquire => "inquire",
            Self::SetPin(_) => "set-pin",
            Self::ListDevices => "list-devices",
            Self::InitPair(_) => "init-pair",
            Self::StartSession(_) => "start-session",
            Self::Unknown => "unknown",
        }
    }

    /// The argument carried by the command, if any.
    pub fn argument(&self) -> Option<&str> {
        match self {
            Self::SetRegister(arg)
            | Self::RemoveDevice(arg)
            | Self::SetName(arg)
            | Self::SetPin(arg)
            | Self::InitPair(arg)
            | Self::StartSession(arg) => Some(arg),
            _ => None,
        }
    }
}

impl fmt::Display for GeneralCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy)]
enum Match {
    Exact,
    Prefix,
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    NoEcho,
    HangUp,
    SetRegister,
    RemoveAllDevices,
    RemoveDevice,
    SetName,
    GetName,
    Inquire,
    SetPin,
    ListDevices,
    InitPair,
    StartSession,
}

/// Keyword table, checked in order. The argument starts right after the
/// keyword, so the wildcard removal must precede the single removal.
const GENERAL_KEYWORDS: &[(&str, Match, Kind)] = &[
    ("E0", Match::Exact, Kind::NoEcho),
    ("H", Match::Exact, Kind::HangUp),
    ("S", Match::Prefix, Kind::SetRegister),
    ("+BTD*", Match::Exact, Kind::RemoveAllDevices),
    ("+BTD", Match::Prefix, Kind::RemoveDevice),
    ("+BTF=", Match::Prefix, Kind::SetName),
    ("+BTF?", Match::Exact, Kind::GetName),
    ("+BTIN", Match::Exact, Kind::Inquire),
    ("+BTK=", Match::Prefix, Kind::SetPin),
    ("+BTT?", Match::Exact, Kind::ListDevices),
    ("+BTW", Match::Prefix, Kind::InitPair),
    ("D", Match::Prefix, Kind::StartSession),
];

/// Classify a line outside a file-transfer session.
pub fn classify_general(line: &Line) -> GeneralCommand {
    let Some(body) = line.normalized().strip_prefix(AT_PREFIX) else {
        return GeneralCommand::Unknown;
    };
    if body.is_empty() {
        return GeneralCommand::Unknown;
    }

    // `+BTD*...` with trailing text is neither form.
    if body.starts_with("+BTD*") && body != "+BTD*" {
        return GeneralCommand::Unknown;
    }

    for (keyword, mode, kind) in GENERAL_KEYWORDS {
        let hit = match mode {
            Match::Exact => body == *keyword,
            Match::Prefix => body.starts_with(keyword),
        };
        if !hit {
            continue;
        }

        let arg = || line.argument_from(AT_PREFIX.len() + keyword.len()).to_string();
        return match kind {
            Kind::NoEcho => GeneralCommand::NoEcho,
            Kind::HangUp => GeneralCommand::HangUp,
            Kind::SetRegister => GeneralCommand::SetRegister(arg()),
            Kind::RemoveAllDevices => GeneralCommand::RemoveAllDevices,
            Kind::RemoveDevice => GeneralCommand::RemoveDevice(arg()),
            Kind::SetName => GeneralCommand::SetName(arg()),
            Kind::GetName => GeneralCommand::GetName,
            Kind::Inquire => GeneralCommand::Inquire,
            Kind::SetPin => GeneralCommand::SetPin(arg()),
            Kind::ListDevices => GeneralCommand::ListDevices,
            Kind::InitPair => GeneralCommand::InitPair(arg()),
            Kind::StartSession => GeneralCommand::StartSession(arg()),
        };
    }

    GeneralCommand::Unknown
}

// ============================================================================
// FTP grammar
// ============================================================================

/// A command inside a file-transfer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtpCommand {
    /// `CD "<path>"` or `CD \`
    ChangeDir(String),
    /// `MD "<dir>"`
    MakeDir(String),
    /// `MAX`
    GetMaxSize,
    /// `PUT "<file>"`
    Put(String),
    /// `DIR -RAW`
    ListDir,
    /// `QUIT`
    Quit,
    /// `ABORT`
    Abort,
    /// Anything else, including badly quoted arguments.
    Unknown,
}

impl FtpCommand {
    /// Stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChangeDir(_) => "change-dir",
            Self::MakeDir(_) => "make-dir",
            Self::GetMaxSize => "get-max-size",
            Self::Put(_) => "put",
            Self::ListDir => "list-dir",
            Self::Quit => "quit",
            Self::Abort => "abort",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Argument after `keyword` when the line starts with it.
fn ftp_argument<'a>(line: &'a Line, keyword: &str) -> Option<&'a str> {
    line.normalized()
        .starts_with(keyword)
        .then(|| line.argument_from(keyword.len()))
}

fn quoted(arg: &str, build: fn(String) -> FtpCommand) -> (FtpCommand, Option<ProtocolError>) {
    match strip_quotes(arg) {
        Ok(inner) => (build(inner.to_string()), None),
        Err(e) => (FtpCommand::Unknown, Some(e)),
    }
}

/// Classify a line inside a file-transfer session.
///
/// A badly quoted `CD`, `MD` or `PUT` argument classifies as
/// [`FtpCommand::Unknown`].
pub fn classify_ftp(line: &Line) -> FtpCommand {
    classify_ftp_with_cause(line).0
}

/// Like [`classify_ftp`], also returning why an unknown line was rejected.
///
/// The cause is [`ProtocolError::MalformedArgument`] for a badly quoted
/// argument and [`ProtocolError::ProtocolViolation`] for anything else.
pub fn classify_ftp_with_cause(line: &Line) -> (FtpCommand, Option<ProtocolError>) {
    let upper = line.normalized();

    if upper == "QUIT" {
        return (FtpCommand::Quit, None);
    }
    if upper == "MAX" {
        return (FtpCommand::GetMaxSize, None);
    }
    if let Some(arg) = ftp_argument(line, "CD ") {
        if arg == ROOT_FOLDER {
            return (FtpCommand::ChangeDir(arg.to_string()), None);
        }
        return quoted(arg, FtpCommand::ChangeDir);
    }
    if let Some(arg) = ftp_argument(line, "MD ") {
        return quoted(arg, FtpCommand::MakeDir);
    }
    if let Some(arg) = ftp_argument(line, "PUT ") {
        return quoted(arg, FtpCommand::Put);
    }
    if upper.starts_with("DIR -RAW") {
        return (FtpCommand::ListDir, None);
    }
    if upper.starts_with("ABORT") {
        return (FtpCommand::Abort, None);
    }

    (
        FtpCommand::Unknown,
        Some(ProtocolError::ProtocolViolation(line.original().to_string())),
    )
}
