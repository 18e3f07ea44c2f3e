//! File-transfer sessions.
//!
//! A session starts once the dispatcher has brought up an OBEX link and runs
//! until `QUIT`, channel loss or inactivity. It is supported by an inactivity
//! watchdog, an abort listener used during folder listings, and the external
//! start/end hooks.

pub mod abort;
pub mod hooks;
pub mod manager;
pub mod watchdog;

pub use abort::{AbortListener, ListenerReport};
pub use hooks::run_hook;
pub use manager::{
    FtpSession, SessionOutcome, SessionSettings, SessionState, DEFAULT_CHUNK_SIZE,
};
pub use watchdog::{Watchdog, WatchdogExit};
