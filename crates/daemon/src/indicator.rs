//! Status LED.
//!
//! The dispatcher switches the LED while it inquires, pairs or runs a session
//! and puts the previous state back afterwards.

use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// LED states understood by the LED control program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedState {
    /// Off.
    Off,
    /// Steady on; a link is up or being set up.
    Solid,
    /// Slow flash; the adapter is discoverable.
    FlashDiscoverable,
    /// Fast flash; an inquiry is running.
    FlashInquiry,
    /// Data activity.
    DataActivity,
}

impl LedState {
    /// Numeric value passed to the LED control program.
    pub fn code(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Solid => 1,
            Self::FlashDiscoverable => 2,
            Self::FlashInquiry => 3,
            Self::DataActivity => 4,
        }
    }

    /// The state with numeric value `code`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::Solid),
            2 => Some(Self::FlashDiscoverable),
            3 => Some(Self::FlashInquiry),
            4 => Some(Self::DataActivity),
            _ => None,
        }
    }
}

/// Something that shows a [`LedState`].
pub trait Indicator: Send + Sync {
    /// Switch to `state`.
    fn set(&self, state: LedState);

    /// The state last switched to.
    fn current(&self) -> LedState;
}

/// Drives the LED by running `<program> bt <code>`.
///
/// The program is started and not waited for.
#[derive(Debug)]
pub struct CommandIndicator {
    program: String,
    state: AtomicU8,
}

impl CommandIndicator {
    /// Use `program`, assuming the LED currently shows `initial`.
    pub fn new(program: impl Into<String>, initial: LedState) -> Self {
        Self {
            program: program.into(),
            state: AtomicU8::new(initial.code()),
        }
    }
}

impl Indicator for CommandIndicator {
    fn set(&self, state: LedState) {
        self.state.store(state.code(), Ordering::SeqCst);

        let spawned = tokio::process::Command::new(&self.program)
            .arg("bt")
            .arg(state.code().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(_child) => tracing::debug!(led = ?state, "indicator set"),
            Err(e) => tracing::warn!("Failed to run {}: {}", self.program, e),
        }
    }

    fn current(&self) -> LedState {
        LedState::from_code(self.state.load(Ordering::SeqCst)).unwrap_or(LedState::Off)
    }
}

/// Records and logs state changes without driving any hardware.
#[derive(Debug)]
pub struct LogIndicator {
    history: Mutex<Vec<LedState>>,
    state: AtomicU8,
}

impl LogIndicator {
    /// Start out showing `initial`.
    pub fn new(initial: LedState) -> Self {
        Self {
            history: Mutex::new(Vec::new()),
            state: AtomicU8::new(initial.code()),
        }
    }

    /// Every state set so far, oldest first.
    pub fn history(&self) -> Vec<LedState> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }
}

impl Default for LogIndicator {
    fn default() -> Self {
        Self::new(LedState::FlashDiscoverable)
    }
}

impl Indicator for LogIndicator {
    fn set(&self, state: LedState) {
        self.state.store(state.code(), Ordering::SeqCst);
        if let Ok(mut history) = self.history.lock() {
            history.push(state);
        }
        tracing::debug!(led = ?state, "indicator set");
    }

    fn current(&self) -> LedState {
        LedState::from_code(self.state.load(Ordering::SeqCst)).unwrap_or(LedState::Off)
    }
}
