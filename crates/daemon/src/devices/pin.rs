//! PIN hand-off to the pairing agent.
//!
//! The agent reads the PIN for the next pairing from a well-known file. The
//! file is written by `AT+BTK=` and removed after every pairing attempt so a
//! PIN is never reused.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// The PIN file shared with the pairing agent.
#[derive(Debug, Clone)]
pub struct PinStore {
    path: PathBuf,
}

impl PinStore {
    /// Use the PIN file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the path to the PIN file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store the PIN for the next pairing.
    pub fn set(&self, pin: &str) -> Result<()> {
        fs::write(&self.path, pin)
            .with_context(|| format!("Failed to write PIN file: {}", self.path.display()))?;
        tracing::debug!("PIN stored at {:?}", self.path);
        Ok(())
    }

    /// Remove the PIN file. A missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove PIN file: {}", self.path.display())),
        }
    }

    /// Whether a PIN is waiting to be used.
    pub fn is_set(&self) -> bool {
        self.path.exists()
    }
}
