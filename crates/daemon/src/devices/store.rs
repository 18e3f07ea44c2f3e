//! Persistent device records.
//!
//! This module provides a thread-safe store for the adapter's friendly name,
//! the paired devices and the names learned during inquiries. The store
//! persists to JSON at `<data_dir>/devices.json`.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use anyhow::{Context, Result};
use protocol::DeviceAddress;
use serde::{Deserialize, Serialize};

/// Most inquiry names kept in the cache.
pub const MAX_CACHED_NAMES: usize = 256;

/// A paired device entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedDevice {
    /// The device address.
    pub address: DeviceAddress,
    /// Human-readable name for the device.
    pub name: String,
    /// Whether pairing completed successfully.
    pub trusted: bool,
    /// Timestamp when the device was first paired.
    pub first_seen: SystemTime,
    /// Timestamp when the device was last used.
    pub last_seen: SystemTime,
}

impl PairedDevice {
    /// Creates a trusted device entry.
    pub fn new(address: DeviceAddress, name: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            address,
            name: name.into(),
            trusted: true,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Text of the data line listing this device: `ADDR,"name"`.
    ///
    /// The address stands in for an empty name.
    pub fn to_line(&self) -> String {
        let address = self.address.compact();
        let name = if self.name.is_empty() {
            address.as_str()
        } else {
            self.name.as_str()
        };
        format!("{},\"{}\"", address, name)
    }
}

/// A name learned from an inquiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedName {
    address: DeviceAddress,
    name: String,
}

/// Wrapper for serializing the device store.
#[derive(Debug, Serialize, Deserialize)]
struct DeviceStoreData {
    /// Version of the store format (for future migrations).
    version: u32,
    /// Friendly name of the local adapter.
    #[serde(default)]
    friendly_name: Option<String>,
    /// The paired devices.
    devices: Vec<PairedDevice>,
    /// Names seen during inquiries.
    #[serde(default)]
    names: Vec<CachedName>,
}

/// Thread-safe store for device records.
///
/// Each collection sits behind its own `RwLock`; nothing is written to disk
/// until [`DeviceStore::save`] is called.
#[derive(Debug)]
pub struct DeviceStore {
    /// The path to the JSON file.
    path: PathBuf,
    /// Friendly name of the local adapter.
    friendly_name: RwLock<Option<String>>,
    /// Paired devices, keyed by address.
    devices: RwLock<HashMap<DeviceAddress, PairedDevice>>,
    /// Inquiry name cache, least recently seen first.
    names: RwLock<VecDeque<CachedName>>,
}

impl DeviceStore {
    /// Creates a new store that will persist to the given path.
    ///
    /// This does not load the file; call `load()` to read existing data.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            friendly_name: RwLock::new(None),
            devices: RwLock::new(HashMap::new()),
            names: RwLock::new(VecDeque::new()),
        }
    }

    /// Returns the path to the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the store from the JSON file.
    ///
    /// If the file does not exist, the store will be empty.
    /// If the file exists but is invalid, returns an error.
    pub fn load(&self) -> Result<()> {
        if !self.path.exists() {
            tracing::debug!("Device store not found at {:?}, starting empty", self.path);
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read device store: {}", self.path.display()))?;

        let data: DeviceStoreData = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse device store: {}", self.path.display()))?;

        *self
            .friendly_name
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on friendly name"))? =
            data.friendly_name;

        let mut devices = self
            .devices
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on device store"))?;
        devices.clear();
        for device in data.devices {
            devices.insert(device.address, device);
        }

        let mut names = self
            .names
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on name cache"))?;
        let skip = data.names.len().saturating_sub(MAX_CACHED_NAMES);
        *names = data.names.into_iter().skip(skip).collect();

        tracing::info!(
            "Loaded {} paired devices from {:?}",
            devices.len(),
            self.path
        );
        Ok(())
    }

    /// Saves the store to the JSON file.
    ///
    /// Uses atomic write (write to temp file, then rename) to prevent corruption.
    /// Creates parent directories if they don't exist.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create device store directory: {}", parent.display())
            })?;
        }

        let friendly_name = self
            .friendly_name
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on friendly name"))?
            .clone();
        let devices = self
            .devices
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on device store"))?;
        let names = self
            .names
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on name cache"))?;

        let mut device_list: Vec<PairedDevice> = devices.values().cloned().collect();
        device_list.sort_by_key(|device| device.address);
        let name_list: Vec<CachedName> = names.iter().cloned().collect();

        let data = DeviceStoreData {
            version: 1,
            friendly_name,
            devices: device_list,
            names: name_list,
        };

        let contents =
            serde_json::to_string_pretty(&data).context("Failed to serialize device store")?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents).with_context(|| {
            format!("Failed to write temp device store: {}", temp_path.display())
        })?;

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename temp device store {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!("Saved {} paired devices to {:?}", devices.len(), self.path);
        Ok(())
    }

    /// The stored friendly name of the local adapter.
    pub fn friendly_name(&self) -> Result<Option<String>> {
        Ok(self
            .friendly_name
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on friendly name"))?
            .clone())
    }

    /// Replaces the stored friendly name; `None` clears it.
    pub fn set_friendly_name(&self, name: Option<String>) -> Result<()> {
        let mut current = self
            .friendly_name
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on friendly name"))?;
        *current = name;
        Ok(())
    }

    /// Adds or updates a paired device.
    ///
    /// An existing entry keeps its `first_seen` timestamp.
    pub fn upsert(&self, mut device: PairedDevice) -> Result<()> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on device store"))?;

        if let Some(existing) = devices.get(&device.address) {
            device.first_seen = existing.first_seen;
        }

        tracing::info!(
            address = %device.address,
            name = %device.name,
            trusted = device.trusted,
            "Storing paired device"
        );
        devices.insert(device.address, device);
        Ok(())
    }

    /// Removes a device.
    ///
    /// Returns the removed device if it existed.
    pub fn remove(&self, address: &DeviceAddress) -> Result<Option<PairedDevice>> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on device store"))?;

        let removed = devices.remove(address);
        if let Some(ref device) = removed {
            tracing::info!("Removed device {} ({})", device.address, device.name);
        }
        Ok(removed)
    }

    /// Removes every device, returning them.
    pub fn remove_all(&self) -> Result<Vec<PairedDevice>> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on device store"))?;

        let removed: Vec<PairedDevice> = devices.drain().map(|(_, device)| device).collect();
        tracing::info!("Removed all {} paired devices", removed.len());
        Ok(removed)
    }

    /// Gets a device by its address.
    pub fn get(&self, address: &DeviceAddress) -> Result<Option<PairedDevice>> {
        let devices = self
            .devices
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on device store"))?;

        Ok(devices.get(address).cloned())
    }

    /// Updates the last seen timestamp for a device.
    ///
    /// Returns `false` if the device is not in the store.
    pub fn touch(&self, address: &DeviceAddress) -> Result<bool> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on device store"))?;

        Ok(match devices.get_mut(address) {
            Some(device) => {
                device.last_seen = SystemTime::now();
                true
            }
            None => false,
        })
    }

    /// Lists all devices ordered by address.
    pub fn list(&self) -> Result<Vec<PairedDevice>> {
        let devices = self
            .devices
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on device store"))?;

        let mut list: Vec<PairedDevice> = devices.values().cloned().collect();
        list.sort_by_key(|device| device.address);
        Ok(list)
    }

    /// Returns the number of paired devices.
    pub fn len(&self) -> Result<usize> {
        let devices = self
            .devices
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on device store"))?;
        Ok(devices.len())
    }

    /// Returns true if no device is paired.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remembers the name a device reported during an inquiry.
    ///
    /// Holds at most [`MAX_CACHED_NAMES`] entries; the device seen least
    /// recently is dropped first.
    pub fn cache_name(&self, address: DeviceAddress, name: impl Into<String>) -> Result<()> {
        let mut names = self
            .names
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on name cache"))?;
        names.retain(|cached| cached.address != address);
        names.push_back(CachedName {
            address,
            name: name.into(),
        });
        while names.len() > MAX_CACHED_NAMES {
            names.pop_front();
        }
        Ok(())
    }

    /// The name last seen for a device during an inquiry.
    pub fn cached_name(&self, address: &DeviceAddress) -> Result<Option<String>> {
        let names = self
            .names
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on name cache"))?;
        Ok(names
            .iter()
            .find(|cached| &cached.address == address)
            .map(|cached| cached.name.clone()))
    }
}
