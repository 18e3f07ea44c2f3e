//! Filesystem-backed adapter for development and testing.
//!
//! Peers come from `[[bluetooth.peers]]` in the configuration. Each peer's
//! remote filesystem is the folder `<root>/<ADDRESS>/`; uploads land there and
//! folder listings are rendered as `x-obex/folder-listing` documents.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use protocol::command::ROOT_FOLDER;
use protocol::DeviceAddress;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::{AdapterError, BluetoothAdapter, InquiryResult, ObexTransport, OpError, PairOutcome};
use crate::config::{BluetoothConfig, PeerConfig};

/// Pairing result when the PIN did not match.
const PAIR_AUTH_FAILED: u8 = 1;

const LISTING_HEADER: &str = "<?xml version=\"1.0\"?>\n\
<!DOCTYPE folder-listing SYSTEM \"obex-folder-listing.dtd\">\n\
<folder-listing version=\"1.0\">\n";

const LISTING_FOOTER: &str = "</folder-listing>\n";

/// Simulated adapter whose peers are configured folders.
#[derive(Debug)]
pub struct LoopbackAdapter {
    root: PathBuf,
    pin_file: PathBuf,
    mtu: i32,
    list_delay: Duration,
    peers: Vec<PeerConfig>,
    local_name: Mutex<String>,
    bonds: Mutex<HashSet<DeviceAddress>>,
}

impl LoopbackAdapter {
    /// Build an adapter from the `[bluetooth]` section.
    pub fn new(config: &BluetoothConfig) -> Self {
        Self {
            root: config.root.clone(),
            pin_file: config.pin_file.clone(),
            mtu: config.mtu,
            list_delay: Duration::from_millis(config.list_delay_ms),
            peers: config.peers.clone(),
            local_name: Mutex::new(String::new()),
            bonds: Mutex::new(HashSet::new()),
        }
    }

    /// The friendly name last set on the adapter.
    pub fn local_name(&self) -> String {
        self.local_name
            .lock()
            .map(|name| name.clone())
            .unwrap_or_default()
    }

    /// Whether a bond with `address` exists.
    pub fn is_bonded(&self, address: &DeviceAddress) -> bool {
        self.bonds
            .lock()
            .map(|bonds| bonds.contains(address))
            .unwrap_or(false)
    }

    /// Folder holding the files of `address`.
    pub fn peer_root(&self, address: &DeviceAddress) -> PathBuf {
        self.root.join(address.compact())
    }

    fn peer(&self, address: &DeviceAddress) -> Option<&PeerConfig> {
        self.peers.iter().find(|peer| &peer.address == address)
    }

    fn pin_matches(&self, expected: &str) -> bool {
        match std::fs::read_to_string(&self.pin_file) {
            Ok(pin) => pin.trim_end_matches(['\r', '\n']) == expected,
            Err(e) => {
                tracing::debug!("No PIN available at {:?}: {}", self.pin_file, e);
                false
            }
        }
    }
}

impl BluetoothAdapter for LoopbackAdapter {
    type Transport = LoopbackTransport;

    async fn set_local_name(&self, name: &str) -> Result<(), AdapterError> {
        let mut local = self
            .local_name
            .lock()
            .map_err(|_| AdapterError::Failed("adapter state lock poisoned".to_string()))?;
        *local = name.to_string();
        tracing::debug!(name, "local name set");
        Ok(())
    }

    async fn inquire(&self) -> Result<Vec<InquiryResult>, AdapterError> {
        Ok(self
            .peers
            .iter()
            .map(|peer| InquiryResult {
                address: peer.address,
                class: peer.class,
                name: (!peer.name.is_empty()).then(|| peer.name.clone()),
            })
            .collect())
    }

    async fn remote_name(&self, address: &DeviceAddress) -> Option<String> {
        self.peer(address)
            .filter(|peer| !peer.name.is_empty())
            .map(|peer| peer.name.clone())
    }

    async fn pair(&self, address: &DeviceAddress) -> PairOutcome {
        let Some(peer) = self.peer(address) else {
            return PairOutcome::NotStarted;
        };

        if let Some(expected) = &peer.pin {
            if !self.pin_matches(expected) {
                return PairOutcome::Completed(PAIR_AUTH_FAILED);
            }
        }

        match self.bonds.lock() {
            Ok(mut bonds) => {
                bonds.insert(*address);
                PairOutcome::Completed(0)
            }
            Err(_) => PairOutcome::NotStarted,
        }
    }

    async fn remove_bond(&self, address: &DeviceAddress) -> Result<bool, AdapterError> {
        let mut bonds = self
            .bonds
            .lock()
            .map_err(|_| AdapterError::Failed("adapter state lock poisoned".to_string()))?;
        Ok(bonds.remove(address))
    }

    async fn find_obex_channel(&self, address: &DeviceAddress) -> Result<u8, AdapterError> {
        match self.peer(address) {
            Some(peer) if peer.invalid => Err(AdapterError::InvalidDevice(address.to_string())),
            Some(peer) if peer.channel > 0 => Ok(peer.channel),
            Some(_) => Err(AdapterError::NoCarrier(format!(
                "{} offers no file-transfer service",
                address
            ))),
            None => Err(AdapterError::NoCarrier(format!("{} did not answer", address))),
        }
    }

    async fn connect(
        &self,
        address: &DeviceAddress,
        channel: u8,
    ) -> Result<LoopbackTransport, AdapterError> {
        let peer = self
            .peer(address)
            .ok_or_else(|| AdapterError::ConnectFailed(format!("{} is not reachable", address)))?;
        if peer.channel != channel {
            return Err(AdapterError::ConnectFailed(format!(
                "{} has no service on channel {}",
                address, channel
            )));
        }

        let root = self.peer_root(address);
        tokio::fs::create_dir_all(&root).await?;

        Ok(LoopbackTransport::new(root, self.mtu, self.list_delay))
    }
}

/// An upload in progress; data goes to a hidden partial file until finished.
#[derive(Debug)]
struct Upload {
    file: tokio::fs::File,
    partial: PathBuf,
    target: PathBuf,
}

/// Transport rooted at one peer folder.
#[derive(Debug)]
pub struct LoopbackTransport {
    root: PathBuf,
    cwd: Vec<String>,
    upload: Option<Upload>,
    mtu: i32,
    list_delay: Duration,
    released: bool,
}

impl LoopbackTransport {
    /// Open a transport on `root`.
    pub fn new(root: PathBuf, mtu: i32, list_delay: Duration) -> Self {
        Self {
            root,
            cwd: Vec::new(),
            upload: None,
            mtu,
            list_delay,
            released: false,
        }
    }

    /// The current folder on disk.
    pub fn current_dir(&self) -> PathBuf {
        self.folder(&self.cwd)
    }

    /// Whether [`ObexTransport::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn folder(&self, parts: &[String]) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(parts);
        path
    }

    fn ensure_open(&self) -> Result<(), OpError> {
        if self.released {
            return Err(OpError::Failed("transport released".to_string()));
        }
        Ok(())
    }

    /// Resolve `path` against the current folder without touching the disk.
    fn resolve(&self, path: &str) -> Result<Vec<String>, OpError> {
        if path.is_empty() || path == ROOT_FOLDER {
            return Ok(Vec::new());
        }

        let mut parts = self.cwd.clone();
        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop().ok_or(OpError::Refused)?;
                }
                name => {
                    check_component(name)?;
                    parts.push(name.to_string());
                }
            }
        }
        Ok(parts)
    }
}

impl ObexTransport for LoopbackTransport {
    async fn change_dir(&mut self, path: &str) -> Result<(), OpError> {
        self.ensure_open()?;
        let parts = self.resolve(path)?;

        match tokio::fs::metadata(self.folder(&parts)).await {
            Ok(meta) if meta.is_dir() => {
                self.cwd = parts;
                Ok(())
            }
            Ok(_) => Err(OpError::Refused),
            Err(e) => Err(map_io(e)),
        }
    }

    async fn make_dir(&mut self, path: &str) -> Result<(), OpError> {
        self.ensure_open()?;
        let parts = self.resolve(path)?;

        // Create each missing level, as a chain of create-and-enter requests would.
        for depth in 1..=parts.len() {
            let dir = self.folder(&parts[..depth]);
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => tracing::debug!("created folder {:?}", dir),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(map_io(e)),
            }
        }

        self.cwd = parts;
        Ok(())
    }

    async fn begin_put(&mut self, name: &str) -> Result<(), OpError> {
        self.ensure_open()?;
        if matches!(name, "" | "." | "..") || name.contains('/') {
            return Err(OpError::Refused);
        }
        check_component(name)?;
        self.cancel_put().await;

        let dir = self.current_dir();
        let partial = dir.join(format!(".{}.part", name));
        let file = tokio::fs::File::create(&partial).await.map_err(map_io)?;

        self.upload = Some(Upload {
            file,
            partial,
            target: dir.join(name),
        });
        Ok(())
    }

    async fn write_chunk(&mut self, data: &[u8]) -> Result<(), OpError> {
        let upload = self
            .upload
            .as_mut()
            .ok_or_else(|| OpError::Failed("no upload in progress".to_string()))?;
        upload.file.write_all(data).await.map_err(map_io)
    }

    async fn finish_put(&mut self) -> Result<(), OpError> {
        let mut upload = self
            .upload
            .take()
            .ok_or_else(|| OpError::Failed("no upload in progress".to_string()))?;

        upload.file.flush().await.map_err(map_io)?;
        drop(upload.file);
        tokio::fs::rename(&upload.partial, &upload.target)
            .await
            .map_err(map_io)?;

        tracing::debug!("stored {:?}", upload.target);
        Ok(())
    }

    async fn cancel_put(&mut self) {
        if let Some(upload) = self.upload.take() {
            drop(upload.file);
            if let Err(e) = tokio::fs::remove_file(&upload.partial).await {
                tracing::debug!("Failed to remove {:?}: {}", upload.partial, e);
            }
        }
    }

    async fn list_dir(&mut self, cancel: &CancellationToken) -> Result<String, OpError> {
        self.ensure_open()?;
        let folder = self.current_dir();
        let at_root = self.cwd.is_empty();
        let delay = self.list_delay;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OpError::Cancelled),
            listing = async {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                render_listing(&folder, at_root).await
            } => listing,
        }
    }

    fn mtu(&self) -> i32 {
        self.mtu
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.cancel_put().await;
        self.released = true;
        tracing::debug!("loopback transport on {:?} released", self.root);
    }
}

fn check_component(name: &str) -> Result<(), OpError> {
    if name.contains(['\\', '\0']) {
        return Err(OpError::Refused);
    }
    Ok(())
}

fn map_io(error: io::Error) -> OpError {
    match error.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => OpError::Refused,
        _ => OpError::Failed(error.to_string()),
    }
}

fn is_partial(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".part")
}

async fn render_listing(folder: &Path, at_root: bool) -> Result<String, OpError> {
    let mut entries = tokio::fs::read_dir(folder).await.map_err(map_io)?;
    let mut folders = Vec::new();
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(map_io)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_partial(&name) {
            continue;
        }
        let meta = entry.metadata().await.map_err(map_io)?;
        if meta.is_dir() {
            folders.push(name);
        } else {
            files.push((name, meta.len()));
        }
    }
    folders.sort();
    files.sort();

    let mut listing = String::from(LISTING_HEADER);
    if !at_root {
        listing.push_str("  <parent-folder/>\n");
    }
    for name in folders {
        listing.push_str(&format!("  <folder name=\"{}\"/>\n", escape_attr(&name)));
    }
    for (name, size) in files {
        listing.push_str(&format!(
            "  <file name=\"{}\" size=\"{}\"/>\n",
            escape_attr(&name),
            size
        ));
    }
    listing.push_str(LISTING_FOOTER);
    Ok(listing)
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}
