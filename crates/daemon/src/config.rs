//! Configuration management for the ObexGate daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/obexgate/config.toml`.
//!
//! Older installations keep two settings in a `key=value` file; see
//! [`Config::apply_legacy`].

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::DeviceAddress;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("listener address is not an IP address: {0}")]
    InvalidListenAddress(String),

    #[error("listener port must be greater than 0")]
    InvalidPort,

    #[error("inactive_timeout_secs must be between 1 and 86400, got {0}")]
    InvalidInactiveTimeout(u64),

    #[error("indicator command not found: {0}")]
    InvalidIndicatorCommand(String),

    #[error("loopback mtu must not exceed 65535, got {0}")]
    InvalidMtu(i32),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Inactivity timeout used when nothing valid is configured.
pub const DEFAULT_INACTIVE_TIMEOUT_SECS: u64 = 120;

/// Upper bound for the inactivity timeout.
const MAX_INACTIVE_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Where older installations keep their `key=value` settings.
pub const LEGACY_CONFIG_PATH: &str = "/mnt/flash/config/conf/bt_obex.conf";

/// Main configuration structure for the ObexGate daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Command channel listener.
    pub listener: ListenerConfig,

    /// File-transfer session settings.
    pub session: SessionConfig,

    /// Status LED.
    pub indicator: IndicatorConfig,

    /// Bluetooth backend.
    pub bluetooth: BluetoothConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory for persistent state (device records, friendly name).
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Also write a daily-rotated log file into `log_dir`.
    pub debug_log: bool,

    /// Directory for the debug log file.
    pub log_dir: PathBuf,

    /// Legacy `key=value` settings file, applied on top of this file.
    pub legacy_config: Option<PathBuf>,
}

/// Listener for the controller's command channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Local IP address to bind.
    pub address: String,

    /// TCP port to bind.
    pub port: u16,
}

/// File-transfer session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds without a command before the session's transport is released.
    pub inactive_timeout_secs: u64,

    /// Command run when a session starts. Empty disables it.
    pub start_hook: String,

    /// Command run when a session ends. Empty disables it.
    pub end_hook: String,

    /// Quiet period in milliseconds used when discarding an aborted upload.
    pub drain_quiet_ms: u64,
}

/// Status LED settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Drive the LED through `command`. When false, states are only logged.
    pub enabled: bool,

    /// LED control program, invoked as `<command> bt <state>`.
    pub command: String,
}

/// Bluetooth backend kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Filesystem-backed simulator.
    #[default]
    Loopback,
}

/// Bluetooth backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Which backend to use.
    pub backend: Backend,

    /// Loopback storage root; each peer gets a folder named by its address.
    pub root: PathBuf,

    /// File the pairing agent reads the PIN from.
    pub pin_file: PathBuf,

    /// MTU reported by loopback transports.
    pub mtu: i32,

    /// Artificial delay for loopback folder listings, in milliseconds.
    pub list_delay_ms: u64,

    /// Peers the loopback backend can discover.
    pub peers: Vec<PeerConfig>,
}

/// A simulated remote device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerConfig {
    /// Device address.
    pub address: DeviceAddress,

    /// Friendly name reported by the device.
    pub name: String,

    /// Class of device.
    #[serde(default = "default_device_class")]
    pub class: u32,

    /// RFCOMM channel of the file-transfer service.
    #[serde(default = "default_obex_channel")]
    pub channel: u8,

    /// PIN the device expects during pairing, if any.
    #[serde(default)]
    pub pin: Option<String>,

    /// Service discovery rejects the address as an invalid device.
    #[serde(default)]
    pub invalid: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            log_dir: data_dir.join("logs"),
            data_dir,
            log_level: "info".to_string(),
            debug_log: false,
            legacy_config: Some(PathBuf::from(LEGACY_CONFIG_PATH)),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "192.168.171.2".to_string(),
            port: 2004,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactive_timeout_secs: DEFAULT_INACTIVE_TIMEOUT_SECS,
            start_hook: "add_obex_service".to_string(),
            end_hook: "del_obex_service".to_string(),
            drain_quiet_ms: 200,
        }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "titan3_led".to_string(),
        }
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Loopback,
            root: default_data_dir().join("loopback"),
            pin_file: PathBuf::from("/tmp/BT_pincode"),
            mtu: 4096,
            list_delay_ms: 0,
            peers: Vec::new(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("obexgate")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("obexgate")
}

fn default_device_class() -> u32 {
    0x5a_020c
}

fn default_obex_channel() -> u8 {
    10
}

impl SessionConfig {
    /// The inactivity timeout as a duration.
    pub fn inactive_timeout(&self) -> Duration {
        Duration::from_secs(self.inactive_timeout_secs)
    }

    /// The drain quiet period as a duration.
    pub fn drain_quiet(&self) -> Duration {
        Duration::from_millis(self.drain_quiet_ms)
    }
}

impl ListenerConfig {
    /// The address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .address
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddress(self.address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Config {
    /// Path of the device store inside the data directory.
    pub fn device_store_path(&self) -> PathBuf {
        self.daemon.data_dir.join("devices.json")
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - OBEXGATE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - OBEXGATE_LISTEN_ADDR: Override the listener IP address
    /// - OBEXGATE_INACTIVE_TIMEOUT: Override the session inactivity timeout in seconds
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("OBEXGATE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }

        if let Ok(addr) = std::env::var("OBEXGATE_LISTEN_ADDR") {
            if !addr.is_empty() {
                tracing::info!("Overriding listener address from environment: {}", addr);
                self.listener.address = addr;
            }
        }

        if let Ok(timeout) = std::env::var("OBEXGATE_INACTIVE_TIMEOUT") {
            match timeout.trim().parse::<u64>() {
                Ok(secs) => {
                    tracing::info!("Overriding inactive_timeout_secs from environment: {}", secs);
                    self.session.inactive_timeout_secs = secs;
                }
                Err(_) if timeout.is_empty() => {}
                Err(_) => {
                    tracing::warn!("Ignoring OBEXGATE_INACTIVE_TIMEOUT={:?}", timeout);
                }
            }
        }
    }

    /// Apply settings from a legacy `key=value` file.
    ///
    /// Recognized keys are `inactive.timeout=<seconds>` and
    /// `debuglog.enable=<YES|NO>`. A timeout that is not a positive number
    /// falls back to the default. Returns `false` when the file does not exist.
    pub fn apply_legacy<P: AsRef<Path>>(&mut self, path: P) -> Result<bool> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Legacy config not found at {:?}", path);
            return Ok(false);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read legacy config file: {}", path.display()))?;

        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "inactive.timeout" => {
                    self.session.inactive_timeout_secs = match value.trim().parse::<i64>() {
                        Ok(secs) if secs > 0 => secs as u64,
                        _ => DEFAULT_INACTIVE_TIMEOUT_SECS,
                    };
                }
                "debuglog.enable" => {
                    let value = value.trim();
                    self.daemon.debug_log = !(value.starts_with("NO") || value.starts_with("no"));
                }
                _ => {}
            }
        }

        tracing::debug!(
            inactive_timeout_secs = self.session.inactive_timeout_secs,
            debug_log = self.daemon.debug_log,
            "Applied legacy config from {:?}",
            path
        );
        Ok(true)
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        self.listener.socket_addr()?;
        if self.listener.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        let timeout = self.session.inactive_timeout_secs;
        if timeout == 0 || timeout > MAX_INACTIVE_TIMEOUT_SECS {
            return Err(ConfigError::InvalidInactiveTimeout(timeout));
        }

        if self.bluetooth.mtu > i32::from(u16::MAX) {
            return Err(ConfigError::InvalidMtu(self.bluetooth.mtu));
        }

        if self.indicator.enabled {
            let command = Path::new(&self.indicator.command);
            let found = if command.is_absolute() {
                command.exists()
            } else {
                which::which(&self.indicator.command).is_ok()
            };
            if !found {
                return Err(ConfigError::InvalidIndicatorCommand(
                    self.indicator.command.clone(),
                ));
            }
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert!(!config.daemon.debug_log);
        assert_eq!(config.listener.address, "192.168.171.2");
        assert_eq!(config.listener.port, 2004);
        assert_eq!(config.session.inactive_timeout_secs, 120);
        assert_eq!(config.session.start_hook, "add_obex_service");
        assert_eq!(config.session.end_hook, "del_obex_service");
        assert_eq!(config.indicator.command, "titan3_led");
        assert_eq!(config.bluetooth.backend, Backend::Loopback);
        assert_eq!(config.bluetooth.pin_file, PathBuf::from("/tmp/BT_pincode"));
        assert!(config.bluetooth.peers.is_empty());
    }

    #[test]
    fn test_default_daemon_config() {
        let config = DaemonConfig::default();
        assert!(config.data_dir.to_string_lossy().contains("obexgate"));
        assert!(config.log_dir.starts_with(&config.data_dir));
        assert_eq!(
            config.legacy_config,
            Some(PathBuf::from(LEGACY_CONFIG_PATH))
        );
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[daemon]
log_level = "debug"

[session]
inactive_timeout_secs = 30
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.session.inactive_timeout_secs, 30);
        assert_eq!(config.listener.port, 2004);
        assert_eq!(config.session.start_hook, "add_obex_service");
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
data_dir = "/custom/data"
log_level = "trace"
debug_log = true
log_dir = "/custom/logs"

[listener]
address = "127.0.0.1"
port = 9000

[session]
inactive_timeout_secs = 45
start_hook = ""
end_hook = "logger done"
drain_quiet_ms = 50

[indicator]
enabled = true
command = "/usr/bin/led"

[bluetooth]
backend = "loopback"
root = "/srv/peers"
pin_file = "/run/pin"
mtu = 1024
list_delay_ms = 10

[[bluetooth.peers]]
address = "00:11:22:33:44:55"
name = "Handset"
pin = "1234"

[[bluetooth.peers]]
address = "A0B1C2D3E4F5"
name = "Laptop"
class = 0x1c010c
channel = 3
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.daemon.log_dir, PathBuf::from("/custom/logs"));
        assert!(config.daemon.debug_log);
        assert_eq!(config.listener.address, "127.0.0.1");
        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.session.inactive_timeout_secs, 45);
        assert!(config.session.start_hook.is_empty());
        assert_eq!(config.session.end_hook, "logger done");
        assert_eq!(config.session.drain_quiet(), Duration::from_millis(50));
        assert!(config.indicator.enabled);
        assert_eq!(config.bluetooth.root, PathBuf::from("/srv/peers"));
        assert_eq!(config.bluetooth.mtu, 1024);
        assert_eq!(config.bluetooth.peers.len(), 2);

        let handset = &config.bluetooth.peers[0];
        assert_eq!(handset.address.compact(), "001122334455");
        assert_eq!(handset.class, 0x5a020c);
        assert_eq!(handset.channel, 10);
        assert_eq!(handset.pin.as_deref(), Some("1234"));

        let laptop = &config.bluetooth.peers[1];
        assert_eq!(laptop.class, 0x1c010c);
        assert_eq!(laptop.channel, 3);
        assert_eq!(laptop.pin, None);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[daemon
log_level = "debug"
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_unknown_backend() {
        let toml = r#"
[bluetooth]
backend = "bluez"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_from_toml_bad_peer_address() {
        let toml = r#"
[[bluetooth.peers]]
address = "not-an-address"
name = "x"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut original = Config::default();
        original.daemon.debug_log = true;
        original.bluetooth.peers.push(PeerConfig {
            address: "001122334455".parse().unwrap(),
            name: "Handset".to_string(),
            class: default_device_class(),
            channel: default_obex_channel(),
            pin: None,
            invalid: false,
        });

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.daemon.log_level = "debug".to_string();
        original.session.inactive_timeout_secs = 15;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid [ toml").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("obexgate"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_socket_addr() {
        let listener = ListenerConfig {
            address: "127.0.0.1".to_string(),
            port: 2004,
        };
        assert_eq!(
            listener.socket_addr().unwrap(),
            "127.0.0.1:2004".parse().unwrap()
        );
    }

    // ========================================================================
    // Legacy settings file
    // ========================================================================

    fn write_legacy(contents: &str) -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bt_obex.conf");
        fs::write(&path, contents).unwrap();
        (temp_dir, path)
    }

    #[test]
    fn test_legacy_missing_file() {
        let mut config = Config::default();
        assert!(!config.apply_legacy("/nonexistent/bt_obex.conf").unwrap());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_legacy_values_applied() {
        let (_dir, path) = write_legacy("inactive.timeout=300\ndebuglog.enable=YES\n");
        let mut config = Config::default();

        assert!(config.apply_legacy(&path).unwrap());
        assert_eq!(config.session.inactive_timeout_secs, 300);
        assert!(config.daemon.debug_log);
    }

    #[test]
    fn test_legacy_debug_log_disabled() {
        for value in ["NO", "no", "No thanks"] {
            let (_dir, path) = write_legacy(&format!("debuglog.enable={}\n", value));
            let mut config = Config::default();
            config.daemon.debug_log = true;

            config.apply_legacy(&path).unwrap();
            assert!(!config.daemon.debug_log, "value {:?}", value);
        }
    }

    #[test]
    fn test_legacy_bad_timeout_falls_back() {
        for value in ["0", "-5", "soon", ""] {
            let (_dir, path) = write_legacy(&format!("inactive.timeout={}\n", value));
            let mut config = Config::default();
            config.session.inactive_timeout_secs = 10;

            config.apply_legacy(&path).unwrap();
            assert_eq!(
                config.session.inactive_timeout_secs, DEFAULT_INACTIVE_TIMEOUT_SECS,
                "value {:?}",
                value
            );
        }
    }

    #[test]
    fn test_legacy_ignores_other_lines() {
        let (_dir, path) = write_legacy("# comment\nfoo=bar\n\ninactive.timeout=60\n");
        let mut config = Config::default();

        config.apply_legacy(&path).unwrap();
        assert_eq!(config.session.inactive_timeout_secs, 60);
        assert!(!config.daemon.debug_log);
    }

    // ========================================================================
    // Environment overrides
    // ========================================================================

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::set_var("OBEXGATE_LOG_LEVEL", "trace");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.daemon.log_level, "trace");

        std::env::remove_var("OBEXGATE_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_listen_addr_and_timeout() {
        std::env::set_var("OBEXGATE_LISTEN_ADDR", "127.0.0.1");
        std::env::set_var("OBEXGATE_INACTIVE_TIMEOUT", "15");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.listener.address, "127.0.0.1");
        assert_eq!(config.session.inactive_timeout_secs, 15);

        std::env::remove_var("OBEXGATE_LISTEN_ADDR");
        std::env::remove_var("OBEXGATE_INACTIVE_TIMEOUT");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_or_invalid_is_ignored() {
        std::env::set_var("OBEXGATE_LOG_LEVEL", "");
        std::env::set_var("OBEXGATE_INACTIVE_TIMEOUT", "never");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config, Config::default());

        std::env::remove_var("OBEXGATE_LOG_LEVEL");
        std::env::remove_var("OBEXGATE_INACTIVE_TIMEOUT");
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();

        config.daemon.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());

        config.daemon.log_level = "warning".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("warning".to_string()))
        );
    }

    #[test]
    fn test_validate_listen_address() {
        let mut config = Config::default();
        config.listener.address = "gateway.local".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidListenAddress("gateway.local".to_string()))
        );
    }

    #[test]
    fn test_validate_port() {
        let mut config = Config::default();
        config.listener.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort));
    }

    #[test]
    fn test_validate_inactive_timeout() {
        let mut config = Config::default();

        config.session.inactive_timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidInactiveTimeout(0))
        );

        config.session.inactive_timeout_secs = 86_401;
        assert!(config.validate().is_err());

        config.session.inactive_timeout_secs = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_mtu() {
        let mut config = Config::default();
        config.bluetooth.mtu = 70_000;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMtu(70_000)));

        config.bluetooth.mtu = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_indicator_command() {
        let mut config = Config::default();
        config.indicator.enabled = true;
        config.indicator.command = "nonexistent_led_tool_xyz".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidIndicatorCommand(
                "nonexistent_led_tool_xyz".to_string()
            ))
        );

        config.indicator.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_validate_indicator_command_in_path() {
        let mut config = Config::default();
        config.indicator.enabled = true;
        config.indicator.command = "sh".to_string();
        assert!(config.validate().is_ok());
    }
}
