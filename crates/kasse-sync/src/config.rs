//! # Deployment Configuration
//!
//! Settings both processes need before they can open the store. Business
//! settings (overdraft limit, PIN, ...) are NOT here; they live in the
//! store's `settings` table.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KASSE_DATA_DIR=/srv/kasse                                          │
//! │     KASSE_POLL_INTERVAL=3                                              │
//! │     KASSE_READER=/dev/ttyUSB0                                          │
//! │     KASSE_BIND_ADDR=127.0.0.1:8000                                     │
//! │     KASSE_SESSION_SECRET=...                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/kasse/kasse.toml (Linux)                                 │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! data_dir = "/srv/kasse"
//!
//! [sync]
//! poll_interval_secs = 3
//!
//! [terminal]
//! reader = "console"          # or a device path emitting one token per line
//! read_timeout_secs = 10
//! wager_prompt_secs = 15
//! currency_symbol = "€"
//!
//! [back_office]
//! bind_addr = "0.0.0.0:8000"
//! session_secret = ""         # generated at startup when empty
//! session_lifetime_secs = 28800
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::markers::FsMarkers;

/// Upper bound for the poll interval.
pub const MAX_POLL_INTERVAL_SECS: u64 = 60 * 60;

/// Upper bound for the identity-read timeout and the wager prompt.
pub const MAX_TERMINAL_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Upper bound for a back-office session.
pub const MAX_SESSION_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;

// =============================================================================
// Store
// =============================================================================

/// Where the shared files live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Holds `kasse.db`, `refresh.flag`, `exit.flag` and `admin_secret`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "kasse", "kasse")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            data_dir: default_data_dir(),
        }
    }
}

impl StoreSettings {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("kasse.db")
    }

    pub fn refresh_marker_path(&self) -> PathBuf {
        self.data_dir.join("refresh.flag")
    }

    pub fn exit_marker_path(&self) -> PathBuf {
        self.data_dir.join("exit.flag")
    }

    pub fn admin_secret_path(&self) -> PathBuf {
        self.data_dir.join("admin_secret")
    }

    /// Filesystem markers under `data_dir`.
    pub fn markers(&self) -> FsMarkers {
        FsMarkers::new(self.refresh_marker_path(), self.exit_marker_path())
    }
}

// =============================================================================
// Sync
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between marker polls on the terminal (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    3
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// =============================================================================
// Terminal
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSettings {
    /// `"console"` reads `tap <token>` from stdin; anything else is a
    /// device path read line by line.
    #[serde(default = "default_reader")]
    pub reader: String,

    /// How long to wait for a token (seconds).
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Wager offer and per-move deadline (seconds).
    #[serde(default = "default_wager_prompt")]
    pub wager_prompt_secs: u64,

    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

fn default_reader() -> String {
    "console".to_string()
}

fn default_read_timeout() -> u64 {
    10
}

fn default_wager_prompt() -> u64 {
    15
}

fn default_currency_symbol() -> String {
    "€".to_string()
}

impl Default for TerminalSettings {
    fn default() -> Self {
        TerminalSettings {
            reader: default_reader(),
            read_timeout_secs: default_read_timeout(),
            wager_prompt_secs: default_wager_prompt(),
            currency_symbol: default_currency_symbol(),
        }
    }
}

impl TerminalSettings {
    pub fn uses_console_reader(&self) -> bool {
        self.reader.eq_ignore_ascii_case("console")
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn wager_prompt(&self) -> Duration {
        Duration::from_secs(self.wager_prompt_secs)
    }
}

// =============================================================================
// Back Office
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackOfficeSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HMAC key for session tokens. Empty means "generate one per start",
    /// which logs everybody out on restart.
    #[serde(default)]
    pub session_secret: String,

    #[serde(default = "default_session_lifetime")]
    pub session_lifetime_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_session_lifetime() -> u64 {
    8 * 60 * 60
}

impl Default for BackOfficeSettings {
    fn default() -> Self {
        BackOfficeSettings {
            bind_addr: default_bind_addr(),
            session_secret: String::new(),
            session_lifetime_secs: default_session_lifetime(),
        }
    }
}

// =============================================================================
// Kasse Config
// =============================================================================

/// Complete deployment configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KasseConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub terminal: TerminalSettings,

    #[serde(default)]
    pub back_office: BackOfficeSettings,
}

impl KasseConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Arguments
    /// * `config_path` - Explicit file; falls back to the platform config dir
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.store.data_dir.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfig("store.data_dir must not be empty".into()));
        }

        if !(1..=MAX_POLL_INTERVAL_SECS).contains(&self.sync.poll_interval_secs) {
            return Err(SyncError::InvalidConfig(format!(
                "sync.poll_interval_secs must be between 1 and {}",
                MAX_POLL_INTERVAL_SECS
            )));
        }

        if self.terminal.reader.trim().is_empty() {
            return Err(SyncError::InvalidConfig("terminal.reader must not be empty".into()));
        }

        for (name, secs) in [
            ("terminal.read_timeout_secs", self.terminal.read_timeout_secs),
            ("terminal.wager_prompt_secs", self.terminal.wager_prompt_secs),
        ] {
            if !(1..=MAX_TERMINAL_TIMEOUT_SECS).contains(&secs) {
                return Err(SyncError::InvalidConfig(format!(
                    "{} must be between 1 and {}",
                    name, MAX_TERMINAL_TIMEOUT_SECS
                )));
            }
        }

        if self.back_office.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(SyncError::InvalidConfig(format!(
                "back_office.bind_addr is not a socket address: {}",
                self.back_office.bind_addr
            )));
        }

        if !(1..=MAX_SESSION_LIFETIME_SECS).contains(&self.back_office.session_lifetime_secs) {
            return Err(SyncError::InvalidConfig(format!(
                "back_office.session_lifetime_secs must be between 1 and {}",
                MAX_SESSION_LIFETIME_SECS
            )));
        }

        Ok(())
    }

    /// Applies `KASSE_*` overrides looked up through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("KASSE_DATA_DIR") {
            debug!(data_dir = %dir, "Overriding data dir from environment");
            self.store.data_dir = PathBuf::from(dir);
        }

        if let Some(interval) = lookup("KASSE_POLL_INTERVAL") {
            match interval.parse::<u64>() {
                Ok(secs) => self.sync.poll_interval_secs = secs,
                Err(_) => warn!(value = %interval, "Ignoring malformed KASSE_POLL_INTERVAL"),
            }
        }

        if let Some(reader) = lookup("KASSE_READER") {
            self.terminal.reader = reader;
        }

        if let Some(addr) = lookup("KASSE_BIND_ADDR") {
            debug!(bind_addr = %addr, "Overriding bind address from environment");
            self.back_office.bind_addr = addr;
        }

        if let Some(secret) = lookup("KASSE_SESSION_SECRET") {
            self.back_office.session_secret = secret;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "kasse", "kasse").map(|dirs| dirs.config_dir().join("kasse.toml"))
    }

    /// Config rooted at `data_dir` with everything else defaulted.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.store.data_dir = data_dir.into();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = KasseConfig::default();
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.terminal.read_timeout(), Duration::from_secs(10));
        assert_eq!(config.terminal.wager_prompt(), Duration::from_secs(15));
        assert!(config.terminal.uses_console_reader());
        assert_eq!(config.back_office.bind_addr, "0.0.0.0:8000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kasse.toml");
        std::fs::write(
            &path,
            "[store]\ndata_dir = \"/srv/kasse\"\n\n[terminal]\nreader = \"/dev/ttyUSB0\"\n",
        )
        .unwrap();

        let config = KasseConfig::load(Some(path)).unwrap();
        assert_eq!(config.store.database_path(), PathBuf::from("/srv/kasse/kasse.db"));
        assert_eq!(config.store.exit_marker_path(), PathBuf::from("/srv/kasse/exit.flag"));
        assert!(!config.terminal.uses_console_reader());
        assert_eq!(config.terminal.read_timeout_secs, 10);
        assert_eq!(config.sync.poll_interval_secs, 3);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("KASSE_DATA_DIR", "/tmp/k"),
            ("KASSE_POLL_INTERVAL", "5"),
            ("KASSE_BIND_ADDR", "127.0.0.1:9000"),
            ("KASSE_SESSION_SECRET", "hunter2"),
        ]
        .into_iter()
        .collect();

        let mut config = KasseConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.store.data_dir, PathBuf::from("/tmp/k"));
        assert_eq!(config.sync.poll_interval_secs, 5);
        assert_eq!(config.back_office.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.back_office.session_secret, "hunter2");
        assert_eq!(config.terminal.reader, "console");
    }

    #[test]
    fn test_config_validation() {
        let mut config = KasseConfig::with_data_dir("/srv/kasse");
        assert!(config.validate().is_ok());

        config.sync.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        config.sync.poll_interval_secs = MAX_POLL_INTERVAL_SECS + 1;
        assert!(config.validate().is_err());

        config.sync.poll_interval_secs = 3;
        config.back_office.bind_addr = "not an address".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bounds_timeouts() {
        let mut config = KasseConfig::with_data_dir("/srv/kasse");

        config.terminal.read_timeout_secs = MAX_TERMINAL_TIMEOUT_SECS;
        assert!(config.validate().is_ok());
        config.terminal.read_timeout_secs = u64::MAX;
        assert!(config.validate().is_err());
        config.terminal.read_timeout_secs = 10;

        config.terminal.wager_prompt_secs = MAX_TERMINAL_TIMEOUT_SECS + 1;
        assert!(config.validate().is_err());
        config.terminal.wager_prompt_secs = 0;
        assert!(config.validate().is_err());
        config.terminal.wager_prompt_secs = 15;

        config.back_office.session_lifetime_secs = MAX_SESSION_LIFETIME_SECS;
        assert!(config.validate().is_ok());
        config.back_office.session_lifetime_secs = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_writes_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("kasse.toml");
        let mut config = KasseConfig::with_data_dir(dir.path());
        config.terminal.currency_symbol = "CHF".into();

        config.save(Some(path.clone())).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[back_office]"));
        assert!(contents.contains("CHF"));
    }
}
