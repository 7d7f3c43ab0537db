//! # Sync Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────────────┐        ┌─────────────────────────────┐    │
//! │  │  Configuration          │        │  Markers                    │    │
//! │  │                         │        │                             │    │
//! │  │  InvalidConfig          │        │  MarkerIo { path, source }  │    │
//! │  │  ConfigLoadFailed       │        │                             │    │
//! │  │  ConfigSaveFailed       │        │                             │    │
//! │  └─────────────────────────┘        └─────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// A loaded value failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to write the config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Marker Errors
    // =========================================================================
    /// A marker file could not be touched, read or removed.
    #[error("Marker {path} failed: {source}")]
    MarkerIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub(crate) fn marker(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::MarkerIo {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_) | SyncError::ConfigLoadFailed(_) | SyncError::ConfigSaveFailed(_)
        )
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}
