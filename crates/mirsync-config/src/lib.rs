//! Configuration management for mirsync
//!
//! This crate holds everything a sync item is described by and everything the
//! engine is tuned by:
//!
//! - **Sync configurations**: a [`Configuration`] pairs a local source with a
//!   [`Connection`] destination (local directory or SFTP server)
//! - **Credentials**: SFTP passwords live in a [`SecretStore`] keyed by
//!   `(user, host)` and are never written to the configuration store
//! - **Persistence**: [`ConfigurationStore`] implementations keep configurations
//!   across runs, [`ConfigurationManager`] is the CRUD front end
//! - **Settings**: engine tunables and logging, layered from defaults, files and
//!   `MIRSYNC__*` environment variables
//!
//! # Examples
//!
//! ```rust
//! use mirsync_config::SettingsBuilder;
//!
//! let settings = SettingsBuilder::new()
//!     .add_env_prefix("MIRSYNC")
//!     .build()
//!     .expect("Failed to load settings");
//!
//! println!("Rename window: {:?}", settings.engine.rename_window());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod configuration;
pub mod connection;
pub mod error;
pub mod loader;
pub mod manager;
pub mod secret;
pub mod store;

pub use builder::SettingsBuilder;
pub use configuration::Configuration;
pub use connection::{Connection, ConnectionType, LocalConnection, SftpAuthentication, SftpConnection};
pub use error::{ConfigError, ConfigResult};
pub use loader::SettingsLoader;
pub use manager::ConfigurationManager;
pub use secret::{MemorySecretStore, SecretStore};
pub use store::{ConfigurationStore, FileConfigurationStore, MemoryConfigurationStore};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Sync engine tunables
    #[serde(default)]
    pub engine: EngineSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Configuration store location
    #[serde(default)]
    pub store: StoreConfig,
}

/// Sync engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// How long a vanished path waits for its matching "appeared" half
    pub rename_window_ms: u64,
    /// Idle time after which a remote session is closed
    pub idle_timeout_secs: u64,
    /// Upload the whole source tree when an item starts
    pub initial_upload: bool,
    /// Capacity of the per-item event channel
    pub event_buffer: usize,
}

impl EngineSettings {
    /// Rename disambiguation window
    pub fn rename_window(&self) -> Duration {
        Duration::from_millis(self.rename_window_ms)
    }

    /// Remote session idle timeout
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            rename_window_ms: 50,
            idle_timeout_secs: 300, // 5 minutes
            initial_upload: false,
            event_buffer: 1024,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// File holding the persisted sync configurations
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mirsync-configurations.yaml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.engine.rename_window(), Duration::from_millis(50));
        assert_eq!(settings.engine.idle_timeout(), Duration::from_secs(300));
        assert!(!settings.engine.initial_upload);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let settings: Settings = serde_yaml::from_str("engine:\n  rename_window_ms: 80\n  idle_timeout_secs: 10\n  initial_upload: true\n  event_buffer: 16\n").unwrap();
        assert_eq!(settings.engine.rename_window_ms, 80);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.store.path, PathBuf::from("mirsync-configurations.yaml"));
    }
}
