//! Error types for configuration management

use mirsync_types::Error as MirsyncError;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading or writing a configuration file
    #[error("I/O error on config file '{path}': {source}")]
    Io {
        /// Path to the configuration file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Configuration file parsing error
    #[error("Failed to parse config file '{path}': {message}")]
    Parse {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    Validation {
        /// Validation error message
        message: String,
    },

    /// No secret is stored for the (user, host) pair
    #[error("No password stored for {user}@{host}")]
    SecretNotFound {
        /// Account name
        user: String,
        /// Server name
        host: String,
    },

    /// Secret store rejected the operation
    #[error("Secret store error: {message}")]
    Secret {
        /// Error message
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Generic configuration error
    #[error("Configuration error: {message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(error: config::ConfigError) -> Self {
        Self::Other {
            message: error.to_string(),
        }
    }
}

impl From<ConfigError> for MirsyncError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::SecretNotFound { .. } | ConfigError::Secret { .. } => {
                MirsyncError::secret(error.to_string())
            }
            other => MirsyncError::config(other.to_string()),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new secret store error
    pub fn secret<S: Into<String>>(message: S) -> Self {
        Self::Secret {
            message: message.into(),
        }
    }

    /// Create a new missing secret error
    pub fn secret_not_found(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self::SecretNotFound {
            user: user.into(),
            host: host.into(),
        }
    }

    /// Create a new other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether the error reports a missing secret
    pub fn is_secret_not_found(&self) -> bool {
        matches!(self, Self::SecretNotFound { .. })
    }
}
