//! Error types and handling for mirsync
//!
//! Every failure that crosses a crate boundary is expressed as an [`Error`].
//! The variants follow the sync engine's taxonomy: authorization failures from
//! the path guard, connectivity and execution failures from transfer backends,
//! initialization failures from the orchestrator, and watch failures from the
//! file event reconciler.

use std::path::PathBuf;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Low severity - operation can continue
    Low,
    /// Medium severity - the failing call is aborted, the item may be restarted
    Medium,
    /// High severity - the failing call is aborted and must not be retried as is
    High,
    /// Critical severity - the item cannot run at all
    Critical,
}

/// Main error type for mirsync operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// A destination path lies outside the authorized root or contains a traversal segment
    #[error("Operating on unauthorized path '{path}': only operations below '{root}' are allowed")]
    Unauthorized {
        /// Offending path
        path: PathBuf,
        /// Authorized root
        root: PathBuf,
    },

    /// Transport or authentication failure
    #[error("Connectivity error: {message}")]
    Connectivity {
        /// Error message describing the connectivity issue
        message: String,
    },

    /// Remote or local operation failed for a reason unrelated to connectivity
    #[error("Execution error: {message}")]
    Execution {
        /// Error message describing the failed operation
        message: String,
    },

    /// A backend or reconciler could not be constructed
    #[error("Initialization error: {message}")]
    Initialization {
        /// Error message describing the initialization issue
        message: String,
    },

    /// A configuration with the same identifier is already registered
    #[error("Configuration {id} is already registered")]
    Duplicate {
        /// Identifier of the duplicate configuration
        id: String,
    },

    /// No configuration or item exists for the identifier
    #[error("No configuration found for id {id}")]
    NotFound {
        /// Identifier that was looked up
        id: String,
    },

    /// The notification source failed or finished unexpectedly
    #[error("Watch error: {message}")]
    Watch {
        /// Error message describing the watch failure
        message: String,
    },

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Secret store error
    #[error("Secret store error: {message}")]
    Secret {
        /// Error message describing the secret store issue
        message: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Path guard rejection
    Authorization,
    /// Transport or authentication failure
    Connectivity,
    /// Operation failure unrelated to connectivity
    Execution,
    /// Construction failure (unsupported variant, missing credential, duplicate id)
    Initialization,
    /// Notification source failure
    Watch,
    /// I/O related errors
    Io,
    /// Configuration and secret store errors
    Config,
    /// Lookup of an unknown identifier
    NotFound,
    /// Cancellation
    Cancelled,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::Authorization,
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Initialization { .. } | Self::Duplicate { .. } => ErrorKind::Initialization,
            Self::Watch { .. } => ErrorKind::Watch,
            Self::Io { .. } => ErrorKind::Io,
            Self::Config { .. } | Self::Secret { .. } => ErrorKind::Config,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Unauthorized { .. } => ErrorSeverity::High,
            Self::Connectivity { .. } => ErrorSeverity::Medium,
            Self::Execution { .. } => ErrorSeverity::Medium,
            Self::Initialization { .. } | Self::Duplicate { .. } => ErrorSeverity::Critical,
            Self::Watch { .. } => ErrorSeverity::High,
            Self::Io { .. } => ErrorSeverity::Medium,
            Self::Config { .. } | Self::Secret { .. } => ErrorSeverity::High,
            Self::NotFound { .. } => ErrorSeverity::Low,
            Self::Cancelled => ErrorSeverity::Low,
        }
    }

    /// Whether the failure invalidates the remote session.
    ///
    /// Backends tear their session down on connectivity failures so that the
    /// next call reconnects from scratch.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Create a new connectivity error
    pub fn connectivity<S: Into<String>>(message: S) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    /// Create a new execution error
    pub fn execution<S: Into<String>>(message: S) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create a new initialization error
    pub fn initialization<S: Into<String>>(message: S) -> Self {
        Self::Initialization {
            message: message.into(),
        }
    }

    /// Create a new watch error
    pub fn watch<S: Into<String>>(message: S) -> Self {
        Self::Watch {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new secret store error
    pub fn secret<S: Into<String>>(message: S) -> Self {
        Self::Secret {
            message: message.into(),
        }
    }

    /// Create a new unauthorized path error
    pub fn unauthorized(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self::Unauthorized {
            path: path.into(),
            root: root.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    proptest! {
        #[test]
        fn test_error_kind_consistency(message in ".*") {
            let errors = vec![
                Error::connectivity(message.clone()),
                Error::execution(message.clone()),
                Error::initialization(message.clone()),
                Error::watch(message.clone()),
                Error::config(message.clone()),
                Error::secret(message.clone()),
            ];

            for error in errors {
                let kind = error.kind();
                match error {
                    Error::Connectivity { .. } => prop_assert_eq!(kind, ErrorKind::Connectivity),
                    Error::Execution { .. } => prop_assert_eq!(kind, ErrorKind::Execution),
                    Error::Initialization { .. } => prop_assert_eq!(kind, ErrorKind::Initialization),
                    Error::Watch { .. } => prop_assert_eq!(kind, ErrorKind::Watch),
                    Error::Config { .. } | Error::Secret { .. } => prop_assert_eq!(kind, ErrorKind::Config),
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Medium);
        assert!(ErrorSeverity::Medium < ErrorSeverity::High);
        assert!(ErrorSeverity::High < ErrorSeverity::Critical);
    }

    #[rstest]
    #[case(Error::connectivity("refused"), true)]
    #[case(Error::execution("no such file"), false)]
    #[case(Error::unauthorized("/etc/passwd", "/srv/mirror"), false)]
    #[case(Error::Cancelled, false)]
    fn test_is_connectivity(#[case] error: Error, #[case] expected: bool) {
        assert_eq!(error.is_connectivity(), expected);
    }

    #[test]
    fn test_unauthorized_message_names_path_and_root() {
        let error = Error::unauthorized("/srv/mirror/../etc", "/srv/mirror");
        assert_eq!(error.kind(), ErrorKind::Authorization);
        assert_eq!(error.severity(), ErrorSeverity::High);
        let text = error.to_string();
        assert!(text.contains("/srv/mirror/../etc"));
        assert!(text.contains("only operations below '/srv/mirror'"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "test file");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("test file"));
    }

    #[test]
    fn test_duplicate_is_initialization() {
        let error = Error::Duplicate { id: "abc".to_string() };
        assert_eq!(error.kind(), ErrorKind::Initialization);
        assert_eq!(error.severity(), ErrorSeverity::Critical);
    }
}
