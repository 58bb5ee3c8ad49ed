//! Endpoint descriptions for sync sources and destinations

use crate::{ConfigResult, SecretStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default SSH port
pub const DEFAULT_SFTP_PORT: u16 = 22;

/// Discriminant of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Local directory
    Local,
    /// Remote directory reached over SFTP
    Sftp,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Sftp => f.write_str("sftp"),
        }
    }
}

/// One end of a sync item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Connection {
    /// Local directory
    Local(LocalConnection),
    /// SFTP server directory
    Sftp(SftpConnection),
}

impl Connection {
    /// Local connection rooted at `path`
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local(LocalConnection::new(path))
    }

    /// Kind of endpoint
    pub fn connection_type(&self) -> ConnectionType {
        match self {
            Self::Local(_) => ConnectionType::Local,
            Self::Sftp(_) => ConnectionType::Sftp,
        }
    }

    /// Drop any credential this endpoint keeps in `secrets`
    pub fn forget_secret(&self, secrets: &dyn SecretStore) -> ConfigResult<()> {
        match self {
            Self::Local(_) => Ok(()),
            Self::Sftp(sftp) => sftp.forget_secret(secrets),
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(local) => write!(f, "{}", local.path.display()),
            Self::Sftp(sftp) => write!(f, "sftp://{}@{}:{}{}", sftp.user, sftp.host, sftp.port(), sftp.path),
        }
    }
}

/// A local directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConnection {
    /// Absolute directory path
    pub path: PathBuf,
}

impl LocalConnection {
    /// Create a local connection
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// How to authenticate against an SFTP server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SftpAuthentication {
    /// Password authentication. The value is held in memory only and is
    /// persisted through a [`SecretStore`].
    Password {
        /// Password, empty until resolved from the secret store
        #[serde(skip, default)]
        value: String,
    },
    /// Private key authentication
    Key {
        /// Path to the private key file
        path: PathBuf,
    },
}

impl fmt::Debug for SftpAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { .. } => f.debug_struct("Password").field("value", &"<redacted>").finish(),
            Self::Key { path } => f.debug_struct("Key").field("path", path).finish(),
        }
    }
}

/// A directory on an SFTP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SftpConnection {
    path: String,
    host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    user: String,
    authentication: SftpAuthentication,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fingerprints: Option<Vec<String>>,
}

impl SftpConnection {
    /// Connection using a new password, which is written to `secrets`,
    /// replacing any password already stored for `(user, host)`
    pub fn with_password(
        path: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        user: impl Into<String>,
        password: impl Into<String>,
        secrets: &dyn SecretStore,
    ) -> ConfigResult<Self> {
        let value = password.into();
        let connection = Self::unauthenticated(path, host, port, user, SftpAuthentication::Password {
            value: value.clone(),
        });
        secrets.upsert(&connection.user, &connection.host, &value)?;
        Ok(connection)
    }

    /// Connection using the password already stored for `(user, host)`
    pub fn with_stored_password(
        path: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        user: impl Into<String>,
        secrets: &dyn SecretStore,
    ) -> ConfigResult<Self> {
        let mut connection = Self::unauthenticated(path, host, port, user, SftpAuthentication::Password {
            value: String::new(),
        });
        connection.resolve_password(secrets)?;
        Ok(connection)
    }

    /// Connection using a private key file
    pub fn with_key(
        path: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        user: impl Into<String>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self::unauthenticated(path, host, port, user, SftpAuthentication::Key {
            path: key_path.into(),
        })
    }

    fn unauthenticated(
        path: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        user: impl Into<String>,
        authentication: SftpAuthentication,
    ) -> Self {
        Self {
            path: path.into(),
            host: host.into(),
            port,
            user: user.into(),
            authentication,
            fingerprints: None,
        }
    }

    /// Remote root directory
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Server name
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port, 22 unless overridden
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SFTP_PORT)
    }

    /// Account name
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Authentication method
    pub fn authentication(&self) -> &SftpAuthentication {
        &self.authentication
    }

    /// In-memory password, `None` under key authentication
    pub fn password(&self) -> Option<&str> {
        match &self.authentication {
            SftpAuthentication::Password { value } => Some(value),
            SftpAuthentication::Key { .. } => None,
        }
    }

    /// Private key path, `None` under password authentication
    pub fn key_path(&self) -> Option<&Path> {
        match &self.authentication {
            SftpAuthentication::Key { path } => Some(path),
            SftpAuthentication::Password { .. } => None,
        }
    }

    /// Accepted server key fingerprints. `None` accepts any key.
    pub fn fingerprints(&self) -> Option<&[String]> {
        self.fingerprints.as_deref()
    }

    /// Change the remote root directory
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Change the server port
    pub fn set_port(&mut self, port: Option<u16>) {
        self.port = port;
    }

    /// Restrict accepted server keys
    pub fn set_fingerprints(&mut self, fingerprints: Option<Vec<String>>) {
        self.fingerprints = fingerprints;
    }

    /// Switch authentication method.
    ///
    /// A password is upserted into `secrets`. A key deletes the stored password.
    pub fn set_authentication(
        &mut self,
        authentication: SftpAuthentication,
        secrets: &dyn SecretStore,
    ) -> ConfigResult<()> {
        match &authentication {
            SftpAuthentication::Password { value } => secrets.upsert(&self.user, &self.host, value)?,
            SftpAuthentication::Key { .. } => secrets.delete(&self.user, &self.host)?,
        }
        self.authentication = authentication;
        Ok(())
    }

    /// Change the account name, moving the stored password along
    pub fn set_user(&mut self, user: impl Into<String>, secrets: &dyn SecretStore) -> ConfigResult<()> {
        let user = user.into();
        if self.password().is_some() {
            secrets.update(&self.user, &self.host, Some(&user), None, None)?;
        }
        self.user = user;
        Ok(())
    }

    /// Change the server name, moving the stored password along
    pub fn set_host(&mut self, host: impl Into<String>, secrets: &dyn SecretStore) -> ConfigResult<()> {
        let host = host.into();
        if self.password().is_some() {
            secrets.update(&self.user, &self.host, None, Some(&host), None)?;
        }
        self.host = host;
        Ok(())
    }

    /// Load the in-memory password from `secrets`. No-op under key authentication.
    pub fn resolve_password(&mut self, secrets: &dyn SecretStore) -> ConfigResult<()> {
        if let SftpAuthentication::Password { value } = &mut self.authentication {
            *value = secrets.get(&self.user, &self.host)?;
        }
        Ok(())
    }

    /// Delete the stored password, if any
    pub fn forget_secret(&self, secrets: &dyn SecretStore) -> ConfigResult<()> {
        if self.password().is_some() {
            secrets.delete(&self.user, &self.host)?;
        }
        Ok(())
    }
}
