//! SSH/SFTP transport on russh and russh-sftp

use crate::remote::{RemoteConnector, RemoteEntry, RemoteSession};
use async_trait::async_trait;
use mirsync_config::{SftpAuthentication, SftpConnection};
use mirsync_types::{Error, Result};
use russh::client::{AuthResult, Handle, Handler};
use russh::keys::{PrivateKeyWithHashAlg, PublicKeyBase64};
use russh::Disconnect;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Client side of the SSH handshake; checks the server key against an
/// optional allow-list
pub(crate) struct ClientHandler {
    endpoint: String,
    fingerprints: Option<Vec<String>>,
}

impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let fingerprint = server_public_key
            .fingerprint(russh::keys::HashAlg::Sha256)
            .to_string();
        let Some(allowed) = &self.fingerprints else {
            info!("Accepting host key {} of {}", fingerprint, self.endpoint);
            return Ok(true);
        };

        let encoded = server_public_key.public_key_base64();
        let accepted = allowed
            .iter()
            .any(|candidate| *candidate == fingerprint || *candidate == encoded);
        if !accepted {
            warn!("Host key {} of {} is not in the allow-list", fingerprint, self.endpoint);
        }
        Ok(accepted)
    }
}

#[derive(Clone)]
enum Credentials {
    Password(String),
    Key(PathBuf),
}

/// Opens SFTP sessions to the host described by an [`SftpConnection`]
#[derive(Clone)]
pub struct RusshConnector {
    host: String,
    port: u16,
    user: String,
    credentials: Credentials,
    fingerprints: Option<Vec<String>>,
}

impl std::fmt::Debug for RusshConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshConnector")
            .field("endpoint", &self.endpoint())
            .field("fingerprints", &self.fingerprints)
            .finish_non_exhaustive()
    }
}

impl RusshConnector {
    /// Connector for `connection`. A password-authenticated descriptor must
    /// carry its resolved password; key files are read at connect time.
    pub fn from_connection(connection: &SftpConnection) -> Result<Self> {
        let credentials = match connection.authentication() {
            SftpAuthentication::Password { .. } => match connection.password() {
                Some(password) if !password.is_empty() => Credentials::Password(password.to_string()),
                _ => {
                    return Err(Error::initialization(format!(
                        "no password available for {}@{}",
                        connection.user(),
                        connection.host()
                    )))
                }
            },
            SftpAuthentication::Key { path } => Credentials::Key(path.clone()),
        };

        Ok(Self {
            host: connection.host().to_string(),
            port: connection.port(),
            user: connection.user().to_string(),
            credentials,
            fingerprints: connection.fingerprints().map(<[String]>::to_vec),
        })
    }

    async fn authenticate(&self, handle: &mut Handle<ClientHandler>) -> Result<()> {
        let result = match &self.credentials {
            Credentials::Password(password) => handle
                .authenticate_password(self.user.as_str(), password.as_str())
                .await
                .map_err(|e| Error::connectivity(format!("password authentication: {e}")))?,
            Credentials::Key(path) => {
                let key = russh::keys::load_secret_key(path, None).map_err(|e| {
                    Error::connectivity(format!("cannot load key {}: {}", path.display(), e))
                })?;
                let hash = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(|e| Error::connectivity(e.to_string()))?
                    .flatten();
                handle
                    .authenticate_publickey(
                        self.user.as_str(),
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash),
                    )
                    .await
                    .map_err(|e| Error::connectivity(format!("key authentication: {e}")))?
            }
        };

        match result {
            AuthResult::Success => Ok(()),
            AuthResult::Failure {
                remaining_methods, ..
            } => Err(Error::connectivity(format!(
                "authentication of {} rejected, remaining methods: {:?}",
                self.endpoint(),
                remaining_methods
            ))),
        }
    }
}

#[async_trait]
impl RemoteConnector for RusshConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        let endpoint = self.endpoint();
        debug!("Connecting to {}", endpoint);

        let handler = ClientHandler {
            endpoint: endpoint.clone(),
            fingerprints: self.fingerprints.clone(),
        };
        let config = Arc::new(russh::client::Config::default());
        let mut handle = russh::client::connect(config, (self.host.as_str(), self.port), handler)
            .await
            .map_err(|e| Error::connectivity(format!("cannot reach {endpoint}: {e}")))?;

        self.authenticate(&mut handle).await?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| Error::connectivity(format!("cannot open channel: {e}")))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| Error::connectivity(format!("sftp subsystem refused: {e}")))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| classify(&e, "sftp handshake"))?;

        Ok(Box::new(RusshSession { handle, sftp }))
    }

    fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Maps SFTP failures onto the connectivity/execution split
fn classify(error: &SftpError, context: &str) -> Error {
    match error {
        SftpError::Status(status)
            if matches!(
                status.status_code,
                StatusCode::NoConnection | StatusCode::ConnectionLost
            ) =>
        {
            Error::connectivity(format!("{context}: {error}"))
        }
        SftpError::IO(_) | SftpError::Timeout => Error::connectivity(format!("{context}: {error}")),
        _ => Error::execution(format!("{context}: {error}")),
    }
}

fn is_missing(error: &SftpError) -> bool {
    matches!(error, SftpError::Status(status) if status.status_code == StatusCode::NoSuchFile)
}

fn join(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

/// Authenticated SSH connection with an open SFTP channel
pub struct RusshSession {
    handle: Handle<ClientHandler>,
    sftp: SftpSession,
}

#[async_trait]
impl RemoteSession for RusshSession {
    async fn ping(&self) -> Result<()> {
        if self.handle.is_closed() {
            return Err(Error::connectivity("transport closed"));
        }
        self.sftp
            .metadata(".")
            .await
            .map(drop)
            .map_err(|e| classify(&e, "ping"))
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteEntry>> {
        match self.sftp.metadata(path).await {
            Ok(metadata) if metadata.is_dir() => Ok(Some(RemoteEntry::Dir)),
            Ok(_) => Ok(Some(RemoteEntry::File)),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(classify(&e, &format!("stat {path}"))),
        }
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let mut reader = tokio::fs::File::open(local)
            .await
            .map_err(|e| Error::execution(format!("open {}: {}", local.display(), e)))?;
        let mut file = self
            .sftp
            .create(remote)
            .await
            .map_err(|e| classify(&e, &format!("create {remote}")))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| Error::connectivity(format!("write {remote}: {e}")))?;
        file.shutdown()
            .await
            .map_err(|e| Error::connectivity(format!("close {remote}: {e}")))?;
        Ok(())
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = if current.is_empty() && !path.starts_with('/') {
                segment.to_string()
            } else {
                join(&current, segment)
            };

            match self.stat(&current).await? {
                Some(RemoteEntry::Dir) => continue,
                Some(RemoteEntry::File) => {
                    return Err(Error::execution(format!("{current} is not a directory")));
                }
                None => {}
            }
            if let Err(e) = self.sftp.create_dir(current.as_str()).await {
                // lost a race with another writer
                if self.stat(&current).await? != Some(RemoteEntry::Dir) {
                    return Err(classify(&e, &format!("mkdir {current}")));
                }
            }
        }
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| classify(&e, &format!("remove {path}")))
    }

    async fn remove_dir_all(&self, path: &str) -> Result<()> {
        // depth first, directories removed after their contents
        let mut stack = vec![(path.to_string(), false)];
        while let Some((dir, visited)) = stack.pop() {
            if visited {
                match self.sftp.remove_dir(dir.as_str()).await {
                    Err(e) if !is_missing(&e) => {
                        return Err(classify(&e, &format!("rmdir {dir}")));
                    }
                    _ => continue,
                }
            }

            let entries = match self.sftp.read_dir(dir.as_str()).await {
                Ok(entries) => entries,
                Err(e) if is_missing(&e) => continue,
                Err(e) => return Err(classify(&e, &format!("list {dir}"))),
            };
            stack.push((dir.clone(), true));
            for entry in entries {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    continue;
                }
                let child = join(&dir, &name);
                if entry.metadata().is_dir() {
                    stack.push((child, false));
                } else if let Err(e) = self.sftp.remove_file(child.as_str()).await {
                    if !is_missing(&e) {
                        return Err(classify(&e, &format!("remove {child}")));
                    }
                }
            }
        }
        Ok(())
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.sftp
            .rename(src, dst)
            .await
            .map_err(|e| classify(&e, &format!("rename {src} to {dst}")))
    }

    async fn close(&self) {
        if let Err(e) = self.sftp.close().await {
            debug!("Closing sftp channel: {}", e);
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("Disconnecting: {}", e);
        }
    }
}
