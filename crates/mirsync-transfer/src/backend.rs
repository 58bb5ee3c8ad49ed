//! Destination side of a sync item

use crate::local::LocalBackend;
use crate::russh_client::RusshConnector;
use crate::sftp::{SftpBackend, DEFAULT_IDLE_TIMEOUT};
use async_trait::async_trait;
use mirsync_config::{Configuration, Connection};
use mirsync_types::{ConnectionStatus, Error, FileEvent, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Applies file events at a destination.
///
/// All paths passed in are source paths below the item's watched root; the
/// backend maps them into destination space and authorizes the result
/// before touching anything.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Establish the destination session ahead of the first mutation
    async fn connect(&self) -> Result<()>;

    /// Copy a file, or create a directory if absent
    async fn upload(&self, path: &Path, is_dir: bool) -> Result<()>;

    /// Delete a file, or a directory recursively; absent paths are fine
    async fn remove(&self, path: &Path, is_dir: bool) -> Result<()>;

    /// Move `src` to `dst` at the destination
    async fn rename(&self, src: &Path, dst: &Path) -> Result<()>;

    /// Release the destination session
    async fn terminate(&self);

    /// Connectivity signal
    fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus>;

    /// Apply one event
    async fn apply(&self, event: &FileEvent) -> Result<()> {
        match event {
            FileEvent::FileCreated(path) => self.upload(path, false).await,
            FileEvent::DirCreated(path) => self.upload(path, true).await,
            FileEvent::FileRemoved(path) => self.remove(path, false).await,
            FileEvent::DirRemoved(path) => self.remove(path, true).await,
            FileEvent::Renamed { src, dst } => self.rename(src, dst).await,
        }
    }
}

/// Tunables passed to every backend a factory builds
#[derive(Debug, Clone, Copy)]
pub struct BackendOptions {
    /// Idle time after which a remote session is closed
    pub idle_timeout: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Builds the backend matching a configuration's destination
pub trait BackendFactory: Send + Sync {
    /// Create a backend; fails with an initialization error on unsupported
    /// endpoints or missing credentials
    fn create(&self, configuration: &Configuration, options: &BackendOptions) -> Result<Arc<dyn TransferBackend>>;
}

/// Factory keyed on the destination connection variant
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, configuration: &Configuration, options: &BackendOptions) -> Result<Arc<dyn TransferBackend>> {
        let source_root = source_root(configuration)?;
        match &configuration.destination {
            Connection::Local(local) => Ok(Arc::new(LocalBackend::new(source_root, &local.path))),
            Connection::Sftp(sftp) => {
                let connector = RusshConnector::from_connection(sftp)?;
                Ok(Arc::new(SftpBackend::new(
                    source_root,
                    sftp.path(),
                    Arc::new(connector),
                    options.idle_timeout,
                )))
            }
        }
    }
}

/// Watched root of a configuration; only local sources can be watched
pub fn source_root(configuration: &Configuration) -> Result<PathBuf> {
    match &configuration.source {
        Connection::Local(local) => Ok(local.path.clone()),
        other => Err(Error::initialization(format!(
            "unsupported source type {} for configuration {}",
            other.connection_type(),
            configuration.id()
        ))),
    }
}
