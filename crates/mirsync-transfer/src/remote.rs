//! Remote protocol client seam
//!
//! [`SftpBackend`](crate::SftpBackend) drives the session lifecycle and the
//! event semantics; the primitives below are all it needs from a transport.
//! Every error returned here must already be classified: transport and
//! authentication failures as [`Error::Connectivity`](mirsync_types::Error),
//! everything else as [`Error::Execution`](mirsync_types::Error).

use async_trait::async_trait;
use mirsync_types::Result;
use std::path::Path;

/// Kind of an existing remote entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEntry {
    /// Regular file (or anything that is not a directory)
    File,
    /// Directory
    Dir,
}

/// Opens authenticated sessions to one remote endpoint
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Connect, authenticate and open a file sub-session
    async fn connect(&self) -> Result<Box<dyn RemoteSession>>;

    /// Human readable endpoint, for logs
    fn endpoint(&self) -> String;
}

/// A live authenticated file session
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Round trip proving the session is usable
    async fn ping(&self) -> Result<()>;

    /// Kind of the entry at `path`, `None` if absent
    async fn stat(&self, path: &str) -> Result<Option<RemoteEntry>>;

    /// Write the local file at `local` to `remote`, replacing it
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()>;

    /// Create `path` and its missing parents; existing directories are fine
    async fn create_dir_all(&self, path: &str) -> Result<()>;

    /// Delete one file
    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Delete a directory and everything below it
    async fn remove_dir_all(&self, path: &str) -> Result<()>;

    /// Move `src` to `dst`
    async fn rename(&self, src: &str, dst: &str) -> Result<()>;

    /// Close the session and its transport
    async fn close(&self);
}
