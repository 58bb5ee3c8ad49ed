//! In-process remote host
//!
//! [`MemoryRemote`] keeps a `/`-separated tree in memory and hands out
//! sessions through [`MemoryConnector`]. It follows the SFTP primitives
//! closely enough to exercise [`SftpBackend`](crate::SftpBackend) without a
//! network: uploads need an existing parent, renames refuse to overwrite, and
//! sessions die when the host drops them.
//!
//! ```rust
//! use mirsync_transfer::{MemoryRemote, SftpBackend, TransferBackend};
//! use mirsync_types::FileEvent;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> mirsync_types::Result<()> {
//! let remote = MemoryRemote::new();
//! remote.mkdir("/srv/www");
//!
//! let backend = SftpBackend::new(
//!     "/home/me/site",
//!     "/srv/www",
//!     Arc::new(remote.connector()),
//!     Duration::from_secs(300),
//! );
//! backend.apply(&FileEvent::DirCreated("/home/me/site/img".into())).await?;
//! # Ok(())
//! # }
//! ```

use crate::remote::{RemoteConnector, RemoteEntry, RemoteSession};
use async_trait::async_trait;
use mirsync_types::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug)]
struct HostState {
    nodes: BTreeMap<String, Node>,
    reachable: bool,
    connects: usize,
    epoch: u64,
}

impl HostState {
    fn entry(&self, path: &str) -> Option<&Node> {
        if path == "/" {
            return Some(&Node::Dir);
        }
        self.nodes.get(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        matches!(self.entry(path), Some(Node::Dir))
    }

    fn make_dirs(&mut self, path: &str) -> Result<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            match self.nodes.get(&current) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => {
                    return Err(Error::execution(format!("{current} is not a directory")));
                }
                None => {
                    self.nodes.insert(current.clone(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn subtree(&self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        self.nodes
            .keys()
            .filter(|key| *key == path || key.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

/// Remote file tree living in memory; clones share the same host
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<HostState>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// Empty, reachable host
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                nodes: BTreeMap::new(),
                reachable: true,
                connects: 0,
                epoch: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connector opening sessions on this host
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            remote: self.clone(),
        }
    }

    /// Create a directory and its parents
    pub fn mkdir(&self, path: &str) {
        // Only fails when a file is in the way, which callers set up themselves
        let _ = self.lock().make_dirs(path);
    }

    /// Write a file, creating its parents
    pub fn put(&self, path: &str, contents: &[u8]) {
        let mut state = self.lock();
        let _ = state.make_dirs(parent(path));
        state.nodes.insert(path.to_string(), Node::File(contents.to_vec()));
    }

    /// Contents of the file at `path`
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().entry(path) {
            Some(Node::File(contents)) => Some(contents.clone()),
            _ => None,
        }
    }

    /// Whether `path` is a directory
    pub fn is_dir(&self, path: &str) -> bool {
        self.lock().is_dir(path)
    }

    /// Whether anything exists at `path`
    pub fn exists(&self, path: &str) -> bool {
        self.lock().entry(path).is_some()
    }

    /// Number of successful connects so far
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Refuse (or accept again) new connections
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Kill every open session, as a host restart would
    pub fn drop_sessions(&self) {
        self.lock().epoch += 1;
    }
}

/// Opens [`MemorySession`]s on a [`MemoryRemote`]
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    remote: MemoryRemote,
}

#[async_trait]
impl RemoteConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        let mut state = self.remote.lock();
        if !state.reachable {
            return Err(Error::connectivity("memory host is unreachable"));
        }
        state.connects += 1;
        Ok(Box::new(MemorySession {
            remote: self.remote.clone(),
            epoch: state.epoch,
            closed: AtomicBool::new(false),
        }))
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

/// Session on a [`MemoryRemote`]
#[derive(Debug)]
pub struct MemorySession {
    remote: MemoryRemote,
    epoch: u64,
    closed: AtomicBool,
}

impl MemorySession {
    fn host(&self) -> Result<MutexGuard<'_, HostState>> {
        let state = self.remote.lock();
        if self.closed.load(Ordering::SeqCst) || state.epoch != self.epoch {
            return Err(Error::connectivity("session is closed"));
        }
        Ok(state)
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn ping(&self) -> Result<()> {
        self.host().map(drop)
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteEntry>> {
        Ok(self.host()?.entry(path).map(|node| match node {
            Node::Dir => RemoteEntry::Dir,
            Node::File(_) => RemoteEntry::File,
        }))
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        self.host()?;
        let contents = tokio::fs::read(local)
            .await
            .map_err(|e| Error::execution(format!("read {}: {}", local.display(), e)))?;

        let mut state = self.host()?;
        if !state.is_dir(parent(remote)) {
            return Err(Error::execution(format!("{remote}: no such file")));
        }
        if state.is_dir(remote) {
            return Err(Error::execution(format!("{remote}: is a directory")));
        }
        state.nodes.insert(remote.to_string(), Node::File(contents));
        Ok(())
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        self.host()?.make_dirs(path)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let mut state = self.host()?;
        match state.entry(path) {
            Some(Node::File(_)) => {
                state.nodes.remove(path);
                Ok(())
            }
            _ => Err(Error::execution(format!("{path}: no such file"))),
        }
    }

    async fn remove_dir_all(&self, path: &str) -> Result<()> {
        let mut state = self.host()?;
        if !state.is_dir(path) || path == "/" {
            return Err(Error::execution(format!("{path}: cannot remove directory")));
        }
        for key in state.subtree(path) {
            state.nodes.remove(&key);
        }
        Ok(())
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let mut state = self.host()?;
        if state.entry(src).is_none() {
            return Err(Error::execution(format!("{src}: no such file")));
        }
        if state.entry(dst).is_some() {
            return Err(Error::execution(format!("{dst}: already exists")));
        }
        if !state.is_dir(parent(dst)) {
            return Err(Error::execution(format!("{dst}: no such directory")));
        }

        for key in state.subtree(src) {
            if let Some(node) = state.nodes.remove(&key) {
                let moved = format!("{dst}{}", &key[src.len()..]);
                state.nodes.insert(moved, node);
            }
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
