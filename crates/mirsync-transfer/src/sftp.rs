//! Destination on a remote host, with an idle-disconnect session lifecycle
//!
//! Every mutating call first makes sure a live session exists, probing any
//! cached session with a round trip instead of trusting it. Each call also
//! re-arms an idle timer; when it fires with no activity in between, the
//! session is closed and `Disconnected` is signalled. The next call simply
//! reconnects.
//!
//! Connectivity failures drop the session so the next call starts from a
//! clean connect. Execution failures keep it.

use crate::backend::TransferBackend;
use crate::guard::PathGuard;
use crate::mapper::PathMapper;
use crate::remote::{RemoteConnector, RemoteEntry, RemoteSession};
use async_trait::async_trait;
use mirsync_types::{ConnectionStatus, Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default idle time before a remote session is closed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

// A graceful close over a dead link must not hold up teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct SessionSlot {
    session: Option<Box<dyn RemoteSession>>,
}

struct Inner {
    mapper: PathMapper,
    destination_root: String,
    guard: PathGuard,
    connector: Arc<dyn RemoteConnector>,
    idle_timeout: Duration,
    slot: Mutex<SessionSlot>,
    status: watch::Sender<ConnectionStatus>,
    activity: AtomicU64,
    idle_timer: StdMutex<Option<JoinHandle<()>>>,
}

/// Mirrors events onto a remote directory through a [`RemoteConnector`]
#[derive(Clone)]
pub struct SftpBackend {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SftpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpBackend")
            .field("endpoint", &self.inner.connector.endpoint())
            .field("destination_root", &self.inner.destination_root)
            .field("idle_timeout", &self.inner.idle_timeout)
            .finish()
    }
}

impl SftpBackend {
    /// Backend mirroring `source_root` into `destination_root` on the
    /// endpoint reached by `connector`
    pub fn new(
        source_root: impl Into<PathBuf>,
        destination_root: impl Into<String>,
        connector: Arc<dyn RemoteConnector>,
        idle_timeout: Duration,
    ) -> Self {
        let destination_root = destination_root.into();
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                mapper: PathMapper::new(source_root),
                guard: PathGuard::new(&destination_root),
                destination_root,
                connector,
                idle_timeout,
                slot: Mutex::new(SessionSlot::default()),
                status,
                activity: AtomicU64::new(0),
                idle_timer: StdMutex::new(None),
            }),
        }
    }

    /// Idle time before the session is closed
    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    /// Whether a session is currently held (not probed)
    pub async fn has_session(&self) -> bool {
        self.inner.slot.lock().await.session.is_some()
    }

    fn destination(&self, path: &Path) -> Result<String> {
        self.inner.mapper.to_remote(path, &self.inner.destination_root)
    }

    /// Lock the session slot and make sure it holds a live session
    async fn begin(&self) -> Result<MutexGuard<'_, SessionSlot>> {
        self.touch();
        let mut slot = self.inner.slot.lock().await;
        self.inner.ensure_connected(&mut slot).await?;
        Ok(slot)
    }

    /// Settle the outcome of a call made under `slot`
    async fn finish<T>(&self, mut slot: MutexGuard<'_, SessionSlot>, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_connectivity() {
                warn!("Connection to {} lost: {}", self.inner.connector.endpoint(), e);
                self.inner.teardown(&mut slot).await;
            }
        }
        drop(slot);
        self.touch();
        result
    }

    /// Record activity and re-arm the idle timer
    fn touch(&self) {
        let generation = self.inner.activity.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(&self.inner);
        let idle_timeout = self.inner.idle_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            Inner::expire(weak, generation).await;
        });

        if let Ok(mut slot) = self.inner.idle_timer.lock() {
            if let Some(previous) = slot.replace(timer) {
                previous.abort();
            }
        }
    }

    async fn upload_with(&self, session: &dyn RemoteSession, path: &Path, target: &str) -> Result<()> {
        let is_dir = match tokio::fs::symlink_metadata(path).await {
            Ok(metadata) => metadata.is_dir(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Source {} vanished before upload, skipping", path.display());
                return Ok(());
            }
            Err(e) => return Err(Error::execution(format!("stat {}: {}", path.display(), e))),
        };

        if is_dir {
            if session.stat(target).await? != Some(RemoteEntry::Dir) {
                session.create_dir_all(target).await?;
            }
            Ok(())
        } else {
            session.upload_file(path, target).await
        }
    }
}

impl Inner {
    async fn ensure_connected(&self, slot: &mut SessionSlot) -> Result<()> {
        if let Some(session) = &slot.session {
            match session.ping().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!("Cached session to {} is dead: {}", self.connector.endpoint(), e);
                    self.teardown(slot).await;
                }
            }
        }

        match self.connector.connect().await {
            Ok(session) => {
                slot.session = Some(session);
                info!("Connected to {}", self.connector.endpoint());
                self.status.send_replace(ConnectionStatus::Connected);
                Ok(())
            }
            Err(e) => {
                self.status.send_replace(ConnectionStatus::Disconnected);
                Err(match e {
                    Error::Connectivity { .. } => e,
                    other => Error::connectivity(other.to_string()),
                })
            }
        }
    }

    async fn teardown(&self, slot: &mut SessionSlot) {
        if let Some(session) = slot.session.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await.is_err() {
                warn!("Closing the session to {} timed out", self.connector.endpoint());
            }
            info!("Disconnected from {}", self.connector.endpoint());
        }
        self.status.send_replace(ConnectionStatus::Disconnected);
    }

    async fn expire(inner: Weak<Self>, generation: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut slot = inner.slot.lock().await;
        if inner.activity.load(Ordering::SeqCst) != generation || slot.session.is_none() {
            return;
        }
        debug!(
            "Session to {} idle for {:?}, closing",
            inner.connector.endpoint(),
            inner.idle_timeout
        );
        inner.teardown(&mut slot).await;
    }
}

fn session(slot: &SessionSlot) -> Result<&dyn RemoteSession> {
    slot.session
        .as_deref()
        .ok_or_else(|| Error::connectivity("no session"))
}

#[async_trait]
impl TransferBackend for SftpBackend {
    async fn connect(&self) -> Result<()> {
        let slot = self.begin().await?;
        self.finish(slot, Ok(())).await
    }

    async fn upload(&self, path: &Path, _is_dir: bool) -> Result<()> {
        let target = self.destination(path)?;
        self.inner.guard.authorize(&[&target])?;

        let slot = self.begin().await?;
        let result = match session(&slot) {
            Ok(session) => self.upload_with(session, path, &target).await,
            Err(e) => Err(e),
        };
        self.finish(slot, result).await
    }

    async fn remove(&self, path: &Path, _is_dir: bool) -> Result<()> {
        let target = self.destination(path)?;
        self.inner.guard.authorize(&[&target])?;

        let slot = self.begin().await?;
        let result = match session(&slot) {
            Ok(session) => match session.stat(&target).await {
                Ok(None) => Ok(()),
                Ok(Some(RemoteEntry::Dir)) => session.remove_dir_all(&target).await,
                Ok(Some(RemoteEntry::File)) => session.remove_file(&target).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        self.finish(slot, result).await
    }

    async fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        let from = self.destination(src)?;
        let to = self.destination(dst)?;
        self.inner.guard.authorize(&[&from, &to])?;

        let slot = self.begin().await?;
        let result = match session(&slot) {
            Ok(session) => self.rename_with(session, dst, &from, &to).await,
            Err(e) => Err(e),
        };
        self.finish(slot, result).await
    }

    async fn terminate(&self) {
        if let Ok(mut timer) = self.inner.idle_timer.lock() {
            if let Some(timer) = timer.take() {
                timer.abort();
            }
        }
        let mut slot = self.inner.slot.lock().await;
        self.inner.teardown(&mut slot).await;
    }

    fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }
}

impl SftpBackend {
    async fn rename_with(&self, session: &dyn RemoteSession, dst: &Path, from: &str, to: &str) -> Result<()> {
        if session.stat(from).await?.is_none() {
            debug!("{} is not at the destination, uploading {} instead", from, dst.display());
            return self.upload_with(session, dst, to).await;
        }

        // SFTP rename refuses to overwrite
        match session.stat(to).await? {
            Some(RemoteEntry::Dir) => session.remove_dir_all(to).await?,
            Some(RemoteEntry::File) => session.remove_file(to).await?,
            None => {}
        }
        session.rename(from, to).await
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut timer) = self.idle_timer.lock() {
            if let Some(timer) = timer.take() {
                timer.abort();
            }
        }
    }
}
