//! Destination on the local file system

use crate::backend::TransferBackend;
use crate::guard::PathGuard;
use crate::mapper::PathMapper;
use async_trait::async_trait;
use mirsync_types::{ConnectionStatus, Error, Result};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::watch;
use tracing::debug;

/// Mirrors events into another local directory.
///
/// There is no session to manage; connecting, explicitly or through the
/// first mutating call, only reports `Connected`.
#[derive(Debug)]
pub struct LocalBackend {
    mapper: PathMapper,
    destination_root: PathBuf,
    guard: PathGuard,
    status: watch::Sender<ConnectionStatus>,
}

fn execution(action: &str, path: &Path, error: &std::io::Error) -> Error {
    Error::execution(format!("{} {}: {}", action, path.display(), error))
}

async fn kind_of(path: &Path) -> Result<Option<bool>> {
    match fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(Some(metadata.is_dir())),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(e) => Err(execution("stat", path, &e)),
    }
}

impl LocalBackend {
    /// Backend mirroring `source_root` into `destination_root`
    pub fn new(source_root: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        let destination_root = destination_root.into();
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            mapper: PathMapper::new(source_root),
            guard: PathGuard::new(&destination_root),
            destination_root,
            status,
        }
    }

    fn destination(&self, path: &Path) -> Result<PathBuf> {
        self.mapper.to_local(path, &self.destination_root)
    }

    fn mark_connected(&self) {
        self.status.send_if_modified(|status| {
            let changed = *status != ConnectionStatus::Connected;
            *status = ConnectionStatus::Connected;
            changed
        });
    }

    async fn copy_file(&self, source: &Path, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| execution("create directory", parent, &e))?;
        }
        fs::copy(source, target)
            .await
            .map_err(|e| execution("copy to", target, &e))?;
        Ok(())
    }

    /// Delete whatever is at `target`, recursively; absent is fine
    async fn clear(target: &Path) -> Result<()> {
        match kind_of(target).await? {
            None => Ok(()),
            Some(true) => fs::remove_dir_all(target)
                .await
                .map_err(|e| execution("remove directory", target, &e)),
            Some(false) => fs::remove_file(target)
                .await
                .map_err(|e| execution("remove file", target, &e)),
        }
    }
}

#[async_trait]
impl TransferBackend for LocalBackend {
    async fn connect(&self) -> Result<()> {
        self.mark_connected();
        Ok(())
    }

    async fn upload(&self, path: &Path, _is_dir: bool) -> Result<()> {
        let target = self.destination(path)?;
        self.guard.authorize(&[&target])?;
        self.mark_connected();

        // The event may be stale; trust the source as it is now.
        let is_dir = match kind_of(path).await? {
            Some(actual) => actual,
            None => {
                debug!("Source {} vanished before upload, skipping", path.display());
                return Ok(());
            }
        };

        if is_dir {
            if kind_of(&target).await? != Some(true) {
                fs::create_dir_all(&target)
                    .await
                    .map_err(|e| execution("create directory", &target, &e))?;
            }
            return Ok(());
        }

        self.copy_file(path, &target).await
    }

    async fn remove(&self, path: &Path, _is_dir: bool) -> Result<()> {
        let target = self.destination(path)?;
        self.guard.authorize(&[&target])?;
        self.mark_connected();
        Self::clear(&target).await
    }

    async fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        let from = self.destination(src)?;
        let to = self.destination(dst)?;
        self.guard.authorize(&[&from, &to])?;
        self.mark_connected();

        if kind_of(&from).await?.is_none() {
            debug!(
                "{} is not at the destination, uploading {} instead",
                from.display(),
                dst.display()
            );
            let is_dir = kind_of(dst).await?.unwrap_or(false);
            return self.upload(dst, is_dir).await;
        }

        if from == to {
            return Ok(());
        }
        // A file cannot replace a directory, nor a directory a non-empty one
        Self::clear(&to).await?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| execution("create directory", parent, &e))?;
        }
        fs::rename(&from, &to)
            .await
            .map_err(|e| execution("rename to", &to, &e))
    }

    async fn terminate(&self) {
        self.status.send_replace(ConnectionStatus::Disconnected);
    }

    fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirsync_types::{ErrorKind, FileEvent};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        src: PathBuf,
        dst: PathBuf,
        backend: LocalBackend,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&dst).unwrap();
        let backend = LocalBackend::new(&src, &dst);
        Fixture {
            _dir: dir,
            src,
            dst,
            backend,
        }
    }

    #[tokio::test]
    async fn test_upload_overwrites() {
        let f = fixture();
        let file = f.src.join("a/b.txt");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "one").unwrap();
        f.backend.upload(&file, false).await.unwrap();

        std::fs::write(&file, "two").unwrap();
        f.backend.apply(&FileEvent::FileCreated(file)).await.unwrap();
        assert_eq!(std::fs::read_to_string(f.dst.join("a/b.txt")).unwrap(), "two");
    }

    #[tokio::test]
    async fn test_create_existing_directory_is_fine() {
        let f = fixture();
        let dir = f.src.join("dir");
        std::fs::create_dir(&dir).unwrap();

        f.backend.upload(&dir, true).await.unwrap();
        f.backend.upload(&dir, true).await.unwrap();
        assert!(f.dst.join("dir").is_dir());
    }

    #[tokio::test]
    async fn test_remove_absent_is_fine() {
        let f = fixture();
        f.backend.remove(&f.src.join("never"), false).await.unwrap();
        f.backend.remove(&f.src.join("never-dir"), true).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_directory_recursively() {
        let f = fixture();
        std::fs::create_dir_all(f.dst.join("d/e")).unwrap();
        std::fs::write(f.dst.join("d/e/f.txt"), "x").unwrap();

        f.backend.apply(&FileEvent::DirRemoved(f.src.join("d"))).await.unwrap();
        assert!(!f.dst.join("d").exists());
    }

    #[tokio::test]
    async fn test_rename() {
        let f = fixture();
        std::fs::write(f.dst.join("a.txt"), "x").unwrap();
        std::fs::write(f.src.join("b.txt"), "x").unwrap();

        f.backend
            .rename(&f.src.join("a.txt"), &f.src.join("b.txt"))
            .await
            .unwrap();
        assert!(!f.dst.join("a.txt").exists());
        assert_eq!(std::fs::read_to_string(f.dst.join("b.txt")).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_rename_replaces_existing_target() {
        let f = fixture();
        std::fs::write(f.dst.join("a.txt"), "file").unwrap();
        std::fs::create_dir_all(f.dst.join("taken/inner")).unwrap();
        std::fs::write(f.dst.join("taken/inner/old.txt"), "stale").unwrap();

        f.backend
            .rename(&f.src.join("a.txt"), &f.src.join("taken"))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(f.dst.join("taken")).unwrap(), "file");

        std::fs::create_dir_all(f.dst.join("d")).unwrap();
        std::fs::write(f.dst.join("d/kept.txt"), "kept").unwrap();
        std::fs::create_dir_all(f.dst.join("full")).unwrap();
        std::fs::write(f.dst.join("full/other.txt"), "other").unwrap();

        f.backend
            .rename(&f.src.join("d"), &f.src.join("full"))
            .await
            .unwrap();
        assert!(!f.dst.join("d").exists());
        assert!(!f.dst.join("full/other.txt").exists());
        assert_eq!(std::fs::read_to_string(f.dst.join("full/kept.txt")).unwrap(), "kept");
    }

    #[tokio::test]
    async fn test_rename_without_destination_source_uploads() {
        let f = fixture();
        std::fs::write(f.src.join("new.txt"), "fresh").unwrap();

        f.backend
            .rename(&f.src.join("old.txt"), &f.src.join("new.txt"))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(f.dst.join("new.txt")).unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_vanished_source_is_skipped() {
        let f = fixture();
        f.backend.upload(&f.src.join("gone.txt"), false).await.unwrap();
        assert!(!f.dst.join("gone.txt").exists());
    }

    #[tokio::test]
    async fn test_traversal_is_unauthorized() {
        let f = fixture();
        let error = f
            .backend
            .upload(&f.src.join("../escape.txt"), false)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Authorization);
        assert!(!f.dst.parent().unwrap().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_status_signal() {
        let f = fixture();
        let status = f.backend.subscribe_status();
        assert_eq!(*status.borrow(), ConnectionStatus::Disconnected);
        f.backend.connect().await.unwrap();
        assert_eq!(*status.borrow(), ConnectionStatus::Connected);
        f.backend.terminate().await;
        assert_eq!(*status.borrow(), ConnectionStatus::Disconnected);

        f.backend.remove(&f.src.join("absent"), false).await.unwrap();
        assert_eq!(*status.borrow(), ConnectionStatus::Connected);
    }
}
