//! Fixtures shared by the end-to-end tests

use mirsync_engine::{ErrorHandler, SyncItem};
use mirsync_types::{Error, ErrorKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Longest time [`wait_for`] keeps polling
pub const WAIT_WINDOW: Duration = Duration::from_secs(10);

/// Poll `condition` until it holds or [`WAIT_WINDOW`] elapses
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_WINDOW;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

/// A source and a destination directory in one temporary tree
pub struct SyncDirs {
    _temp: TempDir,
    /// Watched directory
    pub src: PathBuf,
    /// Mirror directory
    pub dst: PathBuf,
    /// Scratch space outside both
    pub outside: PathBuf,
}

impl SyncDirs {
    /// Fresh, empty directories
    pub fn new() -> std::io::Result<Self> {
        let temp = TempDir::new()?;
        let root = temp.path().canonicalize()?;
        let dirs = Self {
            src: root.join("src"),
            dst: root.join("dst"),
            outside: root.join("outside"),
            _temp: temp,
        };
        for dir in [&dirs.src, &dirs.dst, &dirs.outside] {
            fs::create_dir_all(dir)?;
        }
        Ok(dirs)
    }
}

/// Create `files` (relative paths) below `base`, one line of content each;
/// returns the created paths
pub fn create_tree(base: &Path, files: &[&str]) -> std::io::Result<Vec<PathBuf>> {
    let mut created = Vec::with_capacity(files.len());
    for file in files {
        let path = base.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("{file}\n"))?;
        created.push(path);
    }
    Ok(created)
}

/// Error handler remembering the kind of every reported error
#[derive(Clone, Default)]
pub struct ErrorLog {
    kinds: Arc<Mutex<Vec<ErrorKind>>>,
}

impl ErrorLog {
    /// Handler feeding this log
    pub fn handler(&self) -> ErrorHandler {
        let kinds = Arc::clone(&self.kinds);
        Arc::new(move |_: &SyncItem, error: &Error| {
            if let Ok(mut kinds) = kinds.lock() {
                kinds.push(error.kind());
            }
        })
    }

    /// Kinds reported so far
    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.kinds.lock().map(|kinds| kinds.clone()).unwrap_or_default()
    }
}
