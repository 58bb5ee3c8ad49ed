//! Core data types for mirsync
//!
//! Semantic file events produced by the reconciler, the per-item status shown
//! to users, and the connectivity signal pushed by transfer backends.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A semantic change below a watched root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FileEvent {
    /// A regular file was created or its contents changed
    FileCreated(PathBuf),
    /// A directory was created
    DirCreated(PathBuf),
    /// A regular file was removed
    FileRemoved(PathBuf),
    /// A directory was removed
    DirRemoved(PathBuf),
    /// An entry was renamed or moved within the watched root
    Renamed {
        /// Previous path
        src: PathBuf,
        /// New path
        dst: PathBuf,
    },
}

impl FileEvent {
    /// Created event of the right flavour for `path`
    pub fn created(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        if is_dir {
            Self::DirCreated(path.into())
        } else {
            Self::FileCreated(path.into())
        }
    }

    /// Removed event of the right flavour for `path`
    pub fn removed(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        if is_dir {
            Self::DirRemoved(path.into())
        } else {
            Self::FileRemoved(path.into())
        }
    }

    /// Create a rename event
    pub fn renamed(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self::Renamed {
            src: src.into(),
            dst: dst.into(),
        }
    }

    /// The path this event leaves behind (the destination for renames)
    pub fn path(&self) -> &Path {
        match self {
            Self::FileCreated(p) | Self::DirCreated(p) | Self::FileRemoved(p) | Self::DirRemoved(p) => p,
            Self::Renamed { dst, .. } => dst,
        }
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileCreated(p) => write!(f, "created file {}", p.display()),
            Self::DirCreated(p) => write!(f, "created dir {}", p.display()),
            Self::FileRemoved(p) => write!(f, "removed file {}", p.display()),
            Self::DirRemoved(p) => write!(f, "removed dir {}", p.display()),
            Self::Renamed { src, dst } => {
                write!(f, "renamed {} -> {}", src.display(), dst.display())
            }
        }
    }
}

/// Status of a sync item.
///
/// Ordered `Connected > Active > Failed > Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SyncStatus {
    /// Not started, or stopped
    #[default]
    Inactive,
    /// A destination mutation or the watch failed; requires stop + start
    Failed,
    /// Started, no live destination session
    Active,
    /// Started with a live destination session
    Connected,
}

impl SyncStatus {
    /// Fold a backend connectivity signal into the current status.
    ///
    /// `Failed` and `Inactive` are left untouched; only a running item reacts
    /// to its backend.
    pub fn fold(self, signal: ConnectionStatus) -> Self {
        match (self, signal) {
            (Self::Active | Self::Connected, ConnectionStatus::Connected) => Self::Connected,
            (Self::Active | Self::Connected, ConnectionStatus::Disconnected) => Self::Active,
            (status, _) => status,
        }
    }

    /// Whether the item is consuming events
    pub fn is_running(self) -> bool {
        matches!(self, Self::Active | Self::Connected)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Inactive => "inactive",
            Self::Failed => "failed",
            Self::Active => "active",
            Self::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Connectivity signal pushed by a transfer backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConnectionStatus {
    /// A live, authenticated session exists
    Connected,
    /// No session is open
    #[default]
    Disconnected,
}
