//! Source path to destination path translation

use mirsync_types::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Substitutes the source root of a path with a destination root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    source_root: PathBuf,
}

impl PathMapper {
    /// Mapper for paths below `source_root`
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
        }
    }

    /// Watched source root
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Part of `path` below the source root
    pub fn relative<'a>(&self, path: &'a Path) -> Result<&'a Path> {
        path.strip_prefix(&self.source_root)
            .map_err(|_| Error::unauthorized(path, &self.source_root))
    }

    /// Destination path on the local file system
    pub fn to_local(&self, path: &Path, destination_root: &Path) -> Result<PathBuf> {
        let relative = self.relative(path)?;
        if relative.as_os_str().is_empty() {
            Ok(destination_root.to_path_buf())
        } else {
            Ok(destination_root.join(relative))
        }
    }

    /// Destination path on a remote host, always `/`-separated
    pub fn to_remote(&self, path: &Path, destination_root: &str) -> Result<String> {
        let relative = self.relative(path)?;
        let segments: Vec<String> = relative
            .components()
            .map(|component| match component {
                Component::ParentDir => "..".to_string(),
                Component::CurDir => ".".to_string(),
                other => other.as_os_str().to_string_lossy().into_owned(),
            })
            .collect();

        if segments.is_empty() {
            return Ok(destination_root.to_string());
        }

        Ok(format!(
            "{}/{}",
            destination_root.trim_end_matches('/'),
            segments.join("/")
        ))
    }
}
