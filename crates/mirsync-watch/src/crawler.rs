//! Recursive directory listing

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// One descendant found by [`crawl`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlEntry {
    /// Full path of the entry
    pub path: PathBuf,
    /// Whether the entry is a directory (symlinks are not followed)
    pub is_dir: bool,
}

/// List every descendant of `root`, parents before their children.
///
/// `root` itself is not part of the result. Hidden entries are included.
/// Unreadable entries are logged and skipped; a missing root yields nothing.
pub fn crawl(root: &Path) -> Vec<CrawlEntry> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(CrawlEntry {
                is_dir: entry.file_type().is_dir(),
                path: entry.into_path(),
            }),
            Err(e) => {
                if e.depth() > 0 {
                    warn!("Skipping unreadable entry below {}: {}", root.display(), e);
                }
                None
            }
        })
        .collect()
}
