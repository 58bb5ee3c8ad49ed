//! Translation of `notify` events into raw notification records

use crate::crawler::crawl;
use crate::raw::{EventFlags, RawEvent};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Maps `notify` events onto `(path, flags)` records.
///
/// Removal and rename-from events name paths that no longer exist, so the
/// directory flag cannot be read from disk. The translator remembers which
/// paths below the root are directories and answers from that set instead.
#[derive(Debug, Default)]
pub struct NotifyTranslator {
    known_dirs: HashSet<PathBuf>,
}

impl NotifyTranslator {
    /// Translator seeded with every directory currently below `root`
    pub fn seeded(root: &Path) -> Self {
        let mut translator = Self::default();
        translator.learn_tree(root);
        translator
    }

    /// Whether `path` is a known directory
    pub fn is_known_dir(&self, path: &Path) -> bool {
        self.known_dirs.contains(path)
    }

    /// Translate one `notify` event
    pub fn translate(&mut self, event: Event) -> Vec<RawEvent> {
        match event.kind {
            EventKind::Create(kind) => event
                .paths
                .into_iter()
                .map(|path| {
                    let is_dir = kind == CreateKind::Folder || path.is_dir();
                    if is_dir {
                        self.known_dirs.insert(path.clone());
                    }
                    RawEvent::new(path, EventFlags::CREATED.with_dir(is_dir))
                })
                .collect(),
            EventKind::Remove(kind) => event
                .paths
                .into_iter()
                .map(|path| {
                    let is_dir = self.forget(&path) || kind == RemoveKind::Folder;
                    RawEvent::new(path, EventFlags::REMOVED.with_dir(is_dir))
                })
                .collect(),
            // inotify also reports both halves separately as From and To
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => Vec::new(),
            EventKind::Modify(ModifyKind::Name(_)) => event
                .paths
                .into_iter()
                .map(|path| {
                    let is_dir = if path.symlink_metadata().is_ok() {
                        let is_dir = path.is_dir();
                        if is_dir {
                            self.learn_tree(&path);
                        }
                        is_dir
                    } else {
                        self.forget(&path)
                    };
                    RawEvent::new(path, EventFlags::RENAMED.with_dir(is_dir))
                })
                .collect(),
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => event
                .paths
                .into_iter()
                .map(|path| {
                    let is_dir = path.is_dir();
                    RawEvent::new(path, EventFlags::MODIFIED.with_dir(is_dir))
                })
                .collect(),
            // Access events carry no change; rescan requests never reach here
            _ => Vec::new(),
        }
    }

    fn learn_tree(&mut self, dir: &Path) {
        self.known_dirs.insert(dir.to_path_buf());
        self.known_dirs.extend(
            crawl(dir)
                .into_iter()
                .filter(|entry| entry.is_dir)
                .map(|entry| entry.path),
        );
    }

    /// Drop `path` and everything below it, returning whether it was a directory
    fn forget(&mut self, path: &Path) -> bool {
        let was_dir = self.known_dirs.remove(path);
        if was_dir {
            self.known_dirs.retain(|known| !known.starts_with(path));
        }
        was_dir
    }
}
