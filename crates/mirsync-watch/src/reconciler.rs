//! Rename disambiguation
//!
//! The OS reports each end of a rename separately and without pairing. A move
//! wholly inside the watched root produces a vanished-path record followed by
//! an appeared-path record; a move out of the root produces only the former,
//! a move in only the latter.
//!
//! The [`Reconciler`] parks every vanished path in a FIFO queue with a
//! deadline. An appeared path pairs with the oldest parked entry and becomes a
//! single [`FileEvent::Renamed`]. Entries still parked at their deadline turn
//! into removals. Appeared paths with nothing to pair with are moves in; a
//! moved-in directory is crawled because its contents generate no records of
//! their own.
//!
//! The reconciler is a plain state machine driven with explicit instants, so
//! the timer lives in whatever task owns it. Processing a moved-in directory
//! crawls it synchronously; async callers run it on the blocking pool.

use crate::crawler::crawl;
use crate::raw::{EventFlags, RawEvent};
use mirsync_types::FileEvent;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default rename disambiguation window
pub const DEFAULT_RENAME_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct PendingRename {
    key: u64,
    path: PathBuf,
    is_dir: bool,
    deadline: Instant,
}

/// Turns raw notification records into semantic file events
#[derive(Debug)]
pub struct Reconciler {
    window: Duration,
    pending: VecDeque<PendingRename>,
    next_key: u64,
}

impl Reconciler {
    /// Create a reconciler with the given disambiguation window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: VecDeque::new(),
            next_key: 0,
        }
    }

    /// Disambiguation window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of vanished paths waiting for a partner
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Earliest deadline among parked entries
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|entry| entry.deadline).min()
    }

    /// Process one raw record received at `now`.
    ///
    /// Entries whose deadline has passed are flushed first so that a late
    /// record never pairs with an expired vanished path.
    pub fn process(&mut self, raw: RawEvent, now: Instant) -> Vec<FileEvent> {
        let mut events = self.expire(now);
        let is_dir = raw.is_dir();

        if raw.flags.contains(EventFlags::RENAMED) {
            match raw.path.symlink_metadata() {
                Ok(metadata) => self.appeared(raw.path, metadata.is_dir(), &mut events),
                Err(_) => self.vanished(raw.path, is_dir, now),
            }
        } else if raw.flags.contains(EventFlags::REMOVED) {
            events.push(FileEvent::removed(raw.path, is_dir));
        } else if raw.flags.contains(EventFlags::CREATED) || raw.flags.contains(EventFlags::MODIFIED) {
            events.push(FileEvent::created(raw.path, is_dir));
        }

        events
    }

    /// Flush every parked entry whose deadline is not after `now` as a removal
    pub fn expire(&mut self, now: Instant) -> Vec<FileEvent> {
        let mut events = Vec::new();
        self.pending.retain(|entry| {
            if entry.deadline <= now {
                debug!(key = entry.key, "No rename partner for {}, treating as removal", entry.path.display());
                events.push(FileEvent::removed(entry.path.clone(), entry.is_dir));
                false
            } else {
                true
            }
        });
        events
    }

    fn appeared(&mut self, path: PathBuf, is_dir: bool, events: &mut Vec<FileEvent>) {
        if let Some(source) = self.pending.pop_front() {
            events.push(FileEvent::renamed(source.path, path));
            return;
        }

        events.push(FileEvent::created(path.clone(), is_dir));
        if is_dir {
            events.extend(
                crawl(&path)
                    .into_iter()
                    .map(|entry| FileEvent::created(entry.path, entry.is_dir)),
            );
        }
    }

    fn vanished(&mut self, path: PathBuf, is_dir: bool, now: Instant) {
        let key = self.next_key;
        self.next_key = self.next_key.wrapping_add(1);
        self.pending.push_back(PendingRename {
            key,
            path,
            is_dir,
            deadline: now + self.window,
        });
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_RENAME_WINDOW)
    }
}
