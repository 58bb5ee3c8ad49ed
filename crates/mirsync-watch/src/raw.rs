//! Low-level notification records

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;

/// Set of flags carried by one raw notification
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventFlags(u8);

impl EventFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// The path appeared
    pub const CREATED: Self = Self(1);
    /// The path was deleted
    pub const REMOVED: Self = Self(1 << 1);
    /// One end of a rename or move
    pub const RENAMED: Self = Self(1 << 2);
    /// The contents changed
    pub const MODIFIED: Self = Self(1 << 3);
    /// The path is (or was) a directory
    pub const IS_DIR: Self = Self(1 << 4);

    /// Whether every flag of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Add or clear the directory flag
    pub const fn with_dir(self, is_dir: bool) -> Self {
        if is_dir {
            Self(self.0 | Self::IS_DIR.0)
        } else {
            Self(self.0 & !Self::IS_DIR.0)
        }
    }
}

impl BitOr for EventFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for EventFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::CREATED, "CREATED"),
            (Self::REMOVED, "REMOVED"),
            (Self::RENAMED, "RENAMED"),
            (Self::MODIFIED, "MODIFIED"),
            (Self::IS_DIR, "IS_DIR"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "EventFlags({})", set.join(" | "))
    }
}

/// A `(path, flags)` notification as delivered by the OS source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Affected path
    pub path: PathBuf,
    /// What happened to it
    pub flags: EventFlags,
}

impl RawEvent {
    /// Create a raw event
    pub fn new(path: impl Into<PathBuf>, flags: EventFlags) -> Self {
        Self {
            path: path.into(),
            flags,
        }
    }

    /// Whether the path is flagged as a directory
    pub fn is_dir(&self) -> bool {
        self.flags.contains(EventFlags::IS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let flags = EventFlags::RENAMED | EventFlags::IS_DIR;
        assert!(flags.contains(EventFlags::RENAMED));
        assert!(!flags.contains(EventFlags::CREATED));
        assert!(!flags.with_dir(false).contains(EventFlags::IS_DIR));
        assert!(EventFlags::NONE.is_empty());
        assert_eq!(format!("{:?}", flags), "EventFlags(RENAMED | IS_DIR)");
    }
}
