//! Path containment check run before every destination mutation

use mirsync_types::{Error, Result};
use std::path::{Path, PathBuf};

const SEPARATORS: [char; 2] = ['/', '\\'];

/// Authorizes destination paths against a fixed root.
///
/// A path passes when it starts with the root at a component boundary and
/// the remainder holds no `..` segment. The check is purely textual: callers
/// pass the fully resolved destination paths they are about to touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGuard {
    root: String,
}

impl PathGuard {
    /// Guard rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_string_lossy().into_owned(),
        }
    }

    /// Authorized root
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Check every path; fails on the first unauthorized one
    pub fn authorize<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        match paths.iter().find(|path| !self.is_authorized(path.as_ref())) {
            Some(path) => Err(Error::unauthorized(path.as_ref(), PathBuf::from(&self.root))),
            None => Ok(()),
        }
    }

    /// Whether a single path lies inside the root
    pub fn is_authorized(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        let Some(rest) = path.strip_prefix(self.root.as_str()) else {
            return false;
        };

        let at_boundary =
            rest.is_empty() || rest.starts_with(SEPARATORS) || self.root.ends_with(SEPARATORS);

        at_boundary && !rest.split(SEPARATORS).any(|segment| segment == "..")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirsync_types::ErrorKind;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("/srv/mirror", true)]
    #[case("/srv/mirror/a.txt", true)]
    #[case("/srv/mirror/a/b/c", true)]
    #[case("/srv/mirror/..hidden", true)]
    #[case("/srv/mirrored/a.txt", false)]
    #[case("/srv/mirror/../etc/passwd", false)]
    #[case("/srv/mirror/a/..", false)]
    #[case("/srv/mirror\\..\\x", false)]
    #[case("/srv", false)]
    #[case("/etc/passwd", false)]
    fn test_single_paths(#[case] path: &str, #[case] expected: bool) {
        let guard = PathGuard::new("/srv/mirror");
        assert_eq!(guard.is_authorized(Path::new(path)), expected, "{}", path);
    }

    #[test]
    fn test_root_with_trailing_separator() {
        let guard = PathGuard::new("/srv/mirror/");
        assert!(guard.is_authorized(Path::new("/srv/mirror/a")));
        assert!(!guard.is_authorized(Path::new("/srv/mirror")));
    }

    #[test]
    fn test_one_bad_path_fails_the_call() {
        let guard = PathGuard::new("root");
        assert!(guard.authorize(&["root/a"]).is_ok());

        let error = guard.authorize(&["root/a", "root/../b"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Authorization);
        assert_eq!(
            error,
            Error::unauthorized("root/../b", "root")
        );
    }

    fn segment() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => "[a-zA-Z0-9_.-]{1,8}",
            1 => Just("..".to_string()),
        ]
    }

    proptest! {
        #[test]
        fn test_traversal_segments_decide_authorization(
            segments in prop::collection::vec(segment(), 1..6)
        ) {
            let guard = PathGuard::new("/data/root");
            let relative = segments.join("/");
            let path = format!("/data/root/{}", relative);
            let has_traversal = segments.iter().any(|s| s == "..");

            prop_assert_eq!(guard.authorize(&[path.as_str()]).is_ok(), !has_traversal);
        }

        #[test]
        fn test_foreign_prefix_never_passes(name in "[a-z]{1,8}") {
            let guard = PathGuard::new("/data/root");
            let sibling = format!("/data/root{}/file", name);
            prop_assert!(guard.authorize(&[sibling.as_str()]).is_err());
        }
    }
}
