//! Remote directory creation without a native "create parents" primitive
//!
//! SFTP `mkdir` only creates one level. [`ensure_directory`] walks up the
//! ancestors of the requested path until a creation succeeds, then walks back
//! down creating each level it skipped. The ascent stops at the path's
//! fixpoint under [`RemotePath::parent`], so a failure that persists all the
//! way up (usually a permission problem) is reported instead of retried.

use crate::{FileError, RemoteFs, RemotePath, DIR_MODE};
use tracing::{debug, warn};

/// Ensure `path` exists as a directory on the remote host
///
/// Returns immediately when the directory already exists. Otherwise each
/// missing ancestor is created with [`DIR_MODE`]. At most `depth + 1`
/// creation attempts are made on the way up and `depth` on the way down.
pub fn ensure_directory<F: RemoteFs + ?Sized>(fs: &F, path: &RemotePath) -> Result<(), FileError> {
    if fs.is_dir(path) {
        return Ok(());
    }

    let failed = || FileError::DirectoryCreationFailed {
        path: path.to_string(),
    };

    // Directories still to create, deepest first.
    let mut missing = Vec::with_capacity(path.depth());
    let mut current = path.clone();

    loop {
        match fs.mkdir(&current, DIR_MODE) {
            Ok(()) => {
                debug!("Created remote directory {}", current);
                break;
            }
            Err(_) if fs.is_dir(&current) => break,
            Err(e) => {
                debug!("Could not create {}: {}", current, e);
                let parent = current.parent();
                if parent == current {
                    warn!("Reached {:?} without creating any ancestor of {}", current.as_str(), path);
                    return Err(failed());
                }
                missing.push(current);
                current = parent;
            }
        }
    }

    while let Some(dir) = missing.pop() {
        if let Err(e) = fs.mkdir(&dir, DIR_MODE) {
            if !fs.is_dir(&dir) {
                warn!("Unable to create {}: {}", dir, e);
                return Err(failed());
            }
        }
        debug!("Created remote directory {}", dir);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryFs;
    use proptest::prelude::*;

    #[test]
    fn test_existing_directory_is_noop() {
        let fs = MemoryFs::new();
        fs.add_dir("/home/robot");

        ensure_directory(&fs, &RemotePath::new("/home/robot")).unwrap();
        assert_eq!(fs.mkdir_attempts(), 0);
    }

    #[test]
    fn test_idempotent() {
        let fs = MemoryFs::new();
        let path = RemotePath::new("/srv/deploy/lib");

        ensure_directory(&fs, &path).unwrap();
        let first = fs.mkdir_attempts();
        ensure_directory(&fs, &path).unwrap();

        assert!(fs.is_dir(&path));
        assert_eq!(fs.mkdir_attempts(), first);
    }

    #[test]
    fn test_creates_missing_ancestors() {
        let fs = MemoryFs::new();
        fs.add_dir("/home");

        ensure_directory(&fs, &RemotePath::new("/home/robot/a/b")).unwrap();

        for dir in ["/home/robot", "/home/robot/a", "/home/robot/a/b"] {
            assert!(fs.is_dir(&RemotePath::new(dir)), "missing {}", dir);
        }
        // Two failures and one success on the way up, two on the way down.
        assert_eq!(fs.mkdir_attempts(), 5);
    }

    #[test]
    fn test_denied_ancestor_fails() {
        let fs = MemoryFs::new();
        fs.deny("/locked");

        let result = ensure_directory(&fs, &RemotePath::new("/locked/a/b"));
        match result {
            Err(FileError::DirectoryCreationFailed { path }) => assert_eq!(path, "/locked/a/b"),
            other => panic!("expected DirectoryCreationFailed, got {:?}", other),
        }
        assert!(!fs.is_dir(&RemotePath::new("/locked")));
    }

    #[test]
    fn test_relative_path_stops_at_top() {
        let fs = MemoryFs::new();

        let result = ensure_directory(&fs, &RemotePath::new("a/b"));
        assert!(matches!(result, Err(FileError::DirectoryCreationFailed { .. })));
        // "a/b", "a" and "" are each tried once.
        assert_eq!(fs.mkdir_attempts(), 3);
    }

    #[test]
    fn test_concurrent_creation_is_tolerated() {
        let fs = MemoryFs::new();
        fs.add_dir("/data");
        // mkdir fails but the directory shows up anyway.
        fs.add_dir("/data/late");
        fs.hide_dir_once("/data/late");

        ensure_directory(&fs, &RemotePath::new("/data/late")).unwrap();
    }

    proptest! {
        #[test]
        fn prop_terminates_within_bound(
            depth in 1usize..12,
            existing in 0usize..12,
            denied in proptest::option::of(0usize..12),
        ) {
            let existing = existing.min(depth - 1);
            let segments: Vec<String> = (0..depth).map(|i| format!("d{}", i)).collect();
            let prefix = |n: usize| RemotePath::new(format!("/{}", segments[..n].join("/")));

            let fs = MemoryFs::new();
            if existing > 0 {
                fs.add_dir(prefix(existing).as_str());
            }
            let denied = denied.filter(|d| *d >= existing && *d < depth);
            if let Some(d) = denied {
                fs.deny(prefix(d + 1).as_str());
            }

            let target = prefix(depth);
            let result = ensure_directory(&fs, &target);

            prop_assert!(fs.mkdir_attempts() <= 2 * depth + 1);
            if denied.is_some() {
                let failed = matches!(result, Err(FileError::DirectoryCreationFailed { .. }));
                prop_assert!(failed);
            } else {
                prop_assert!(result.is_ok());
                prop_assert!(fs.is_dir(&target));
            }
        }
    }
}
