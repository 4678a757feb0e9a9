use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Scoped clear of the filesystem read-only attribute.
///
/// The engine's save needs a writable file, so the attribute is snapshotted
/// and cleared on acquire. `Drop` restores the original state, which ties
/// restoration to the whole open-to-close sequence and makes it run on every
/// exit path, fault or not.
#[derive(Debug)]
pub struct ReadOnlyGuard {
    path: PathBuf,
    was_read_only: bool,
}

impl ReadOnlyGuard {
    #[allow(clippy::permissions_set_readonly_false)]
    pub fn acquire(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let was_read_only = metadata.permissions().readonly();
        if was_read_only {
            let mut permissions = metadata.permissions();
            permissions.set_readonly(false);
            fs::set_permissions(path, permissions)?;
            debug!(path = %path.display(), "read-only attribute cleared for write");
        }
        Ok(Self {
            path: path.to_path_buf(),
            was_read_only,
        })
    }

    pub fn was_read_only(&self) -> bool {
        self.was_read_only
    }
}

impl Drop for ReadOnlyGuard {
    fn drop(&mut self) {
        if !self.was_read_only {
            return;
        }
        let restored = fs::metadata(&self.path).and_then(|metadata| {
            let mut permissions = metadata.permissions();
            permissions.set_readonly(true);
            fs::set_permissions(&self.path, permissions)
        });
        match restored {
            Ok(()) => debug!(path = %self.path.display(), "read-only attribute restored"),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to restore read-only attribute")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn set_read_only(path: &Path, value: bool) {
        let mut permissions = fs::metadata(path).unwrap().permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(value);
        fs::set_permissions(path, permissions).unwrap();
    }

    #[test]
    fn clears_and_restores_read_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part.ipt");
        fs::write(&path, b"stub").unwrap();
        set_read_only(&path, true);

        {
            let guard = ReadOnlyGuard::acquire(&path).unwrap();
            assert!(guard.was_read_only());
            assert!(!fs::metadata(&path).unwrap().permissions().readonly());
        }

        assert!(fs::metadata(&path).unwrap().permissions().readonly());
        set_read_only(&path, false);
    }

    #[test]
    fn leaves_writable_files_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part.ipt");
        fs::write(&path, b"stub").unwrap();

        {
            let guard = ReadOnlyGuard::acquire(&path).unwrap();
            assert!(!guard.was_read_only());
        }

        assert!(!fs::metadata(&path).unwrap().permissions().readonly());
    }

    #[test]
    fn acquire_fails_for_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.ipt");
        assert!(ReadOnlyGuard::acquire(&path).is_err());
    }
}
