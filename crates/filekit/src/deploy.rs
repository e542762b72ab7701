//! Writing content into place.

use crate::error::{Error, Result};
use filetime::FileTime;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `dest` with `content` atomically.
///
/// Content is staged in a temporary file in the destination directory and
/// renamed over `dest`, so readers see either the old or the new file.
/// Permission bits, owner and group of an existing `dest` carry over.
pub fn write_atomic(dest: &Path, content: &[u8]) -> Result<()> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut staged = NamedTempFile::new_in(dir)
        .map_err(Error::io(format!("failed to stage content in {}", dir.display())))?;
    staged
        .write_all(content)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(Error::io(format!("failed to write staged content for {}", dest.display())))?;

    match fs::metadata(dest) {
        Ok(meta) => {
            fs::set_permissions(staged.path(), meta.permissions())
                .map_err(Error::io(format!("failed to copy permissions of {}", dest.display())))?;
            #[cfg(unix)]
            copy_ownership(&staged, &meta, dest)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(format!("failed to stat {}", dest.display()))(e)),
    }

    staged
        .persist(dest)
        .map_err(|e| Error::io(format!("failed to move content into {}", dest.display()))(e.error))?;
    log::debug!("deployed {} bytes to {}", content.len(), dest.display());
    Ok(())
}

/// Give the staged file the owner and group of `dest`.
///
/// Only root may hand a file to another user; without that privilege the
/// staged file keeps the caller's ids and a warning is logged.
#[cfg(unix)]
fn copy_ownership(staged: &NamedTempFile, meta: &fs::Metadata, dest: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let current = staged
        .as_file()
        .metadata()
        .map_err(Error::io(format!("failed to stat staged content for {}", dest.display())))?;
    if current.uid() == meta.uid() && current.gid() == meta.gid() {
        return Ok(());
    }
    match std::os::unix::fs::fchown(staged.as_file(), Some(meta.uid()), Some(meta.gid())) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            log::warn!(
                "could not keep owner {}:{} of {}: {e}",
                meta.uid(),
                meta.gid(),
                dest.display()
            );
            Ok(())
        }
        Err(e) => Err(Error::io(format!("failed to copy ownership of {}", dest.display()))(e)),
    }
}

/// Set access and modification times of `path` to `time`.
pub fn touch(path: &Path, time: FileTime) -> Result<()> {
    filetime::set_file_times(path, time, time)
        .map_err(Error::io(format!("failed to update times on {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_new_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("motd");

        write_atomic(&dest, b"first").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"first");
        write_atomic(&dest, b"second").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"second");

        // No staging files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_permissions_kept() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("conf");
        fs::write(&dest, "old").unwrap();
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o640)).unwrap();

        write_atomic(&dest, b"new").unwrap();
        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_ownership_kept() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("app.conf");
        fs::write(&dest, "old").unwrap();

        // SAFETY: geteuid has no preconditions
        let root = unsafe { libc::geteuid() } == 0;
        let (uid, gid) = if root {
            std::os::unix::fs::chown(&dest, Some(1234), Some(4321)).unwrap();
            (1234, 4321)
        } else {
            let meta = fs::metadata(&dest).unwrap();
            (meta.uid(), meta.gid())
        };

        write_atomic(&dest, b"new").unwrap();
        let meta = fs::metadata(&dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert_eq!((meta.uid(), meta.gid()), (uid, gid));
    }

    #[test]
    fn test_touch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamp");
        fs::write(&path, "").unwrap();
        let time = FileTime::from_unix_time(1_700_000_000, 0);

        touch(&path, time).unwrap();
        let meta = fs::metadata(&path).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), time);
    }
}
