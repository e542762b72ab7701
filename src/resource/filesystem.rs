//! Filesystem inspection and access control shared by file-like providers

use declarative::{Converger, Result, ResultExt};
use filekit::{AccessReconciler, AccessSpec, AclAccess, AclBackend, AclSpec, PosixAccess};
use std::fs;
use std::io;
use std::path::Path;

/// What currently occupies a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEntry {
    Absent,
    File,
    Directory,
    /// Symlink resolving to a regular file
    LinkToFile,
    /// Symlink resolving to a directory
    LinkToDirectory,
    /// Symlink whose target is missing or loops
    BrokenLink,
    /// Socket, device, fifo or a symlink to one
    Other,
}

impl FsEntry {
    /// Classify `path` without following a symlink at the path itself.
    pub fn inspect(path: &Path) -> io::Result<Self> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::Absent),
            Err(e) => return Err(e),
        };

        if !meta.file_type().is_symlink() {
            return Ok(if meta.is_file() {
                Self::File
            } else if meta.is_dir() {
                Self::Directory
            } else {
                Self::Other
            });
        }

        Ok(match fs::metadata(path) {
            Ok(target) if target.is_file() => Self::LinkToFile,
            Ok(target) if target.is_dir() => Self::LinkToDirectory,
            Ok(_) => Self::Other,
            Err(_) => Self::BrokenLink,
        })
    }

    pub fn exists(self) -> bool {
        self != Self::Absent
    }

    /// Regular file, directly or through a symlink
    pub fn is_file(self) -> bool {
        matches!(self, Self::File | Self::LinkToFile)
    }

    pub fn is_symlink(self) -> bool {
        matches!(self, Self::LinkToFile | Self::LinkToDirectory | Self::BrokenLink)
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Absent => "nothing",
            Self::File => "file",
            Self::Directory => "directory",
            Self::LinkToFile => "symlink to a file",
            Self::LinkToDirectory => "symlink to a directory",
            Self::BrokenLink => "broken symlink",
            Self::Other => "special file",
        }
    }
}

/// Whether the current process may write to `path`.
#[cfg(unix)]
pub fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
pub fn is_writable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| !meta.permissions().readonly())
}

/// Reconcile owner, group and mode of `path` as a converge step.
pub fn converge_access(conv: &mut Converger<'_>, path: &Path, spec: &AccessSpec) -> Result<()> {
    if spec.is_empty() {
        return Ok(());
    }
    let identity = conv.resource().to_string();
    let mut access = match PosixAccess::new(path, spec) {
        Ok(access) => access,
        // already reported as a why-run assumption
        Err(e) if conv.why_run() && e.is_unknown_principal() => return Ok(()),
        Err(e) => return Err(e).for_resource(&identity),
    };
    if !access.compare() {
        return Ok(());
    }
    let changes = access.describe_changes();
    conv.converge_by_lines(changes, |_| access.apply().for_resource(&identity))
}

/// Reconcile an entry-list ACL on `path` as a converge step.
pub fn converge_acl(
    conv: &mut Converger<'_>,
    path: &Path,
    spec: &AclSpec,
    backend: &dyn AclBackend,
) -> Result<()> {
    if spec.is_empty() {
        return Ok(());
    }
    let identity = conv.resource().to_string();
    let mut acl = AclAccess::new(path, spec, backend).for_resource(&identity)?;
    if !acl.compare() {
        return Ok(());
    }
    let changes = acl.describe_changes();
    conv.converge_by_lines(changes, |_| acl.apply().for_resource(&identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_entries() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();

        assert_eq!(FsEntry::inspect(&dir.path().join("missing")).unwrap(), FsEntry::Absent);
        assert_eq!(FsEntry::inspect(&file).unwrap(), FsEntry::File);
        assert_eq!(FsEntry::inspect(dir.path()).unwrap(), FsEntry::Directory);
    }

    #[cfg(unix)]
    #[test]
    fn test_inspect_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();
        let good = dir.path().join("good");
        let broken = dir.path().join("broken");
        std::os::unix::fs::symlink(&file, &good).unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), &broken).unwrap();

        assert_eq!(FsEntry::inspect(&good).unwrap(), FsEntry::LinkToFile);
        assert!(FsEntry::inspect(&good).unwrap().is_file());
        assert_eq!(FsEntry::inspect(&broken).unwrap(), FsEntry::BrokenLink);
        assert!(FsEntry::inspect(&broken).unwrap().is_symlink());
    }

    #[test]
    fn test_temp_dir_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_writable(dir.path()));
    }
}
