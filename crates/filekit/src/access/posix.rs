//! Owner, group and mode reconciliation.

use super::principal::{resolve_gid, resolve_uid};
use super::{AccessReconciler, AccessSpec, Mode};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Observed ownership and permissions of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub uid: u32,
    pub gid: u32,
    pub mode: Mode,
}

impl Stat {
    /// Stat `path`, following symlinks; `None` if missing.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(Self::from_metadata(&meta)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(format!("failed to stat {}", path.display()))(e)),
        }
    }

    #[cfg(unix)]
    fn from_metadata(meta: &std::fs::Metadata) -> Result<Self> {
        use std::os::unix::fs::MetadataExt;
        Ok(Self {
            uid: meta.uid(),
            gid: meta.gid(),
            mode: Mode::new(meta.mode()),
        })
    }

    #[cfg(not(unix))]
    fn from_metadata(_meta: &std::fs::Metadata) -> Result<Self> {
        Err(Error::Unsupported("owner/group/mode inspection"))
    }
}

#[derive(Debug, Clone)]
struct Target<T> {
    label: String,
    value: T,
}

/// POSIX access control for one path.
///
/// Names are resolved to ids when constructed, so an unknown user or group
/// fails here rather than being skipped.
#[derive(Debug, Clone)]
pub struct PosixAccess {
    path: PathBuf,
    owner: Option<Target<u32>>,
    group: Option<Target<u32>>,
    mode: Option<Mode>,
    current: Option<Stat>,
}

impl PosixAccess {
    pub fn new(path: impl Into<PathBuf>, spec: &AccessSpec) -> Result<Self> {
        let path = path.into();
        let owner = spec
            .owner
            .as_ref()
            .map(|p| {
                resolve_uid(p).map(|value| Target {
                    label: p.to_string(),
                    value,
                })
            })
            .transpose()?;
        let group = spec
            .group
            .as_ref()
            .map(|p| {
                resolve_gid(p).map(|value| Target {
                    label: p.to_string(),
                    value,
                })
            })
            .transpose()?;
        let current = Stat::load(&path)?;
        Ok(Self {
            path,
            owner,
            group,
            mode: spec.mode,
            current,
        })
    }

    pub fn current(&self) -> Option<Stat> {
        self.current
    }

    /// Re-read the path's ownership and mode.
    pub fn refresh(&mut self) -> Result<()> {
        self.current = Stat::load(&self.path)?;
        Ok(())
    }

    pub fn should_update_owner(&self) -> bool {
        match (&self.owner, self.current) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(target), Some(stat)) => target.value != stat.uid,
        }
    }

    pub fn should_update_group(&self) -> bool {
        match (&self.group, self.current) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(target), Some(stat)) => target.value != stat.gid,
        }
    }

    /// Mode needs setting when it differs, or when a setuid mode would be
    /// cleared by a pending ownership change.
    pub fn should_update_mode(&self) -> bool {
        match (self.mode, self.current) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(target), Some(stat)) if target != stat.mode => true,
            (Some(target), Some(_)) => {
                target.has_setuid() && (self.should_update_owner() || self.should_update_group())
            }
        }
    }

    #[cfg(unix)]
    fn chown(&self, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        std::os::unix::fs::chown(&self.path, uid, gid)
            .map_err(Error::io(format!("failed to chown {}", self.path.display())))
    }

    #[cfg(unix)]
    fn chmod(&self, mode: Mode) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(mode.bits()))
            .map_err(Error::io(format!("failed to chmod {}", self.path.display())))
    }

    #[cfg(not(unix))]
    fn chown(&self, _uid: Option<u32>, _gid: Option<u32>) -> Result<()> {
        Err(Error::Unsupported("changing owner/group"))
    }

    #[cfg(not(unix))]
    fn chmod(&self, _mode: Mode) -> Result<()> {
        Err(Error::Unsupported("changing mode"))
    }
}

impl AccessReconciler for PosixAccess {
    fn compare(&self) -> bool {
        self.should_update_owner() || self.should_update_group() || self.should_update_mode()
    }

    fn describe_changes(&self) -> Vec<String> {
        let mut changes = Vec::new();
        if self.should_update_owner()
            && let Some(target) = &self.owner
        {
            let from = self.current.map(|s| s.uid.to_string()).unwrap_or_default();
            changes.push(format!("change owner from '{from}' to '{}'", target.label));
        }
        if self.should_update_group()
            && let Some(target) = &self.group
        {
            let from = self.current.map(|s| s.gid.to_string()).unwrap_or_default();
            changes.push(format!("change group from '{from}' to '{}'", target.label));
        }
        if self.should_update_mode()
            && let Some(target) = self.mode
        {
            let from = self.current.map(|s| s.mode.to_string()).unwrap_or_default();
            changes.push(format!("change mode from '{from}' to '{target}'"));
        }
        changes
    }

    fn apply(&mut self) -> Result<()> {
        // Decide everything up front; chown may clear setuid.
        let update_owner = self.should_update_owner();
        let update_group = self.should_update_group();
        let update_mode = self.should_update_mode();

        if update_owner || update_group {
            let uid = self.owner.as_ref().filter(|_| update_owner).map(|t| t.value);
            let gid = self.group.as_ref().filter(|_| update_group).map(|t| t.value);
            self.chown(uid, gid)?;
            log::info!("changed ownership of {}", self.path.display());
        }
        if update_mode && let Some(mode) = self.mode {
            self.chmod(mode)?;
            log::info!("changed mode of {} to {mode}", self.path.display());
        }
        self.refresh()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::access::Principal;
    use std::fs;
    use std::os::unix::fs::MetadataExt;

    fn mode_spec(mode: u32) -> AccessSpec {
        AccessSpec {
            mode: Some(Mode::new(mode)),
            ..AccessSpec::default()
        }
    }

    #[test]
    fn test_mode_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, std::os::unix::fs::PermissionsExt::from_mode(0o644)).unwrap();

        let mut access = PosixAccess::new(&path, &mode_spec(0o600)).unwrap();
        assert!(access.compare());
        assert_eq!(access.describe_changes(), vec!["change mode from '0644' to '0600'"]);
        access.apply().unwrap();
        assert!(!access.compare());

        let again = PosixAccess::new(&path, &mode_spec(0o600)).unwrap();
        assert!(!again.compare());
        assert!(again.describe_changes().is_empty());
        assert_eq!(fs::metadata(&path).unwrap().mode() & 0o7777, 0o600);
    }

    #[test]
    fn test_current_owner_and_group_need_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "").unwrap();
        let meta = fs::metadata(&path).unwrap();

        let mut access = PosixAccess::new(
            &path,
            &AccessSpec {
                owner: Some(Principal::Id(meta.uid())),
                group: Some(Principal::Name(meta.gid().to_string())),
                mode: None,
            },
        )
        .unwrap();
        assert!(!access.compare());
        access.apply().unwrap();
        assert!(!access.compare());
    }

    #[test]
    fn test_missing_file_needs_every_facet() {
        let dir = tempfile::tempdir().unwrap();
        let access = PosixAccess::new(
            dir.path().join("absent"),
            &AccessSpec {
                owner: Some(Principal::Id(0)),
                group: None,
                mode: Some(Mode::new(0o640)),
            },
        )
        .unwrap();
        assert!(access.should_update_owner());
        assert!(!access.should_update_group());
        assert!(access.should_update_mode());
        assert_eq!(
            access.describe_changes(),
            vec!["change owner from '' to '0'", "change mode from '' to '0640'"]
        );
    }

    #[test]
    fn test_setuid_reapplied_on_owner_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "").unwrap();
        let mut access = PosixAccess::new(&path, &mode_spec(0o4755)).unwrap();
        access.apply().unwrap();
        assert!(!access.should_update_mode());

        // Pretend ownership is about to change.
        access.owner = Some(Target {
            label: "nobody".into(),
            value: access.current.unwrap().uid + 1,
        });
        assert!(access.should_update_mode());
    }

    #[test]
    fn test_unknown_owner_fails() {
        let err = PosixAccess::new(
            "/tmp",
            &AccessSpec {
                owner: Some(Principal::Name("no-such-user-xq7".into())),
                ..AccessSpec::default()
            },
        )
        .unwrap_err();
        assert!(err.is_unknown_principal());
    }
}
