//! Timestamped backups with count-based retention.
//!
//! A backup of `/etc/motd` taken at 2024-05-01 12:30:00 is named
//! `motd.converge-20240501123000`. It lands next to the original, or under
//! the configured backup root mirroring the original directory
//! (`<root>/etc/motd.converge-20240501123000`).

use crate::error::{Error, Result};
use chrono::{Local, NaiveDateTime};
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const TIMESTAMP_LEN: usize = 14;

/// Where backups go and how they are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupOptions {
    /// Alternate root for backups; `None` keeps them beside the original
    pub path: Option<PathBuf>,
    /// Tool name embedded in backup file names
    pub prefix: String,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            path: None,
            prefix: "converge".to_string(),
        }
    }
}

/// Creates backups and prunes old ones.
#[derive(Debug, Clone, Default)]
pub struct BackupManager {
    options: BackupOptions,
}

impl BackupManager {
    pub fn new(options: BackupOptions) -> Self {
        Self { options }
    }

    /// Back up `path` now, keeping at most `keep` backups.
    ///
    /// Returns the new backup's path, or `None` when `keep` is zero or the
    /// file does not exist.
    pub fn backup(&self, path: &Path, keep: usize) -> Result<Option<PathBuf>> {
        self.backup_at(path, keep, Local::now().naive_local())
    }

    /// Back up `path` as if taken at `time`.
    pub fn backup_at(&self, path: &Path, keep: usize, time: NaiveDateTime) -> Result<Option<PathBuf>> {
        if keep == 0 {
            return Ok(None);
        }
        let metadata = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(format!("failed to stat {}", path.display()))(e)),
        };

        let dest = self.backup_path(path, time)?;
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir)
                .map_err(Error::io(format!("failed to create {}", dir.display())))?;
        }
        // fs::copy carries permission bits over
        fs::copy(path, &dest).map_err(Error::io(format!(
            "failed to back up {} to {}",
            path.display(),
            dest.display()
        )))?;
        filetime::set_file_times(
            &dest,
            FileTime::from_last_access_time(&metadata),
            FileTime::from_last_modification_time(&metadata),
        )
        .map_err(Error::io(format!("failed to set times on {}", dest.display())))?;
        log::info!("backed up {} to {}", path.display(), dest.display());

        self.prune(path, keep)?;
        Ok(Some(dest))
    }

    /// Directory holding backups of `path`.
    pub fn backup_dir(&self, path: &Path) -> PathBuf {
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        match &self.options.path {
            Some(root) => mirror_under(root, parent),
            None => parent.to_path_buf(),
        }
    }

    /// Path a backup of `path` taken at `time` would get.
    pub fn backup_path(&self, path: &Path, time: NaiveDateTime) -> Result<PathBuf> {
        let base = basename(path)?;
        Ok(self.backup_dir(path).join(format!(
            "{base}.{}-{}",
            self.options.prefix,
            time.format(TIMESTAMP_FORMAT)
        )))
    }

    /// Existing backups of `path`, newest first.
    pub fn existing_backups(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let dir = self.backup_dir(path);
        let stem = format!("{}.{}-", basename(path)?, self.options.prefix);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(format!("failed to list {}", dir.display()))(e)),
        };

        let mut backups: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix(&stem))
                    .is_some_and(|stamp| {
                        stamp.len() == TIMESTAMP_LEN && stamp.bytes().all(|b| b.is_ascii_digit())
                    })
            })
            .map(|entry| entry.path())
            .collect();

        // Directory order is arbitrary; fixed-width stamps sort by time.
        backups.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(backups)
    }

    /// Delete all but the newest `keep` backups of `path`.
    pub fn prune(&self, path: &Path, keep: usize) -> Result<Vec<PathBuf>> {
        let backups = self.existing_backups(path)?;
        let mut removed = Vec::new();
        for old in backups.into_iter().skip(keep) {
            log::info!("removing backup of {} at {}", path.display(), old.display());
            fs::remove_file(&old)
                .map_err(Error::io(format!("failed to remove backup {}", old.display())))?;
            removed.push(old);
        }
        Ok(removed)
    }
}

fn basename(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))
}

/// Re-root `dir` under `root`, dropping any drive letter and root.
fn mirror_under(root: &Path, dir: &Path) -> PathBuf {
    let mut out = root.to_path_buf();
    for (i, component) in dir.components().enumerate() {
        if let Component::Normal(part) = component {
            if i == 0 && is_drive_letter(part.to_str().unwrap_or_default()) {
                continue;
            }
            out.push(part);
        }
    }
    out
}

fn is_drive_letter(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, 30, 0)
            .unwrap()
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_backup_name_beside_original() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("motd");
        fs::write(&file, "hello").unwrap();

        let backup = BackupManager::default()
            .backup_at(&file, 5, at(1, 12))
            .unwrap()
            .unwrap();
        assert_eq!(backup, dir.path().join("motd.converge-20240501123000"));
        assert_eq!(fs::read_to_string(backup).unwrap(), "hello");
    }

    #[test]
    fn test_backup_under_root_mirrors_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("backups");
        let file = dir.path().join("etc").join("motd");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "hello").unwrap();

        let manager = BackupManager::new(BackupOptions {
            path: Some(root.clone()),
            prefix: "converge".into(),
        });
        let backup = manager.backup_at(&file, 1, at(1, 12)).unwrap().unwrap();
        assert!(backup.starts_with(&root));
        assert!(backup.ends_with(Path::new("etc/motd.converge-20240501123000")));
        assert!(backup.exists());
    }

    #[test]
    fn test_drive_letter_stripped() {
        let mirrored = mirror_under(Path::new("/var/backups"), Path::new("C:/Windows/System32"));
        assert_eq!(mirrored, PathBuf::from("/var/backups/Windows/System32"));
        assert!(!is_drive_letter("etc"));
    }

    #[test]
    fn test_noop_without_file_or_keep() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::default();
        assert_eq!(manager.backup(&dir.path().join("absent"), 5).unwrap(), None);

        let file = dir.path().join("motd");
        fs::write(&file, "x").unwrap();
        assert_eq!(manager.backup(&file, 0).unwrap(), None);
        assert!(manager.existing_backups(&file).unwrap().is_empty());
    }

    #[test]
    fn test_retention_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("motd");
        fs::write(&file, "x").unwrap();
        let manager = BackupManager::default();

        // Seed seven backups out of chronological order.
        for day in [3, 7, 1, 5, 2, 6, 4] {
            let name = format!("motd.converge-202405{day:02}123000");
            fs::write(dir.path().join(name), "old").unwrap();
        }
        // Names that must never be counted or pruned.
        fs::write(dir.path().join("motd.converge-2024"), "").unwrap();
        fs::write(dir.path().join("other.converge-20240101000000"), "").unwrap();
        fs::write(dir.path().join("motd.chef-20240101000000"), "").unwrap();

        manager.backup_at(&file, 5, at(8, 12)).unwrap();

        let remaining = manager.existing_backups(&file).unwrap();
        assert_eq!(
            names(&remaining),
            vec![
                "motd.converge-20240508123000",
                "motd.converge-20240507123000",
                "motd.converge-20240506123000",
                "motd.converge-20240505123000",
                "motd.converge-20240504123000",
            ]
        );
        assert!(dir.path().join("motd.converge-2024").exists());
        assert!(dir.path().join("other.converge-20240101000000").exists());
        assert!(dir.path().join("motd.chef-20240101000000").exists());
    }

    #[test]
    fn test_prune_reports_removed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("motd");
        let manager = BackupManager::default();
        for hour in [10, 11, 12] {
            fs::write(manager.backup_path(&file, at(1, hour)).unwrap(), "").unwrap();
        }

        let removed = manager.prune(&file, 1).unwrap();
        assert_eq!(
            names(&removed),
            vec!["motd.converge-20240501113000", "motd.converge-20240501103000"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_backup_preserves_mode_and_mtime() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("secret");
        fs::write(&file, "x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();
        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&file, mtime).unwrap();

        let backup = BackupManager::default()
            .backup_at(&file, 1, at(1, 12))
            .unwrap()
            .unwrap();
        let meta = fs::metadata(&backup).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o600);
        assert_eq!(FileTime::from_last_modification_time(&meta), mtime);
    }
}
