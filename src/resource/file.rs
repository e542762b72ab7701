//! File resource - content, ownership and permissions of a single file
//!
//! Content is compared by checksum and only rewritten when it differs. The
//! previous version is backed up first and the change is described with a
//! unified diff (suppressed for sensitive resources).

use declarative::{
    Action, ActionFn, Converger, Error, FailureKind, IoResultExt, Provider, Requirement,
    Requirements, Resource, ResourceStatus, Result, ResultExt, RunContext,
};
use filekit::access::{resolve_gid, resolve_uid, posix::Stat};
use filekit::{
    AccessSpec, AclBackend, AclEntry, AclSpec, Candidate, Mode, Principal, checksum_bytes,
    checksum_file, deploy, short_checksum,
};
use filetime::FileTime;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::filesystem::{FsEntry, converge_access, converge_acl, is_writable};

/// A file with optional managed content
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileResource {
    pub name: String,
    /// Defaults to the name
    pub path: PathBuf,
    pub content: Option<String>,
    /// Expected checksum of `content`; backfilled after convergence
    pub checksum: Option<String>,
    pub owner: Option<Principal>,
    pub group: Option<Principal>,
    pub mode: Option<Mode>,
    /// ACL entries, for platforms with an ACL backend
    pub rights: Option<Vec<AclEntry>>,
    pub inherits: Option<bool>,
    /// Backups to keep; 0 disables backups
    pub backup: usize,
    /// Replace a symlink or special file in the way
    pub force_unlink: bool,
    pub sensitive: bool,
    #[serde(skip)]
    pub status: ResourceStatus,
}

impl Default for FileResource {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: PathBuf::new(),
            content: None,
            checksum: None,
            owner: None,
            group: None,
            mode: None,
            rights: None,
            inherits: None,
            backup: 5,
            force_unlink: false,
            sensitive: false,
            status: ResourceStatus::default(),
        }
    }
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn access_spec(&self) -> AccessSpec {
        AccessSpec {
            owner: self.owner.clone(),
            group: self.group.clone(),
            mode: self.mode,
        }
    }

    pub fn acl_spec(&self) -> AclSpec {
        AclSpec {
            entries: self.rights.clone(),
            inherits: self.inherits,
        }
    }
}

impl Resource for FileResource {
    fn resource_type(&self) -> &'static str {
        "file"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> &ResourceStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut ResourceStatus {
        &mut self.status
    }

    fn sensitive(&self) -> bool {
        self.sensitive
    }
}

/// Converges a [`FileResource`]
pub struct FileProvider {
    new_resource: FileResource,
    current_resource: Option<FileResource>,
    acl: Option<Rc<dyn AclBackend>>,
    entry: FsEntry,
    parent_exists: bool,
    writable: bool,
    owner_known: bool,
    group_known: bool,
    /// Whether the file was created by the running action
    created: bool,
}

impl FileProvider {
    pub fn new(resource: FileResource, acl: Option<Rc<dyn AclBackend>>) -> Self {
        Self {
            new_resource: resource,
            current_resource: None,
            acl,
            entry: FsEntry::Absent,
            parent_exists: true,
            writable: true,
            owner_known: true,
            group_known: true,
            created: false,
        }
    }

    fn path(&self) -> &Path {
        &self.new_resource.path
    }

    fn current_checksum(&self) -> Option<&str> {
        self.current_resource.as_ref()?.checksum.as_deref()
    }

    fn action_create(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        self.verify_checksum(conv.resource())?;
        self.do_unlink(conv)?;
        self.do_create_file(conv)?;
        self.do_contents_change(conv)?;
        self.do_access_control(conv)?;
        self.backfill_checksum(conv.why_run());
        Ok(())
    }

    fn action_create_if_missing(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if self.entry.exists() {
            log::debug!("{} exists, taking no action", conv.resource());
            return Ok(());
        }
        self.action_create(conv)
    }

    fn action_delete(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if !self.entry.exists() {
            return Ok(());
        }
        let identity = conv.resource().to_string();
        let path = self.path().to_path_buf();
        let keep = self.new_resource.backup;
        let is_symlink = self.entry.is_symlink();
        conv.converge_by(format!("delete file {}", path.display()), |ctx| {
            if !is_symlink {
                ctx.backup_manager().backup(&path, keep).for_resource(&identity)?;
            }
            fs::remove_file(&path).io_context(&identity, || format!("failed to delete {}", path.display()))
        })
    }

    fn action_touch(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        self.action_create(conv)?;
        let identity = conv.resource().to_string();
        let path = self.path().to_path_buf();
        conv.converge_by(format!("update utime on file {}", path.display()), |_| {
            deploy::touch(&path, FileTime::now()).for_resource(&identity)
        })
    }

    fn verify_checksum(&self, identity: &str) -> Result<()> {
        let (Some(expected), Some(content)) = (&self.new_resource.checksum, &self.new_resource.content)
        else {
            return Ok(());
        };
        let actual = checksum_bytes(content.as_bytes());
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(Error::requirement(
                identity,
                FailureKind::ChecksumMismatch,
                format!(
                    "Checksum on resource ({}) does not match checksum on content ({})",
                    short_checksum(expected),
                    short_checksum(&actual)
                ),
            ));
        }
        Ok(())
    }

    /// Remove whatever non-file is in the way when `force_unlink` is set.
    fn do_unlink(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if !self.new_resource.force_unlink || !self.entry.exists() || self.entry == FsEntry::File {
            return Ok(());
        }
        let identity = conv.resource().to_string();
        let path = self.path().to_path_buf();
        let is_dir = self.entry == FsEntry::Directory;
        conv.converge_by(
            format!("unlink existing {} at {}", self.entry.describe(), path.display()),
            |_| {
                let removed = if is_dir {
                    fs::remove_dir(&path)
                } else {
                    fs::remove_file(&path)
                };
                removed.io_context(&identity, || format!("failed to unlink {}", path.display()))
            },
        )?;
        self.entry = FsEntry::Absent;
        Ok(())
    }

    fn do_create_file(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if self.entry.exists() {
            return Ok(());
        }
        let identity = conv.resource().to_string();
        let path = self.path().to_path_buf();
        conv.converge_by(format!("create new file {}", path.display()), |_| {
            fs::File::create(&path)
                .map(drop)
                .io_context(&identity, || format!("failed to create {}", path.display()))
        })?;
        self.created = true;
        Ok(())
    }

    fn do_contents_change(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        let Some(content) = self.new_resource.content.clone() else {
            return Ok(());
        };
        let new_checksum = checksum_bytes(content.as_bytes());
        let current_checksum = if self.created {
            Some(checksum_bytes(b""))
        } else {
            self.current_checksum().map(str::to_string)
        };
        if current_checksum.as_deref() == Some(new_checksum.as_str()) {
            return Ok(());
        }

        let identity = conv.resource().to_string();
        let path = self.path().to_path_buf();
        // content goes to the file a symlink points at, not over the link
        let target = if self.entry == FsEntry::LinkToFile {
            fs::canonicalize(&path)
                .io_context(&identity, || format!("failed to resolve {}", path.display()))?
        } else {
            path.clone()
        };

        let diff = conv
            .ctx()
            .diff_engine()
            .diff(&target, Some(Candidate::Content(content.as_bytes())));
        let mut description = vec![format!(
            "update content in file {} from {} to {}",
            path.display(),
            current_checksum.as_deref().map_or("none", short_checksum),
            short_checksum(&new_checksum)
        )];
        if self.new_resource.sensitive {
            description.push("suppressed sensitive resource".to_string());
        } else {
            description.extend(diff.for_output().iter().cloned());
        }

        let keep = self.new_resource.backup;
        let created = self.created;
        conv.converge_by_lines(description, |ctx| {
            if !created {
                ctx.backup_manager().backup(&target, keep).for_resource(&identity)?;
            }
            deploy::write_atomic(&target, content.as_bytes()).for_resource(&identity)
        })?;

        // A diff against the empty baseline of a new file is not worth reporting
        if !created && !self.new_resource.sensitive {
            self.new_resource.status.diff = diff.for_reporting();
        }
        Ok(())
    }

    fn do_access_control(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        let path = self.path().to_path_buf();
        converge_access(conv, &path, &self.new_resource.access_spec())?;
        if let Some(backend) = self.acl.clone() {
            converge_acl(conv, &path, &self.new_resource.acl_spec(), backend.as_ref())?;
        }
        Ok(())
    }

    fn backfill_checksum(&mut self, why_run: bool) {
        if why_run {
            if let Some(content) = &self.new_resource.content {
                self.new_resource.checksum = Some(checksum_bytes(content.as_bytes()));
            }
            return;
        }
        if let Ok(checksum) = checksum_file(self.path()) {
            self.new_resource.checksum = Some(checksum);
        }
    }
}

impl Provider for FileProvider {
    type Resource = FileResource;

    const ACTIONS: &'static [(Action, ActionFn<Self>)] = &[
        (Action::Create, Self::action_create),
        (Action::CreateIfMissing, Self::action_create_if_missing),
        (Action::Delete, Self::action_delete),
        (Action::Touch, Self::action_touch),
    ];

    fn new_resource(&self) -> &FileResource {
        &self.new_resource
    }

    fn new_resource_mut(&mut self) -> &mut FileResource {
        &mut self.new_resource
    }

    fn current_resource(&self) -> Option<&FileResource> {
        self.current_resource.as_ref()
    }

    fn check_resource_semantics(&self) -> Result<()> {
        if self.path().as_os_str().is_empty() {
            return Err(Error::invalid(self.new_resource.identity(), "path must not be empty"));
        }
        Ok(())
    }

    fn load_current_resource(&mut self, _ctx: &RunContext) -> Result<()> {
        let identity = self.new_resource.identity();
        let path = self.path().to_path_buf();

        self.created = false;
        self.entry = FsEntry::inspect(&path)
            .io_context(&identity, || format!("failed to inspect {}", path.display()))?;
        self.parent_exists = path
            .parent()
            .is_none_or(|p| p.as_os_str().is_empty() || p.is_dir());
        self.writable = !self.entry.exists() || is_writable(&path);
        self.owner_known = self
            .new_resource
            .owner
            .as_ref()
            .is_none_or(|owner| !resolve_uid(owner).is_err_and(|e| e.is_unknown_principal()));
        self.group_known = self
            .new_resource
            .group
            .as_ref()
            .is_none_or(|group| !resolve_gid(group).is_err_and(|e| e.is_unknown_principal()));

        let mut current = FileResource {
            name: self.new_resource.name.clone(),
            path: path.clone(),
            ..FileResource::default()
        };
        if self.entry.is_file() {
            if self.new_resource.content.is_some() {
                current.checksum = Some(
                    checksum_file(&path)
                        .io_context(&identity, || format!("failed to checksum {}", path.display()))?,
                );
            }
            if cfg!(unix)
                && let Some(stat) = Stat::load(&path).for_resource(&identity)?
            {
                current.owner = Some(Principal::Id(stat.uid));
                current.group = Some(Principal::Id(stat.gid));
                current.mode = Some(stat.mode);
            }
        }
        log::debug!(
            "{identity}: found {} (checksum {})",
            self.entry.describe(),
            current.checksum.as_deref().map_or("n/a", short_checksum)
        );
        self.current_resource = Some(current);
        Ok(())
    }

    fn define_resource_requirements(&self, requirements: &mut Requirements<Self>, _ctx: &RunContext) {
        let creating = [Action::Create, Action::CreateIfMissing, Action::Touch];
        let path = self.path().display().to_string();
        let parent = self
            .path()
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        requirements.assert(
            &creating,
            Requirement::new(|p: &Self| p.parent_exists)
                .failure(
                    FailureKind::EnclosingDirectoryDoesNotExist,
                    format!("Parent directory {parent} does not exist."),
                )
                .whyrun(format!("Assuming directory {parent} would have been created")),
        );

        requirements.assert(
            &[Action::Delete],
            Requirement::new(|p: &Self| p.writable).failure(
                FailureKind::InsufficientPermissions,
                format!("File {path} exists but is not writable so it cannot be deleted"),
            ),
        );
        requirements.assert(
            &[Action::Delete],
            Requirement::new(|p: &Self| !matches!(p.entry, FsEntry::Directory | FsEntry::LinkToDirectory))
                .failure(
                    FailureKind::FileTypeMismatch,
                    format!("Cannot delete {path}: it is a directory"),
                ),
        );

        let kind = self.entry.describe();
        requirements.assert(
            &creating,
            Requirement::new(|p: &Self| {
                p.new_resource.force_unlink
                    || !matches!(p.entry, FsEntry::Directory | FsEntry::LinkToDirectory | FsEntry::Other)
            })
            .failure(
                FailureKind::FileTypeMismatch,
                format!("File {path} exists, but is a {kind}, set force_unlink to true to remove"),
            )
            .whyrun(format!("Assuming {kind} at {path} would have been removed by a previous resource"))
            .block_action(),
        );
        requirements.assert(
            &creating,
            Requirement::new(|p: &Self| p.new_resource.force_unlink || p.entry != FsEntry::BrokenLink)
                .failure(
                    FailureKind::InvalidSymlink,
                    format!("Could not verify that the symlink at {path} points to a file"),
                )
                .whyrun(format!("Assuming symlink {path} would have been fixed by a previous resource"))
                .block_action(),
        );

        if let Some(owner) = &self.new_resource.owner {
            requirements.assert(
                &creating,
                Requirement::new(|p: &Self| p.owner_known)
                    .failure(FailureKind::UserIdNotFound, format!("user '{owner}' does not exist"))
                    .whyrun(format!("Assuming user {owner} would have been created")),
            );
        }
        if let Some(group) = &self.new_resource.group {
            requirements.assert(
                &creating,
                Requirement::new(|p: &Self| p.group_known)
                    .failure(FailureKind::GroupIdNotFound, format!("group '{group}' does not exist"))
                    .whyrun(format!("Assuming group {group} would have been created")),
            );
        }

        requirements.assert(
            &creating,
            Requirement::new(|p: &Self| p.new_resource.acl_spec().is_empty() || p.acl.is_some()).failure(
                FailureKind::UnsupportedPlatform,
                "ACL rights need an ACL backend, which this platform does not provide",
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ActionOutcome, Config, ErrorKind, RecordingEvents, run_action};
    use filekit::MemoryAcl;
    use std::fs;

    fn run(provider: &mut FileProvider, action: Action, why_run: bool) -> (Result<ActionOutcome>, RecordingEvents) {
        let events = RecordingEvents::new();
        let ctx = RunContext::new(Config {
            why_run,
            ..Config::default()
        })
        .with_events(events.clone());
        (run_action(provider, action, &ctx), events)
    }

    fn provider(path: &Path, content: &str) -> FileProvider {
        FileProvider::new(FileResource::new(path).with_content(content), None)
    }

    fn backups(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.contains(".converge-"))
            .collect()
    }

    #[test]
    fn test_create_absent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motd");
        let mut provider = provider(&path, "foobar");

        let (outcome, events) = run(&mut provider, Action::Create, false);
        let outcome = outcome.unwrap();

        assert!(outcome.updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), "foobar");
        assert!(backups(dir.path()).is_empty());
        assert!(provider.new_resource().status.diff.is_none());
        assert_eq!(
            events.changes()[0],
            format!("create new file {}", path.display())
        );
    }

    #[test]
    fn test_matching_content_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motd");
        fs::write(&path, "foobar").unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        let mut provider = provider(&path, "foobar");

        let (outcome, events) = run(&mut provider, Action::Create, false);

        assert!(!outcome.unwrap().updated);
        assert!(events.changes().is_empty());
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
        assert!(backups(dir.path()).is_empty());
    }

    #[test]
    fn test_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");
        let mut provider = provider(&path, "port = 8080\n");

        assert!(run(&mut provider, Action::Create, false).0.unwrap().updated);
        assert!(!run(&mut provider, Action::Create, false).0.unwrap().updated);
        assert!(!provider.new_resource().status.updated);
    }

    #[test]
    fn test_content_change_backs_up_and_reports_diff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");
        fs::write(&path, "port = 80\n").unwrap();
        let mut provider = provider(&path, "port = 8080\n");

        let (outcome, events) = run(&mut provider, Action::Create, false);
        let outcome = outcome.unwrap();

        assert!(outcome.updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), "port = 8080\n");
        let backups = backups(dir.path());
        assert_eq!(backups.len(), 1);
        assert!(backups[0].starts_with("app.conf.converge-"));

        let diff = outcome.diff.unwrap();
        assert!(diff.contains("-port = 80"));
        assert!(diff.contains("+port = 8080"));
        assert!(events.changes()[0].starts_with("update content in file"));
        assert!(events.changes().iter().any(|line| line == "+port = 8080"));
    }

    #[test]
    fn test_backup_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");
        fs::write(&path, "old").unwrap();
        let mut resource = FileResource::new(&path).with_content("new");
        resource.backup = 0;
        let mut provider = FileProvider::new(resource, None);

        run(&mut provider, Action::Create, false).0.unwrap();
        assert!(backups(dir.path()).is_empty());
    }

    #[test]
    fn test_sensitive_content_is_not_shown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        fs::write(&path, "hunter2").unwrap();
        let mut resource = FileResource::new(&path).with_content("correct horse");
        resource.sensitive = true;
        let mut provider = FileProvider::new(resource, None);

        let (outcome, events) = run(&mut provider, Action::Create, false);

        assert!(outcome.unwrap().diff.is_none());
        let changes = events.changes();
        assert_eq!(changes[1], "suppressed sensitive resource");
        assert!(!changes.iter().any(|c| c.contains("hunter2")));
    }

    #[test]
    fn test_why_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");
        fs::write(&path, "old\n").unwrap();
        let mut provider = provider(&path, "new\n");

        let (outcome, events) = run(&mut provider, Action::Create, true);

        assert!(outcome.unwrap().updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
        assert!(backups(dir.path()).is_empty());
        assert!(events.changes().iter().any(|line| line == "+new"));
    }

    #[test]
    fn test_missing_parent_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("app.conf");
        let mut provider = provider(&path, "x");

        let err = run(&mut provider, Action::Create, false).0.unwrap_err();
        assert_eq!(err.failure(), Some(FailureKind::EnclosingDirectoryDoesNotExist));
        assert!(err.to_string().starts_with(&format!("file[{}]", path.display())));
    }

    #[test]
    fn test_missing_parent_is_assumed_in_why_run() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("missing");
        let path = parent.join("app.conf");
        let mut provider = provider(&path, "x");

        let (outcome, events) = run(&mut provider, Action::Create, true);

        assert!(outcome.unwrap().updated);
        assert_eq!(
            events.assumptions(),
            vec![format!("Assuming directory {} would have been created", parent.display())]
        );
        assert!(!parent.exists());
    }

    #[test]
    fn test_create_if_missing_leaves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");
        fs::write(&path, "local edits").unwrap();
        let mut provider = provider(&path, "default");

        let outcome = run(&mut provider, Action::CreateIfMissing, false).0.unwrap();
        assert!(!outcome.updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), "local edits");

        fs::remove_file(&path).unwrap();
        let outcome = run(&mut provider, Action::CreateIfMissing, false).0.unwrap();
        assert!(outcome.updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), "default");
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.conf");
        fs::write(&path, "x").unwrap();
        let mut provider = FileProvider::new(FileResource::new(&path), None);

        let (outcome, events) = run(&mut provider, Action::Delete, false);
        assert!(outcome.unwrap().updated);
        assert!(!path.exists());
        assert_eq!(backups(dir.path()).len(), 1);
        assert_eq!(events.changes(), vec![format!("delete file {}", path.display())]);

        let outcome = run(&mut provider, Action::Delete, false).0.unwrap();
        assert!(!outcome.updated);
    }

    #[test]
    fn test_touch_updates_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamp");
        fs::write(&path, "").unwrap();
        let old = FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_times(&path, old, old).unwrap();
        let mut provider = FileProvider::new(FileResource::new(&path), None);

        let outcome = run(&mut provider, Action::Touch, false).0.unwrap();

        assert!(outcome.updated);
        let mtime = FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
        assert!(mtime > old);
    }

    #[test]
    fn test_directory_in_the_way() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.d");
        fs::create_dir(&path).unwrap();

        let mut provider = provider(&path, "x");
        let err = run(&mut provider, Action::Create, false).0.unwrap_err();
        assert_eq!(err.failure(), Some(FailureKind::FileTypeMismatch));

        let (outcome, events) = run(&mut provider, Action::Create, true);
        let outcome = outcome.unwrap();
        assert!(outcome.bypassed);
        assert!(!outcome.updated);
        assert_eq!(events.assumptions().len(), 1);
    }

    #[test]
    fn test_force_unlink_replaces_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.d");
        fs::create_dir(&path).unwrap();
        let mut resource = FileResource::new(&path).with_content("x");
        resource.force_unlink = true;
        let mut provider = FileProvider::new(resource, None);

        assert!(run(&mut provider, Action::Create, false).0.unwrap().updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), "x");
    }

    #[test]
    fn test_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");
        let mut resource = FileResource::new(&path).with_content("x");
        resource.checksum = Some("deadbeef".into());
        let mut provider = FileProvider::new(resource, None);

        let err = run(&mut provider, Action::Create, false).0.unwrap_err();
        assert_eq!(err.failure(), Some(FailureKind::ChecksumMismatch));
        assert!(!path.exists());
    }

    #[test]
    fn test_checksum_backfilled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");
        let mut provider = provider(&path, "x");

        run(&mut provider, Action::Create, false).0.unwrap();
        assert_eq!(provider.new_resource().checksum, Some(checksum_bytes(b"x")));
        // a backfilled checksum still verifies on the next run
        assert!(!run(&mut provider, Action::Create, false).0.unwrap().updated);
    }

    #[cfg(unix)]
    #[test]
    fn test_mode_is_reconciled_once() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        let mut resource = FileResource::new(&path).with_content("k");
        resource.mode = Some("0600".parse().unwrap());
        let mut provider = FileProvider::new(resource, None);

        let (outcome, events) = run(&mut provider, Action::Create, false);
        assert!(outcome.unwrap().updated);
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o7777, 0o600);
        assert!(events.changes().iter().any(|c| c.ends_with("to '0600'")));

        assert!(!run(&mut provider, Action::Create, false).0.unwrap().updated);
    }

    #[cfg(unix)]
    #[test]
    fn test_unknown_owner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");
        let mut resource = FileResource::new(&path).with_content("x");
        resource.owner = Some(Principal::Name("no-such-user-converge".into()));
        let mut provider = FileProvider::new(resource, None);

        let err = run(&mut provider, Action::Create, false).0.unwrap_err();
        assert_eq!(err.failure(), Some(FailureKind::UserIdNotFound));
        assert!(!path.exists());

        let (outcome, events) = run(&mut provider, Action::Create, true);
        assert!(outcome.unwrap().updated);
        assert_eq!(
            events.assumptions(),
            vec!["Assuming user no-such-user-converge would have been created"]
        );
    }

    #[test]
    fn test_acl_rights_with_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.ini");
        let backend = Rc::new(MemoryAcl::new(["Administrators", "Users"]));
        let mut resource = FileResource::new(&path).with_content("x");
        resource.rights = Some(vec![
            AclEntry::allow("Administrators", ["full_control"]),
            AclEntry::allow("Users", ["read"]),
        ]);
        resource.inherits = Some(false);
        let acl: Rc<dyn AclBackend> = backend.clone();
        let mut provider = FileProvider::new(resource, Some(acl));

        let (outcome, events) = run(&mut provider, Action::Create, false);
        assert!(outcome.unwrap().updated);
        assert!(events.changes().iter().any(|c| c.starts_with("change acl entries from")));
        let state = backend.get(&path).unwrap();
        assert_eq!(state.entries.len(), 2);
        assert!(!state.inherits);

        assert!(!run(&mut provider, Action::Create, false).0.unwrap().updated);
    }

    #[test]
    fn test_acl_rights_without_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.ini");
        let mut resource = FileResource::new(&path);
        resource.rights = Some(vec![AclEntry::allow("Users", ["read"])]);
        let mut provider = FileProvider::new(resource, None);

        let err = run(&mut provider, Action::Create, false).0.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Assertion);
        assert_eq!(err.failure(), Some(FailureKind::UnsupportedPlatform));
    }
}
