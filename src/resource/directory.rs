//! Directory resource

use declarative::{
    Action, ActionFn, Converger, Error, FailureKind, IoResultExt, Provider, Requirement,
    Requirements, Resource, ResourceStatus, Result, RunContext,
};
use filekit::{AccessSpec, Mode, Principal};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::filesystem::{FsEntry, converge_access, is_writable};

/// A directory and its ownership
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryResource {
    pub name: String,
    pub path: PathBuf,
    pub owner: Option<Principal>,
    pub group: Option<Principal>,
    pub mode: Option<Mode>,
    /// Create missing parents; delete contents
    pub recursive: bool,
    #[serde(skip)]
    pub status: ResourceStatus,
}

impl DirectoryResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
            ..Self::default()
        }
    }

    pub fn access_spec(&self) -> AccessSpec {
        AccessSpec {
            owner: self.owner.clone(),
            group: self.group.clone(),
            mode: self.mode,
        }
    }
}

impl Resource for DirectoryResource {
    fn resource_type(&self) -> &'static str {
        "directory"
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
}

/// Converges a [`DirectoryResource`]
#[derive(Debug)]
pub struct DirectoryProvider {
    new_resource: DirectoryResource,
    entry: FsEntry,
    parent_exists: bool,
    parent_writable: bool,
    empty: bool,
}

impl DirectoryProvider {
    pub fn new(resource: DirectoryResource) -> Self {
        Self {
            new_resource: resource,
            entry: FsEntry::Absent,
            parent_exists: true,
            parent_writable: true,
            empty: true,
        }
    }

    fn path(&self) -> &Path {
        &self.new_resource.path
    }

    fn is_directory(&self) -> bool {
        matches!(self.entry, FsEntry::Directory | FsEntry::LinkToDirectory)
    }

    fn action_create(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        let path = self.path().to_path_buf();
        if !self.entry.exists() {
            let identity = conv.resource().to_string();
            let recursive = self.new_resource.recursive;
            conv.converge_by(format!("create new directory {}", path.display()), |_| {
                let created = if recursive {
                    fs::create_dir_all(&path)
                } else {
                    fs::create_dir(&path)
                };
                created.io_context(&identity, || format!("failed to create {}", path.display()))
            })?;
            log::info!("created directory {}", path.display());
        }
        converge_access(conv, &path, &self.new_resource.access_spec())
    }

    fn action_delete(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if !self.entry.exists() {
            return Ok(());
        }
        let identity = conv.resource().to_string();
        let path = self.path().to_path_buf();
        let recursive = self.new_resource.recursive;
        conv.converge_by(format!("delete existing directory {}", path.display()), |_| {
            let removed = if recursive {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_dir(&path)
            };
            removed.io_context(&identity, || format!("failed to delete {}", path.display()))
        })?;
        log::info!("deleted directory {}", path.display());
        Ok(())
    }
}

impl Provider for DirectoryProvider {
    type Resource = DirectoryResource;

    const ACTIONS: &'static [(Action, ActionFn<Self>)] = &[
        (Action::Create, Self::action_create),
        (Action::Delete, Self::action_delete),
    ];

    fn new_resource(&self) -> &DirectoryResource {
        &self.new_resource
    }

    fn new_resource_mut(&mut self) -> &mut DirectoryResource {
        &mut self.new_resource
    }

    fn check_resource_semantics(&self) -> Result<()> {
        if self.path().parent().is_none() {
            return Err(Error::invalid(
                self.new_resource.identity(),
                "refusing to manage the filesystem root",
            ));
        }
        Ok(())
    }

    fn load_current_resource(&mut self, _ctx: &RunContext) -> Result<()> {
        let identity = self.new_resource.identity();
        let path = self.path().to_path_buf();
        self.entry = FsEntry::inspect(&path)
            .io_context(&identity, || format!("failed to inspect {}", path.display()))?;

        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        self.parent_exists = parent.is_none_or(Path::is_dir);
        self.parent_writable = parent.is_none_or(is_writable);
        self.empty = if self.entry == FsEntry::Directory {
            fs::read_dir(&path)
                .io_context(&identity, || format!("failed to list {}", path.display()))?
                .next()
                .is_none()
        } else {
            true
        };
        log::debug!("{identity}: found {}", self.entry.describe());
        Ok(())
    }

    fn define_resource_requirements(&self, requirements: &mut Requirements<Self>, _ctx: &RunContext) {
        let path = self.path().display().to_string();
        let parent = self
            .path()
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        requirements.assert(
            &[Action::Create],
            Requirement::new(|p: &Self| p.parent_exists || p.new_resource.recursive)
                .failure(
                    FailureKind::EnclosingDirectoryDoesNotExist,
                    format!("Parent directory {parent} does not exist, cannot create {path}"),
                )
                .whyrun(format!("Assuming directory {parent} would have been created")),
        );
        requirements.assert(
            &[Action::Create],
            Requirement::new(|p: &Self| !p.entry.exists() || p.is_directory())
                .failure(
                    FailureKind::FileTypeMismatch,
                    format!("Cannot create directory {path}: a {} is in the way", self.entry.describe()),
                )
                .whyrun(format!("Assuming {path} would have been replaced by a previous resource"))
                .block_action(),
        );

        requirements.assert(
            &[Action::Delete],
            Requirement::new(|p: &Self| !p.entry.exists() || p.is_directory()).failure(
                FailureKind::FileTypeMismatch,
                format!("Cannot delete {path}: it is a {}, not a directory", self.entry.describe()),
            ),
        );
        requirements.assert(
            &[Action::Delete],
            Requirement::new(|p: &Self| !p.entry.exists() || p.parent_writable).failure(
                FailureKind::InsufficientPermissions,
                format!("Cannot delete {path}: parent directory {parent} is not writable"),
            ),
        );
        requirements.assert(
            &[Action::Delete],
            Requirement::new(|p: &Self| p.empty || p.new_resource.recursive).failure(
                FailureKind::Generic,
                format!("Directory {path} is not empty, set recursive to true to delete it"),
            ),
        );
    }
}
