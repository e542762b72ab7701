//! Link resource - symbolic and hard links
//!
//! An existing link pointing somewhere else is replaced. Anything that is
//! not a link is left alone and reported as a type mismatch.

use declarative::{
    Action, ActionFn, Converger, Error, FailureKind, IoResultExt, Provider, Requirement,
    Requirements, Resource, ResourceStatus, Result, RunContext,
};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::filesystem::FsEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    #[default]
    Symbolic,
    Hard,
}

/// A link at `target_file` pointing to `to`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkResource {
    pub name: String,
    /// Where the link lives; defaults to the name
    pub target_file: PathBuf,
    /// What the link points to
    pub to: PathBuf,
    pub link_type: LinkType,
    #[serde(skip)]
    pub status: ResourceStatus,
}

impl LinkResource {
    pub fn new(target_file: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        let target_file = target_file.into();
        Self {
            name: target_file.display().to_string(),
            target_file,
            to: to.into(),
            ..Self::default()
        }
    }

    pub fn hard(mut self) -> Self {
        self.link_type = LinkType::Hard;
        self
    }
}

impl Resource for LinkResource {
    fn resource_type(&self) -> &'static str {
        "link"
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

/// What the link path holds right now
#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Missing,
    Correct,
    /// A link of the declared type pointing elsewhere
    WrongTarget(PathBuf),
    /// Something that is not a link of the declared type
    NotALink(FsEntry),
}

/// Converges a [`LinkResource`]
#[derive(Debug)]
pub struct LinkProvider {
    new_resource: LinkResource,
    state: LinkState,
    to_exists: bool,
    to_is_dir: bool,
}

impl LinkProvider {
    pub fn new(resource: LinkResource) -> Self {
        Self {
            new_resource: resource,
            state: LinkState::Missing,
            to_exists: true,
            to_is_dir: false,
        }
    }

    fn is_hard(&self) -> bool {
        self.new_resource.link_type == LinkType::Hard
    }

    fn inspect_symlink(&self, entry: FsEntry) -> io::Result<LinkState> {
        let link = &self.new_resource.target_file;
        if !entry.is_symlink() {
            return Ok(LinkState::NotALink(entry));
        }
        let actual = fs::read_link(link)?;
        if actual == self.new_resource.to || resolve(link, &actual) == resolve(link, &self.new_resource.to) {
            Ok(LinkState::Correct)
        } else {
            Ok(LinkState::WrongTarget(actual))
        }
    }

    fn inspect_hard_link(&self, entry: FsEntry) -> LinkState {
        let link = &self.new_resource.target_file;
        if entry != FsEntry::File {
            return LinkState::NotALink(entry);
        }
        match (file_id(link), file_id(&self.new_resource.to)) {
            (Some(actual), Some(wanted)) if actual.same_file(&wanted) => LinkState::Correct,
            (Some(actual), _) if actual.links > 1 => LinkState::WrongTarget(link.clone()),
            _ => LinkState::NotALink(entry),
        }
    }

    fn action_create(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        let identity = conv.resource().to_string();
        let link = self.new_resource.target_file.clone();
        let to = self.new_resource.to.clone();
        let hard = self.is_hard();
        let kind = if hard { "hard link" } else { "symlink" };

        let description = match &self.state {
            LinkState::Correct | LinkState::NotALink(_) => return Ok(()),
            LinkState::Missing => format!("create {kind} at {} to {}", link.display(), to.display()),
            LinkState::WrongTarget(_) if hard => {
                format!("replace {kind} at {} with one to {}", link.display(), to.display())
            }
            LinkState::WrongTarget(old) => format!(
                "replace {kind} at {} from {} to {}",
                link.display(),
                old.display(),
                to.display()
            ),
        };
        let replace = matches!(self.state, LinkState::WrongTarget(_));

        conv.converge_by(description, |_| {
            if replace {
                remove_link(&link).io_context(&identity, || format!("failed to remove {}", link.display()))?;
            }
            let created = if hard {
                fs::hard_link(&to, &link)
            } else {
                create_symlink(&to, &link)
            };
            created.io_context(&identity, || {
                format!("failed to link {} to {}", link.display(), to.display())
            })
        })?;
        log::info!("linked {} -> {}", link.display(), to.display());
        Ok(())
    }

    fn action_delete(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if !matches!(self.state, LinkState::Correct | LinkState::WrongTarget(_)) {
            return Ok(());
        }
        let identity = conv.resource().to_string();
        let link = self.new_resource.target_file.clone();
        let kind = if self.is_hard() { "hard link" } else { "symlink" };
        conv.converge_by(format!("delete {kind} at {}", link.display()), |_| {
            remove_link(&link).io_context(&identity, || format!("failed to delete {}", link.display()))
        })
    }
}

impl Provider for LinkProvider {
    type Resource = LinkResource;

    const ACTIONS: &'static [(Action, ActionFn<Self>)] = &[
        (Action::Create, Self::action_create),
        (Action::Delete, Self::action_delete),
    ];

    fn new_resource(&self) -> &LinkResource {
        &self.new_resource
    }

    fn new_resource_mut(&mut self) -> &mut LinkResource {
        &mut self.new_resource
    }

    fn check_resource_semantics(&self) -> Result<()> {
        if self.new_resource.to.as_os_str().is_empty() {
            return Err(Error::invalid(self.new_resource.identity(), "'to' is required"));
        }
        Ok(())
    }

    fn load_current_resource(&mut self, _ctx: &RunContext) -> Result<()> {
        let identity = self.new_resource.identity();
        let link = self.new_resource.target_file.clone();
        let entry = FsEntry::inspect(&link)
            .io_context(&identity, || format!("failed to inspect {}", link.display()))?;

        self.to_exists = fs::metadata(&self.new_resource.to).is_ok();
        self.to_is_dir = self.new_resource.to.is_dir();
        self.state = match entry {
            FsEntry::Absent => LinkState::Missing,
            _ if self.is_hard() => self.inspect_hard_link(entry),
            _ => self
                .inspect_symlink(entry)
                .io_context(&identity, || format!("failed to read link {}", link.display()))?,
        };
        log::debug!("{identity}: {:?}", self.state);
        Ok(())
    }

    fn define_resource_requirements(&self, requirements: &mut Requirements<Self>, _ctx: &RunContext) {
        let link = self.new_resource.target_file.display().to_string();
        let to = self.new_resource.to.display().to_string();
        let found = match &self.state {
            LinkState::NotALink(entry) => entry.describe(),
            _ => "link",
        };

        requirements.assert(
            &[Action::Create],
            Requirement::new(|p: &Self| !matches!(p.state, LinkState::NotALink(_)))
                .failure(
                    FailureKind::FileTypeMismatch,
                    format!("Cannot link {link} to {to}: {link} exists and is a {found}"),
                )
                .whyrun(format!("Assuming {link} would have been removed by a previous resource"))
                .block_action(),
        );
        if self.is_hard() {
            requirements.assert(
                &[Action::Create],
                Requirement::new(|p: &Self| p.to_exists)
                    .failure(
                        FailureKind::FileTypeMismatch,
                        format!("Cannot create a hard link to {to}: it does not exist"),
                    )
                    .whyrun(format!("Assuming {to} would have been created"))
                    .block_action(),
            );
            requirements.assert(
                &[Action::Create],
                Requirement::new(|p: &Self| !p.to_is_dir).failure(
                    FailureKind::FileTypeMismatch,
                    format!("Cannot create a hard link to directory {to}"),
                ),
            );
        }

        requirements.assert(
            &[Action::Delete],
            Requirement::new(|p: &Self| !matches!(p.state, LinkState::NotALink(_))).failure(
                FailureKind::FileTypeMismatch,
                format!("Cannot delete {link}: not a link"),
            ),
        );
    }
}

/// Resolve a link target relative to the link's directory for comparison.
fn resolve(link: &Path, target: &Path) -> PathBuf {
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.parent()
            .map_or_else(|| target.to_path_buf(), |parent| parent.join(target))
    };
    joined.canonicalize().unwrap_or(joined)
}

#[derive(Debug, Clone, Copy)]
struct FileId {
    dev: u64,
    ino: u64,
    links: u64,
}

impl FileId {
    fn same_file(&self, other: &Self) -> bool {
        self.dev == other.dev && self.ino == other.ino
    }
}

#[cfg(unix)]
fn file_id(path: &Path) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;

    let meta = fs::metadata(path).ok()?;
    Some(FileId {
        dev: meta.dev(),
        ino: meta.ino(),
        links: meta.nlink(),
    })
}

#[cfg(not(unix))]
fn file_id(_path: &Path) -> Option<FileId> {
    None
}

#[cfg(unix)]
fn create_symlink(to: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(to, link)
}

#[cfg(windows)]
fn create_symlink(to: &Path, link: &Path) -> io::Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    if to.is_dir() {
        // Junctions need no extra privileges
        junction::create(to, link).or_else(|e| {
            log::debug!("Junction creation failed ({e}), trying symlink_dir");
            symlink_dir(to, link)
        })
    } else {
        symlink_file(to, link)
    }
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_to: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

fn remove_link(link: &Path) -> io::Result<()> {
    // directory symlinks and junctions are directories on windows
    if cfg!(windows) && fs::metadata(link).is_ok_and(|m| m.is_dir()) {
        fs::remove_dir(link)
    } else {
        fs::remove_file(link)
    }
}
