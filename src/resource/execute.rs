//! Execute resource - run a shell command, optionally guarded by `creates`

use declarative::{
    Action, ActionFn, Converger, Error, FailureKind, Provider, Requirement, Requirements, Resource,
    ResourceStatus, Result, ResultExt, RunContext,
};
use filekit::Principal;
use filekit::access::{resolve_gid, resolve_uid};
use serde::Deserialize;
use shellout::ShellCommand;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 3600;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_returns() -> Vec<i32> {
    vec![0]
}

/// A command to run
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteResource {
    pub name: String,
    /// Run through `/bin/sh -c`; defaults to the name
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub user: Option<Principal>,
    #[serde(default)]
    pub group: Option<Principal>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Exit statuses that count as success
    #[serde(default = "default_returns")]
    pub returns: Vec<i32>,
    /// Skip the command when this path exists
    #[serde(default)]
    pub creates: Option<PathBuf>,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(skip)]
    pub status: ResourceStatus,
}

impl ExecuteResource {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            name: command.into(),
            command: None,
            cwd: None,
            environment: BTreeMap::new(),
            user: None,
            group: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            returns: default_returns(),
            creates: None,
            sensitive: false,
            status: ResourceStatus::default(),
        }
    }

    pub fn script(&self) -> &str {
        self.command.as_deref().unwrap_or(&self.name)
    }

    /// `creates`, resolved against `cwd` when relative
    fn creates_path(&self) -> Option<PathBuf> {
        let creates = self.creates.as_ref()?;
        Some(match &self.cwd {
            Some(cwd) if creates.is_relative() => cwd.join(creates),
            _ => creates.clone(),
        })
    }
}

impl Resource for ExecuteResource {
    fn resource_type(&self) -> &'static str {
        "execute"
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

/// Runs an [`ExecuteResource`]
#[derive(Debug)]
pub struct ExecuteProvider {
    new_resource: ExecuteResource,
    creates_exists: bool,
    cwd_exists: bool,
    uid: Option<u32>,
    gid: Option<u32>,
    user_known: bool,
    group_known: bool,
}

impl ExecuteProvider {
    pub fn new(resource: ExecuteResource) -> Self {
        Self {
            new_resource: resource,
            creates_exists: false,
            cwd_exists: true,
            uid: None,
            gid: None,
            user_known: true,
            group_known: true,
        }
    }

    fn action_run(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if self.creates_exists {
            log::debug!("{} skipped: creates target exists", conv.resource());
            return Ok(());
        }

        let resource = &self.new_resource;
        let mut command = ShellCommand::shell(resource.script())
            .envs(resource.environment.clone())
            .timeout(Duration::from_secs(resource.timeout))
            .returns(resource.returns.iter().copied());
        if let Some(cwd) = &resource.cwd {
            command = command.cwd(cwd);
        }
        if let Some(uid) = self.uid {
            command = command.uid(uid);
        }
        if let Some(gid) = self.gid {
            command = command.gid(gid);
        }

        let identity = conv.resource().to_string();
        let description = if resource.sensitive {
            "execute sensitive command".to_string()
        } else {
            format!("execute {}", resource.script())
        };
        conv.converge_by(description, |ctx| {
            let output = ctx.run(&identity, &command)?;
            log::info!("{identity} ran successfully (status {})", output.status);
            Ok(())
        })
    }
}

impl Provider for ExecuteProvider {
    type Resource = ExecuteResource;

    const ACTIONS: &'static [(Action, ActionFn<Self>)] = &[(Action::Run, Self::action_run)];

    fn new_resource(&self) -> &ExecuteResource {
        &self.new_resource
    }

    fn new_resource_mut(&mut self) -> &mut ExecuteResource {
        &mut self.new_resource
    }

    fn check_resource_semantics(&self) -> Result<()> {
        let identity = self.new_resource.identity();
        if self.new_resource.script().trim().is_empty() {
            return Err(Error::invalid(identity, "command must not be empty"));
        }
        if self.new_resource.returns.is_empty() {
            return Err(Error::invalid(identity, "returns must list at least one status"));
        }
        Ok(())
    }

    fn load_current_resource(&mut self, _ctx: &RunContext) -> Result<()> {
        let identity = self.new_resource.identity();
        self.creates_exists = self.new_resource.creates_path().is_some_and(|p| p.exists());
        self.cwd_exists = self.new_resource.cwd.as_ref().is_none_or(|cwd| cwd.is_dir());

        self.uid = None;
        self.user_known = true;
        if let Some(user) = &self.new_resource.user {
            match resolve_uid(user) {
                Ok(uid) => self.uid = Some(uid),
                Err(e) if e.is_unknown_principal() => self.user_known = false,
                Err(e) => return Err(e).for_resource(&identity),
            }
        }
        self.gid = None;
        self.group_known = true;
        if let Some(group) = &self.new_resource.group {
            match resolve_gid(group) {
                Ok(gid) => self.gid = Some(gid),
                Err(e) if e.is_unknown_principal() => self.group_known = false,
                Err(e) => return Err(e).for_resource(&identity),
            }
        }
        Ok(())
    }

    fn define_resource_requirements(&self, requirements: &mut Requirements<Self>, _ctx: &RunContext) {
        if let Some(cwd) = &self.new_resource.cwd {
            let cwd = cwd.display().to_string();
            requirements.assert(
                &[Action::Run],
                Requirement::new(|p: &Self| p.cwd_exists || p.creates_exists)
                    .failure(FailureKind::InvalidPath, format!("Working directory {cwd} does not exist"))
                    .whyrun(format!("Assuming directory {cwd} would have been created")),
            );
        }
        if let Some(user) = &self.new_resource.user {
            requirements.assert(
                &[Action::Run],
                Requirement::new(|p: &Self| p.user_known)
                    .failure(FailureKind::UserIdNotFound, format!("user '{user}' does not exist"))
                    .whyrun(format!("Assuming user {user} would have been created")),
            );
        }
        if let Some(group) = &self.new_resource.group {
            requirements.assert(
                &[Action::Run],
                Requirement::new(|p: &Self| p.group_known)
                    .failure(FailureKind::GroupIdNotFound, format!("group '{group}' does not exist"))
                    .whyrun(format!("Assuming group {group} would have been created")),
            );
        }
    }
}
