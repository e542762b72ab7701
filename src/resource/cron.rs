//! Cron resource - one named entry in a user's crontab
//!
//! The crontab is read and written as a whole through the `crontab` command.
//! The managed entry lives in a section opened by a marker comment; every
//! other line is written back exactly as it was read.

use cronkit::{CronEntry, Crontab, SpecialTime, marker_line};
use declarative::{
    Action, ActionFn, Converger, Error, Provider, Resource, ResourceStatus, Result, RunContext,
};
use serde::Deserialize;
use shellout::ShellCommand;
use std::collections::BTreeMap;

fn default_user() -> String {
    "root".to_string()
}

fn wildcard() -> String {
    "*".to_string()
}

/// A cron job declaration
#[derive(Debug, Clone, Deserialize)]
pub struct CronResource {
    pub name: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "wildcard")]
    pub minute: String,
    #[serde(default = "wildcard")]
    pub hour: String,
    #[serde(default = "wildcard")]
    pub day: String,
    #[serde(default = "wildcard")]
    pub month: String,
    #[serde(default = "wildcard")]
    pub weekday: String,
    #[serde(default)]
    pub time: Option<SpecialTime>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub mailto: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(skip)]
    pub status: ResourceStatus,
}

impl CronResource {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::from_entry(name, &CronEntry::new(command))
    }

    fn from_entry(name: impl Into<String>, entry: &CronEntry) -> Self {
        Self {
            name: name.into(),
            user: default_user(),
            minute: entry.minute.clone(),
            hour: entry.hour.clone(),
            day: entry.day.clone(),
            month: entry.month.clone(),
            weekday: entry.weekday.clone(),
            time: entry.time,
            command: entry.command.clone(),
            mailto: entry.mailto.clone(),
            path: entry.path.clone(),
            shell: entry.shell.clone(),
            home: entry.home.clone(),
            environment: entry.environment.clone(),
            status: ResourceStatus::default(),
        }
    }

    /// The crontab entry this declaration describes
    pub fn entry(&self) -> CronEntry {
        CronEntry {
            minute: self.minute.clone(),
            hour: self.hour.clone(),
            day: self.day.clone(),
            month: self.month.clone(),
            weekday: self.weekday.clone(),
            time: self.time,
            command: self.command.clone(),
            mailto: self.mailto.clone(),
            path: self.path.clone(),
            shell: self.shell.clone(),
            home: self.home.clone(),
            environment: self.environment.clone(),
        }
    }
}

impl Resource for CronResource {
    fn resource_type(&self) -> &'static str {
        "cron"
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

/// Converges a [`CronResource`]
#[derive(Debug)]
pub struct CronProvider {
    new_resource: CronResource,
    current_resource: Option<CronResource>,
    crontab: Crontab,
    marker: String,
    cron_exists: bool,
    cron_empty: bool,
}

impl CronProvider {
    pub fn new(resource: CronResource) -> Self {
        Self {
            new_resource: resource,
            current_resource: None,
            crontab: Crontab::default(),
            marker: String::new(),
            cron_exists: false,
            cron_empty: true,
        }
    }

    fn action_create(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        let desired = self.new_resource.entry();
        let existed = self.cron_exists;
        if existed
            && let Some(current) = &self.current_resource
            && !desired.differs_from(&current.entry())
        {
            log::debug!("{}: crontab entry is up to date", conv.resource());
            return Ok(());
        }

        let mut crontab = self.crontab.clone();
        crontab.upsert(&self.marker, &desired);
        let verb = if existed { "update" } else { "add" };
        let identity = conv.resource().to_string();
        conv.converge_by(format!("{verb} crontab entry for {identity}"), |ctx| {
            write_crontab(ctx, &identity, &self.new_resource.user, &crontab)
        })?;
        log::info!("{identity} {}", if existed { "updated crontab entry" } else { "added crontab entry" });
        Ok(())
    }

    fn action_delete(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if !self.cron_exists {
            return Ok(());
        }
        let mut crontab = self.crontab.clone();
        crontab.remove(&self.marker);
        let identity = conv.resource().to_string();
        conv.converge_by(format!("delete crontab entry for {identity}"), |ctx| {
            write_crontab(ctx, &identity, &self.new_resource.user, &crontab)
        })?;
        log::info!("{identity} deleted crontab entry");
        Ok(())
    }
}

fn write_crontab(ctx: &RunContext, identity: &str, user: &str, crontab: &Crontab) -> Result<()> {
    let command = ShellCommand::new("crontab")
        .args(["-u", user, "-"])
        .input(crontab.render());
    ctx.run(identity, &command)?;
    Ok(())
}

impl Provider for CronProvider {
    type Resource = CronResource;

    const ACTIONS: &'static [(Action, ActionFn<Self>)] = &[
        (Action::Create, Self::action_create),
        (Action::Delete, Self::action_delete),
    ];

    fn new_resource(&self) -> &CronResource {
        &self.new_resource
    }

    fn new_resource_mut(&mut self) -> &mut CronResource {
        &mut self.new_resource
    }

    fn current_resource(&self) -> Option<&CronResource> {
        self.current_resource.as_ref()
    }

    fn check_resource_semantics(&self) -> Result<()> {
        let identity = self.new_resource.identity();
        let entry = self.new_resource.entry();
        entry
            .check_conflicts()
            .map_err(|e| Error::conflict(&identity, e.to_string()))?;
        entry
            .validate()
            .map_err(|e| Error::invalid(&identity, e.to_string()))
    }

    fn load_current_resource(&mut self, ctx: &RunContext) -> Result<()> {
        let identity = self.new_resource.identity();
        let user = &self.new_resource.user;
        let command = ShellCommand::new("crontab")
            .args(["-l", "-u", user.as_str()])
            .returns([0, 1]);
        let output = ctx
            .shell()
            .run(&command)
            .map_err(|e| Error::inspection(&identity, format!("failed to read crontab for {user}: {e}")))?;

        // status 1: the user has no crontab yet
        self.crontab = if output.status == 1 {
            Crontab::default()
        } else {
            Crontab::parse(&output.stdout)
        };
        self.marker = marker_line(&ctx.config().crontab_marker, &self.new_resource.name);
        self.cron_empty = self.crontab.is_empty();

        let found = self.crontab.get(&self.marker);
        self.cron_exists = found.is_some();
        self.current_resource = found.map(|entry| {
            let mut current = CronResource::from_entry(&self.new_resource.name, &entry);
            current.user.clone_from(&self.new_resource.user);
            current
        });
        log::debug!(
            "{identity}: crontab for {} {}, entry {}",
            self.new_resource.user,
            if self.cron_empty { "is empty" } else { "loaded" },
            if self.cron_exists { "found" } else { "not found" }
        );
        Ok(())
    }
}
