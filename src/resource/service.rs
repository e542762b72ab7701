//! Service resource - systemd units
//!
//! State comes from `systemctl show`. Each action compares against one facet
//! (running, enabled, masked) and only issues a command when it differs;
//! restart always runs.

use declarative::{
    Action, ActionFn, Converger, Error, FailureKind, Provider, Requirement, Requirements, Resource,
    ResourceStatus, Result, RunContext,
};
use serde::Deserialize;
use shellout::ShellCommand;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 900;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// A service declaration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceResource {
    pub name: String,
    /// Unit name; defaults to the name
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub start_command: Option<String>,
    #[serde(default)]
    pub stop_command: Option<String>,
    #[serde(default)]
    pub restart_command: Option<String>,
    #[serde(default)]
    pub reload_command: Option<String>,
    /// Exit status 0 means running
    #[serde(default)]
    pub status_command: Option<String>,
    /// Seconds each command may run
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Observed state; only set on the current resource
    #[serde(skip)]
    pub running: Option<bool>,
    #[serde(skip)]
    pub enabled: Option<bool>,
    #[serde(skip)]
    pub masked: Option<bool>,
    #[serde(skip)]
    pub status: ResourceStatus,
}

impl ServiceResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_name: None,
            start_command: None,
            stop_command: None,
            restart_command: None,
            reload_command: None,
            status_command: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            running: None,
            enabled: None,
            masked: None,
            status: ResourceStatus::default(),
        }
    }

    pub fn unit(&self) -> &str {
        self.service_name.as_deref().unwrap_or(&self.name)
    }
}

impl Resource for ServiceResource {
    fn resource_type(&self) -> &'static str {
        "service"
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

/// Observed unit state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceFacts {
    pub found: bool,
    pub running: bool,
    /// Enabled, or static and so always available
    pub enabled: bool,
    pub masked: bool,
    pub is_static: bool,
}

impl ServiceFacts {
    /// Parse `systemctl show -p LoadState -p ActiveState -p UnitFileState`.
    fn parse(output: &str) -> std::result::Result<Self, String> {
        let props: HashMap<&str, &str> = output
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();
        let get = |key: &str| {
            props
                .get(key)
                .copied()
                .ok_or_else(|| format!("systemctl output is missing {key}"))
        };
        let load = get("LoadState")?;
        let active = get("ActiveState")?;
        let unit_file = get("UnitFileState")?;

        let is_static = unit_file == "static";
        Ok(Self {
            found: load != "not-found",
            running: matches!(active, "active" | "reloading" | "activating"),
            enabled: unit_file == "enabled" || is_static,
            masked: load == "masked" || unit_file.starts_with("masked"),
            is_static,
        })
    }
}

/// Converges a [`ServiceResource`] through systemctl
#[derive(Debug)]
pub struct ServiceProvider {
    new_resource: ServiceResource,
    current_resource: Option<ServiceResource>,
    facts: ServiceFacts,
}

impl ServiceProvider {
    pub fn new(resource: ServiceResource) -> Self {
        Self {
            new_resource: resource,
            current_resource: None,
            facts: ServiceFacts::default(),
        }
    }

    pub fn facts(&self) -> ServiceFacts {
        self.facts
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.new_resource.timeout)
    }

    fn systemctl(&self, verb: &str) -> ShellCommand {
        ShellCommand::new("systemctl")
            .args(["--system", verb, self.new_resource.unit()])
            .timeout(self.timeout())
    }

    /// The custom command for an action, or `systemctl <verb>`
    fn command(&self, custom: Option<&String>, verb: &str) -> ShellCommand {
        custom.map_or_else(
            || self.systemctl(verb),
            |script| ShellCommand::shell(script).timeout(self.timeout()),
        )
    }

    fn issue(&self, conv: &mut Converger<'_>, verb: &str, command: ShellCommand) -> Result<()> {
        let identity = conv.resource().to_string();
        conv.converge_by(format!("{verb} service {identity}"), |ctx| {
            ctx.run(&identity, &command)?;
            Ok(())
        })?;
        log::info!("{identity}: {verb} succeeded");
        Ok(())
    }

    fn action_start(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if self.facts.running {
            log::debug!("{} already running", conv.resource());
            return Ok(());
        }
        let command = self.command(self.new_resource.start_command.as_ref(), "start");
        self.issue(conv, "start", command)
    }

    fn action_stop(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if !self.facts.running {
            log::debug!("{} already stopped", conv.resource());
            return Ok(());
        }
        let command = self.command(self.new_resource.stop_command.as_ref(), "stop");
        self.issue(conv, "stop", command)
    }

    fn action_restart(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        let command = self.command(self.new_resource.restart_command.as_ref(), "restart");
        self.issue(conv, "restart", command)
    }

    fn action_reload(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if !self.facts.running {
            log::debug!("{} is not running, skipping reload", conv.resource());
            return Ok(());
        }
        let command = self.command(self.new_resource.reload_command.as_ref(), "reload");
        self.issue(conv, "reload", command)
    }

    fn action_enable(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if self.facts.enabled {
            return Ok(());
        }
        let command = self.systemctl("enable");
        self.issue(conv, "enable", command)
    }

    fn action_disable(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if self.facts.is_static {
            log::debug!("{} is static and cannot be disabled", conv.resource());
            return Ok(());
        }
        if !self.facts.enabled {
            return Ok(());
        }
        let command = self.systemctl("disable");
        self.issue(conv, "disable", command)
    }

    fn action_mask(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if self.facts.masked {
            return Ok(());
        }
        let command = self.systemctl("mask");
        self.issue(conv, "mask", command)
    }

    fn action_unmask(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if !self.facts.masked {
            return Ok(());
        }
        let command = self.systemctl("unmask");
        self.issue(conv, "unmask", command)
    }
}

impl Provider for ServiceProvider {
    type Resource = ServiceResource;

    const ACTIONS: &'static [(Action, ActionFn<Self>)] = &[
        (Action::Start, Self::action_start),
        (Action::Stop, Self::action_stop),
        (Action::Restart, Self::action_restart),
        (Action::Reload, Self::action_reload),
        (Action::Enable, Self::action_enable),
        (Action::Disable, Self::action_disable),
        (Action::Mask, Self::action_mask),
        (Action::Unmask, Self::action_unmask),
    ];

    fn new_resource(&self) -> &ServiceResource {
        &self.new_resource
    }

    fn new_resource_mut(&mut self) -> &mut ServiceResource {
        &mut self.new_resource
    }

    fn current_resource(&self) -> Option<&ServiceResource> {
        self.current_resource.as_ref()
    }

    fn check_resource_semantics(&self) -> Result<()> {
        if self.new_resource.unit().trim().is_empty() {
            return Err(Error::invalid(self.new_resource.identity(), "service name must not be empty"));
        }
        Ok(())
    }

    fn load_current_resource(&mut self, ctx: &RunContext) -> Result<()> {
        let identity = self.new_resource.identity();
        let show = ShellCommand::new("systemctl")
            .args([
                "--system",
                "show",
                "-p",
                "LoadState",
                "-p",
                "ActiveState",
                "-p",
                "UnitFileState",
                self.new_resource.unit(),
            ])
            .timeout(self.timeout());
        let output = ctx
            .shell()
            .run(&show)
            .map_err(|e| Error::inspection(&identity, e.to_string()))?;
        let mut facts =
            ServiceFacts::parse(&output.stdout).map_err(|message| Error::inspection(&identity, message))?;

        if let Some(script) = &self.new_resource.status_command {
            let status = ShellCommand::shell(script).timeout(self.timeout()).returns_any();
            let output = ctx
                .shell()
                .run(&status)
                .map_err(|e| Error::inspection(&identity, e.to_string()))?;
            facts.running = output.success();
        }

        log::debug!("{identity}: {facts:?}");
        let mut current = ServiceResource::new(self.new_resource.name.clone());
        current.service_name = self.new_resource.service_name.clone();
        current.running = Some(facts.running);
        current.enabled = Some(facts.enabled);
        current.masked = Some(facts.masked);
        self.current_resource = Some(current);
        self.facts = facts;
        Ok(())
    }

    fn define_resource_requirements(&self, requirements: &mut Requirements<Self>, _ctx: &RunContext) {
        let unit = self.new_resource.unit().to_string();
        requirements.assert(
            &[Action::Start, Action::Restart, Action::Reload, Action::Enable],
            Requirement::new(|p: &Self| p.facts.found)
                .failure(FailureKind::ServiceNotFound, format!("Service {unit} not found"))
                .whyrun(format!("Assuming service {unit} would have been installed")),
        );
        requirements.assert(
            &[Action::Start],
            Requirement::new(|p: &Self| !p.facts.masked)
                .failure(FailureKind::ServiceMasked, format!("Service {unit} is masked and cannot be started"))
                .whyrun(format!("Assuming service {unit} would have been unmasked")),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ActionOutcome, Config, ErrorKind, RecordingEvents, run_action};
    use shellout::testing::ScriptedShell;

    const SHOW: &str = "systemctl --system show";

    fn show(load: &str, active: &str, unit_file: &str) -> String {
        format!("LoadState={load}\nActiveState={active}\nUnitFileState={unit_file}\n")
    }

    fn run(shell: &ScriptedShell, action: Action, why_run: bool) -> (Result<ActionOutcome>, RecordingEvents) {
        let events = RecordingEvents::new();
        let ctx = RunContext::new(Config {
            why_run,
            ..Config::default()
        })
        .with_shell(shell.clone())
        .with_events(events.clone());
        let mut provider = ServiceProvider::new(ServiceResource::new("nginx"));
        (run_action(&mut provider, action, &ctx), events)
    }

    fn issued(shell: &ScriptedShell) -> Vec<String> {
        shell.commands().into_iter().filter(|c| !c.starts_with(SHOW)).collect()
    }

    #[test]
    fn test_start_stopped_service_once() {
        let stopped = ScriptedShell::new();
        stopped.respond(SHOW, 0, show("loaded", "inactive", "enabled"));
        let outcome = run(&stopped, Action::Start, false).0.unwrap();
        assert!(outcome.updated);
        assert_eq!(issued(&stopped), vec!["systemctl --system start nginx"]);

        let running = ScriptedShell::new();
        running.respond(SHOW, 0, show("loaded", "active", "enabled"));
        let outcome = run(&running, Action::Start, false).0.unwrap();
        assert!(!outcome.updated);
        assert!(issued(&running).is_empty());
    }

    #[test]
    fn test_current_resource_reflects_unit() {
        let shell = ScriptedShell::new();
        shell.respond(SHOW, 0, show("loaded", "active", "disabled"));
        let ctx = RunContext::new(Config::default()).with_shell(shell.clone());
        let mut resource = ServiceResource::new("web");
        resource.service_name = Some("nginx".into());
        let mut provider = ServiceProvider::new(resource);
        assert!(provider.current_resource().is_none());

        assert!(!run_action(&mut provider, Action::Start, &ctx).unwrap().updated);

        let current = provider.current_resource().unwrap();
        assert_eq!(current.unit(), "nginx");
        assert_eq!(current.running, Some(true));
        assert_eq!(current.enabled, Some(false));
        assert_eq!(current.masked, Some(false));
        assert_eq!(provider.new_resource().running, None);
    }

    #[test]
    fn test_stop_and_restart() {
        let shell = ScriptedShell::new();
        shell.respond(SHOW, 0, show("loaded", "active", "enabled"));

        assert!(run(&shell, Action::Stop, false).0.unwrap().updated);
        assert!(run(&shell, Action::Restart, false).0.unwrap().updated);
        assert_eq!(
            issued(&shell),
            vec!["systemctl --system stop nginx", "systemctl --system restart nginx"]
        );
    }

    #[test]
    fn test_reload_skipped_when_inactive() {
        let shell = ScriptedShell::new();
        shell.respond(SHOW, 0, show("loaded", "inactive", "enabled"));

        assert!(!run(&shell, Action::Reload, false).0.unwrap().updated);
        assert!(issued(&shell).is_empty());
    }

    #[test]
    fn test_enable_and_disable() {
        let disabled = ScriptedShell::new();
        disabled.respond(SHOW, 0, show("loaded", "inactive", "disabled"));
        assert!(run(&disabled, Action::Enable, false).0.unwrap().updated);
        assert!(!run(&disabled, Action::Disable, false).0.unwrap().updated);
        assert_eq!(issued(&disabled), vec!["systemctl --system enable nginx"]);

        let fixed = ScriptedShell::new();
        fixed.respond(SHOW, 0, show("loaded", "active", "static"));
        assert!(!run(&fixed, Action::Enable, false).0.unwrap().updated);
        assert!(!run(&fixed, Action::Disable, false).0.unwrap().updated);
        assert!(issued(&fixed).is_empty());
    }

    #[test]
    fn test_mask_and_unmask() {
        let masked = ScriptedShell::new();
        masked.respond(SHOW, 0, show("masked", "inactive", "masked"));
        assert!(!run(&masked, Action::Mask, false).0.unwrap().updated);
        assert!(run(&masked, Action::Unmask, false).0.unwrap().updated);
        assert_eq!(issued(&masked), vec!["systemctl --system unmask nginx"]);
    }

    #[test]
    fn test_masked_service_cannot_start() {
        let shell = ScriptedShell::new();
        shell.respond(SHOW, 0, show("masked", "inactive", "masked"));

        let err = run(&shell, Action::Start, false).0.unwrap_err();
        assert_eq!(err.failure(), Some(FailureKind::ServiceMasked));

        let (outcome, events) = run(&shell, Action::Start, true);
        assert!(outcome.unwrap().updated);
        assert_eq!(events.assumptions(), vec!["Assuming service nginx would have been unmasked"]);
        assert!(issued(&shell).is_empty());
    }

    #[test]
    fn test_missing_unit() {
        let shell = ScriptedShell::new();
        shell.respond(SHOW, 0, show("not-found", "inactive", ""));

        let err = run(&shell, Action::Start, false).0.unwrap_err();
        assert_eq!(err.failure(), Some(FailureKind::ServiceNotFound));
        // stopping something that is not there is already converged
        assert!(!run(&shell, Action::Stop, false).0.unwrap().updated);
    }

    #[test]
    fn test_incomplete_show_output() {
        let shell = ScriptedShell::new();
        shell.respond(SHOW, 0, "LoadState=loaded\n");

        let err = run(&shell, Action::Start, false).0.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inspection);
    }

    #[test]
    fn test_custom_commands() {
        let shell = ScriptedShell::new();
        shell
            .respond(SHOW, 0, show("loaded", "active", "enabled"))
            .respond("/bin/sh -c 'pgrep -x nginx'", 1, "");
        let ctx = RunContext::new(Config::default()).with_shell(shell.clone());
        let mut resource = ServiceResource::new("nginx");
        resource.status_command = Some("pgrep -x nginx".into());
        resource.start_command = Some("/etc/init.d/nginx start".into());
        let mut provider = ServiceProvider::new(resource);

        let outcome = run_action(&mut provider, Action::Start, &ctx).unwrap();

        assert!(outcome.updated);
        assert!(!provider.facts().running);
        assert!(shell.ran("/bin/sh -c '/etc/init.d/nginx start'"));
        let start = shell.executed().pop().unwrap();
        assert_eq!(start.timeout, Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_start_timeout() {
        let shell = ScriptedShell::new();
        shell
            .respond(SHOW, 0, show("loaded", "inactive", "enabled"))
            .time_out("systemctl --system start");

        let err = run(&shell, Action::Start, false).0.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
