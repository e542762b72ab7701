//! Provider protocol
//!
//! A [`Provider`] converges one declared resource. Running an action goes
//! through the same steps for every provider:
//!
//! 1. resolve the action to a handler (unknown actions fail before any
//!    inspection happens)
//! 2. reset the resource's bookkeeping and check the declaration for
//!    conflicts
//! 3. load the current state
//! 4. declare and evaluate requirements
//! 5. run the handler unless why-run bypassed it
//! 6. record whether anything changed and emit the result
//!
//! Handlers make changes through [`Converger::converge_by`], which records a
//! description of each step and skips the step itself in why-run. Nothing
//! is rolled back when a later step fails.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::requirements::Requirements;
use crate::resource::Resource;
use crate::types::{Action, ActionOutcome, ResourceStatus};

/// Handler for one action.
pub type ActionFn<P> = fn(&mut P, &mut Converger<'_>) -> Result<()>;

/// Converges a single declared resource.
pub trait Provider: Sized + 'static {
    type Resource: Resource;

    /// Supported actions and their handlers. `Nothing` is always supported
    /// and need not be listed.
    const ACTIONS: &'static [(Action, ActionFn<Self>)];

    /// The declared resource
    fn new_resource(&self) -> &Self::Resource;

    fn new_resource_mut(&mut self) -> &mut Self::Resource;

    /// Observed state, once loaded
    fn current_resource(&self) -> Option<&Self::Resource> {
        None
    }

    /// Reject self-contradictory declarations before anything is inspected.
    fn check_resource_semantics(&self) -> Result<()> {
        Ok(())
    }

    /// Inspect the system and populate the current resource.
    fn load_current_resource(&mut self, ctx: &RunContext) -> Result<()>;

    /// Declare the preconditions of each action.
    fn define_resource_requirements(&self, _requirements: &mut Requirements<Self>, _ctx: &RunContext) {}

    /// Handler registered for `action`.
    fn handler(action: Action) -> Option<ActionFn<Self>> {
        Self::ACTIONS
            .iter()
            .find(|(candidate, _)| *candidate == action)
            .map(|(_, handler)| *handler)
    }
}

/// Handle given to action handlers for recording changes.
pub struct Converger<'a> {
    ctx: &'a RunContext,
    resource: String,
    action: Action,
    changes: Vec<String>,
    updated: bool,
}

impl<'a> Converger<'a> {
    pub fn new(ctx: &'a RunContext, resource: impl Into<String>, action: Action) -> Self {
        Self {
            ctx,
            resource: resource.into(),
            action,
            changes: Vec::new(),
            updated: false,
        }
    }

    pub fn ctx(&self) -> &'a RunContext {
        self.ctx
    }

    pub fn why_run(&self) -> bool {
        self.ctx.why_run()
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Identity of the resource being converged
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Record `description` and, unless in why-run, perform the step.
    pub fn converge_by<F>(&mut self, description: impl Into<String>, step: F) -> Result<()>
    where
        F: FnOnce(&RunContext) -> Result<()>,
    {
        self.converge_by_lines(vec![description.into()], step)
    }

    /// Like [`converge_by`](Self::converge_by) for a step described by
    /// several lines, e.g. a change summary followed by a diff.
    pub fn converge_by_lines<F>(&mut self, descriptions: Vec<String>, step: F) -> Result<()>
    where
        F: FnOnce(&RunContext) -> Result<()>,
    {
        let why_run = self.ctx.why_run();
        if !why_run {
            step(self.ctx)?;
        }
        self.ctx
            .events()
            .update_applied(&self.resource, self.action, &descriptions, why_run);
        self.changes.extend(descriptions);
        Ok(())
    }

    /// Flag the resource updated without a recorded step.
    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    pub fn changes(&self) -> &[String] {
        &self.changes
    }

    pub fn is_updated(&self) -> bool {
        self.updated || !self.changes.is_empty()
    }

    fn into_changes(self) -> Vec<String> {
        self.changes
    }
}

/// Run `action` on `provider`.
pub fn run_action<P: Provider>(
    provider: &mut P,
    action: Action,
    ctx: &RunContext,
) -> Result<ActionOutcome> {
    let identity = provider.new_resource().identity();
    ctx.events().action_start(&identity, action);

    converge_action(provider, action, &identity, ctx)
        .inspect_err(|err| ctx.events().action_failed(&identity, action, err))
}

fn converge_action<P: Provider>(
    provider: &mut P,
    action: Action,
    identity: &str,
    ctx: &RunContext,
) -> Result<ActionOutcome> {
    let handler = if action == Action::Nothing {
        None
    } else {
        Some(P::handler(action).ok_or_else(|| Error::UnsupportedAction {
            resource: identity.to_string(),
            action,
        })?)
    };

    provider.new_resource_mut().status_mut().reset();

    let Some(handler) = handler else {
        ctx.events().up_to_date(identity, action);
        return Ok(ActionOutcome {
            resource: identity.to_string(),
            action,
            updated: false,
            bypassed: false,
            changes: Vec::new(),
            diff: None,
        });
    };

    provider.check_resource_semantics()?;
    provider.load_current_resource(ctx)?;
    ctx.events().current_state_loaded(identity);

    let mut requirements = Requirements::new();
    provider.define_resource_requirements(&mut requirements, ctx);
    let bypassed = requirements.process(provider, action, identity, ctx)?;

    let mut converger = Converger::new(ctx, identity, action);
    let result = if bypassed {
        ctx.events().action_bypassed(identity, action);
        Ok(())
    } else {
        handler(provider, &mut converger)
    };

    let updated = converger.is_updated();
    let status = provider.new_resource_mut().status_mut();
    status.updated = updated;
    let diff = status.diff.clone();
    result?;

    if updated {
        ctx.events().updated(identity, action);
    } else {
        ctx.events().up_to_date(identity, action);
    }

    Ok(ActionOutcome {
        resource: identity.to_string(),
        action,
        updated,
        bypassed,
        changes: converger.into_changes(),
        diff,
    })
}

/// Object-safe view of a provider, so a run can hold providers of
/// different types side by side.
pub trait Converge {
    fn resource_type(&self) -> &'static str;

    fn name(&self) -> &str;

    fn identity(&self) -> String;

    fn supports(&self, action: Action) -> bool;

    fn run_action(&mut self, action: Action, ctx: &RunContext) -> Result<ActionOutcome>;

    fn status(&self) -> &ResourceStatus;
}

impl<P: Provider> Converge for P {
    fn resource_type(&self) -> &'static str {
        self.new_resource().resource_type()
    }

    fn name(&self) -> &str {
        self.new_resource().name()
    }

    fn identity(&self) -> String {
        self.new_resource().identity()
    }

    fn supports(&self, action: Action) -> bool {
        action == Action::Nothing || P::handler(action).is_some()
    }

    fn run_action(&mut self, action: Action, ctx: &RunContext) -> Result<ActionOutcome> {
        run_action(self, action, ctx)
    }

    fn status(&self) -> &ResourceStatus {
        self.new_resource().status()
    }
}
