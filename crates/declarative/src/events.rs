//! Convergence events
//!
//! Providers and the runner report what they are doing through an
//! [`EventSink`]. Every method has a no-op default, so a sink only
//! implements the events it cares about.

use crate::error::Error;
use crate::types::Action;
use std::cell::RefCell;
use std::rc::Rc;

/// Receiver for convergence events.
pub trait EventSink {
    fn action_start(&self, _resource: &str, _action: Action) {}

    fn current_state_loaded(&self, _resource: &str) {}

    /// A requirement did not hold. In real mode this is followed by a failure.
    fn requirement_failed(&self, _resource: &str, _action: Action, _message: &str) {}

    /// Why-run continued past a failed requirement by assuming `message`.
    fn whyrun_assumption(&self, _resource: &str, _action: Action, _message: &str) {}

    fn action_bypassed(&self, _resource: &str, _action: Action) {}

    /// A converge-by step ran (or would have, when `why_run` is set).
    fn update_applied(&self, _resource: &str, _action: Action, _changes: &[String], _why_run: bool) {}

    fn updated(&self, _resource: &str, _action: Action) {}

    fn up_to_date(&self, _resource: &str, _action: Action) {}

    fn action_failed(&self, _resource: &str, _action: Action, _error: &Error) {}
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl EventSink for NoEvents {}

/// Writes events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEvents;

impl EventSink for LogEvents {
    fn action_start(&self, resource: &str, action: Action) {
        log::debug!("Processing {resource} action {action}");
    }

    fn current_state_loaded(&self, resource: &str) {
        log::trace!("Loaded current state of {resource}");
    }

    fn requirement_failed(&self, resource: &str, action: Action, message: &str) {
        log::debug!("{resource} action {action}: requirement failed: {message}");
    }

    fn whyrun_assumption(&self, resource: &str, _action: Action, message: &str) {
        log::info!("{resource}: {message}");
    }

    fn action_bypassed(&self, resource: &str, action: Action) {
        log::info!("{resource}: action {action} skipped in why-run mode");
    }

    fn update_applied(&self, resource: &str, _action: Action, changes: &[String], why_run: bool) {
        let prefix = if why_run { "Would " } else { "" };
        for change in changes {
            log::info!("{resource}: {prefix}{change}");
        }
    }

    fn updated(&self, resource: &str, action: Action) {
        log::info!("{resource} action {action} (updated)");
    }

    fn up_to_date(&self, resource: &str, action: Action) {
        log::debug!("{resource} action {action} (up to date)");
    }

    fn action_failed(&self, resource: &str, action: Action, error: &Error) {
        log::error!("{resource} action {action} failed: {error}");
    }
}

/// An event captured by [`RecordingEvents`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ActionStart { resource: String, action: Action },
    CurrentStateLoaded { resource: String },
    RequirementFailed { resource: String, action: Action, message: String },
    WhyrunAssumption { resource: String, action: Action, message: String },
    ActionBypassed { resource: String, action: Action },
    UpdateApplied {
        resource: String,
        action: Action,
        changes: Vec<String>,
        why_run: bool,
    },
    Updated { resource: String, action: Action },
    UpToDate { resource: String, action: Action },
    ActionFailed { resource: String, action: Action, error: String },
}

/// Keeps every event in memory.
///
/// Clones share the same log, so tests can hand one clone to a
/// [`RunContext`](crate::context::RunContext) and read the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingEvents {
    events: Rc<RefCell<Vec<Event>>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Every change description reported so far, in order.
    pub fn changes(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::UpdateApplied { changes, .. } => Some(changes.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Every why-run assumption reported so far, in order.
    pub fn assumptions(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::WhyrunAssumption { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl EventSink for RecordingEvents {
    fn action_start(&self, resource: &str, action: Action) {
        self.push(Event::ActionStart {
            resource: resource.to_string(),
            action,
        });
    }

    fn current_state_loaded(&self, resource: &str) {
        self.push(Event::CurrentStateLoaded {
            resource: resource.to_string(),
        });
    }

    fn requirement_failed(&self, resource: &str, action: Action, message: &str) {
        self.push(Event::RequirementFailed {
            resource: resource.to_string(),
            action,
            message: message.to_string(),
        });
    }

    fn whyrun_assumption(&self, resource: &str, action: Action, message: &str) {
        self.push(Event::WhyrunAssumption {
            resource: resource.to_string(),
            action,
            message: message.to_string(),
        });
    }

    fn action_bypassed(&self, resource: &str, action: Action) {
        self.push(Event::ActionBypassed {
            resource: resource.to_string(),
            action,
        });
    }

    fn update_applied(&self, resource: &str, action: Action, changes: &[String], why_run: bool) {
        self.push(Event::UpdateApplied {
            resource: resource.to_string(),
            action,
            changes: changes.to_vec(),
            why_run,
        });
    }

    fn updated(&self, resource: &str, action: Action) {
        self.push(Event::Updated {
            resource: resource.to_string(),
            action,
        });
    }

    fn up_to_date(&self, resource: &str, action: Action) {
        self.push(Event::UpToDate {
            resource: resource.to_string(),
            action,
        });
    }

    fn action_failed(&self, resource: &str, action: Action, error: &Error) {
        self.push(Event::ActionFailed {
            resource: resource.to_string(),
            action,
            error: error.to_string(),
        });
    }
}
