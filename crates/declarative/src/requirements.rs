//! Resource requirements
//!
//! Providers declare preconditions for their actions as [`Requirement`]s.
//! Each is a predicate over the provider's loaded state plus what to do
//! when it fails:
//!
//! - in real mode the first failing requirement aborts the action
//! - in why-run a requirement with a why-run message is reported as an
//!   assumption instead, its alternative (if any) is applied and, with
//!   `block_action`, the action itself is bypassed
//! - in why-run a requirement without a why-run message is still fatal
//!
//! Requirements that apply to every action are evaluated before the
//! action-specific ones, each group in declaration order.

use crate::context::RunContext;
use crate::error::{Error, FailureKind, Result};
use crate::types::Action;

type Predicate<P> = Box<dyn Fn(&P) -> bool>;
type Alternative<P> = Box<dyn Fn(&mut P)>;

/// A single precondition over provider `P`.
pub struct Requirement<P> {
    predicate: Predicate<P>,
    failure: FailureKind,
    message: String,
    whyrun: Option<String>,
    alternative: Option<Alternative<P>>,
    block_action: bool,
}

impl<P> Requirement<P> {
    /// A requirement that holds when `predicate` returns true.
    pub fn new(predicate: impl Fn(&P) -> bool + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
            failure: FailureKind::Generic,
            message: "requirement failed".to_string(),
            whyrun: None,
            alternative: None,
            block_action: false,
        }
    }

    /// Failure kind and message raised when the predicate is false.
    pub fn failure(mut self, failure: FailureKind, message: impl Into<String>) -> Self {
        self.failure = failure;
        self.message = message.into();
        self
    }

    /// Assumption reported in why-run instead of failing.
    pub fn whyrun(mut self, message: impl Into<String>) -> Self {
        self.whyrun = Some(message.into());
        self
    }

    /// Adjust the provider's state in why-run after the assumption is made.
    pub fn alternative(mut self, alternative: impl Fn(&mut P) + 'static) -> Self {
        self.alternative = Some(Box::new(alternative));
        self
    }

    /// Skip the action in why-run when this requirement fails.
    pub fn block_action(mut self) -> Self {
        self.block_action = true;
        self
    }

    pub fn holds(&self, provider: &P) -> bool {
        (self.predicate)(provider)
    }
}

struct Assertion<P> {
    /// `None` applies to every action
    actions: Option<Vec<Action>>,
    requirement: Requirement<P>,
}

/// The requirements a provider declared for one action run.
pub struct Requirements<P> {
    assertions: Vec<Assertion<P>>,
}

impl<P> Default for Requirements<P> {
    fn default() -> Self {
        Self {
            assertions: Vec::new(),
        }
    }
}

impl<P> Requirements<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `requirement` for the listed actions.
    pub fn assert(&mut self, actions: &[Action], requirement: Requirement<P>) -> &mut Self {
        self.assertions.push(Assertion {
            actions: Some(actions.to_vec()),
            requirement,
        });
        self
    }

    /// Require `requirement` for every action.
    pub fn assert_all(&mut self, requirement: Requirement<P>) -> &mut Self {
        self.assertions.push(Assertion {
            actions: None,
            requirement,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.assertions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty()
    }

    /// Evaluate the requirements that apply to `action`.
    ///
    /// Returns whether the action is blocked (why-run only).
    pub fn process(
        &self,
        provider: &mut P,
        action: Action,
        resource: &str,
        ctx: &RunContext,
    ) -> Result<bool> {
        let general = self.assertions.iter().filter(|a| a.actions.is_none());
        let specific = self
            .assertions
            .iter()
            .filter(|a| a.actions.as_ref().is_some_and(|actions| actions.contains(&action)));

        let mut blocked = false;
        for assertion in general.chain(specific) {
            let requirement = &assertion.requirement;
            if requirement.holds(provider) {
                continue;
            }
            ctx.events()
                .requirement_failed(resource, action, &requirement.message);

            let whyrun = match &requirement.whyrun {
                Some(message) if ctx.why_run() => message,
                _ => {
                    return Err(Error::requirement(
                        resource,
                        requirement.failure,
                        requirement.message.clone(),
                    ));
                }
            };
            ctx.events().whyrun_assumption(resource, action, whyrun);
            if let Some(alternative) = &requirement.alternative {
                alternative(provider);
            }
            blocked |= requirement.block_action;
        }
        Ok(blocked)
    }
}
