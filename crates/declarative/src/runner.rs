//! Runner - converges a resource collection in declaration order

use crate::collection::ResourceCollection;
use crate::context::RunContext;
use crate::report::{ResourceReport, RunReport};
use crate::types::RunOptions;

/// Converges resources one action at a time.
///
/// Resources run strictly in declaration order and each resource's actions
/// run in the order they were declared. When an action fails:
///
/// - an entry marked `ignore_failure` carries on with its next action
/// - otherwise the entry's remaining actions are skipped, and the whole run
///   stops unless [`RunOptions::continue_on_failure`] is set
pub struct Runner<'a> {
    ctx: &'a RunContext,
    options: RunOptions,
}

impl<'a> Runner<'a> {
    pub fn new(ctx: &'a RunContext, options: RunOptions) -> Self {
        Self { ctx, options }
    }

    pub fn converge(&self, collection: &mut ResourceCollection) -> RunReport {
        let mut report = RunReport::new(self.ctx.why_run());

        'entries: for entry in collection.entries_mut() {
            let resource_type = entry.provider.resource_type();
            for &action in &entry.actions {
                match entry.provider.run_action(action, self.ctx) {
                    Ok(outcome) => {
                        report.push(ResourceReport::from_outcome(resource_type, outcome));
                    }
                    Err(err) => {
                        report.push(ResourceReport::from_error(
                            entry.provider.identity(),
                            resource_type,
                            action,
                            &err,
                            entry.ignore_failure,
                        ));
                        if entry.ignore_failure {
                            log::warn!("{err} (ignored)");
                            continue;
                        }
                        if self.options.continue_on_failure {
                            continue 'entries;
                        }
                        report.aborted = true;
                        break 'entries;
                    }
                }
            }
        }

        log::debug!(
            "Converged {} action(s): {} updated, {} failed",
            report.summary.total(),
            report.summary.updated,
            report.summary.failed
        );
        report
    }
}
