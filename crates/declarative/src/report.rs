//! Run reports
//!
//! One [`ResourceReport`] per (resource, action) pair, in the order the
//! actions ran, plus a [`RunSummary`] of the counts.

use crate::error::Error;
use crate::types::{Action, ActionOutcome};
use serde::Serialize;
use std::collections::BTreeMap;

/// How a single action ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportStatus {
    Updated,
    UpToDate,
    /// Skipped in why-run because a requirement could not be met
    Bypassed,
    Failed { kind: String, error: String },
}

/// Result of one action on one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    pub resource: String,
    pub resource_type: String,
    pub action: Action,
    #[serde(flatten)]
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// A failure the declaration said to ignore
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignored: bool,
}

impl ResourceReport {
    pub fn from_outcome(resource_type: &str, outcome: ActionOutcome) -> Self {
        let status = if outcome.bypassed {
            ReportStatus::Bypassed
        } else if outcome.updated {
            ReportStatus::Updated
        } else {
            ReportStatus::UpToDate
        };
        Self {
            resource: outcome.resource,
            resource_type: resource_type.to_string(),
            action: outcome.action,
            status,
            changes: outcome.changes,
            diff: outcome.diff,
            ignored: false,
        }
    }

    pub fn from_error(
        resource: String,
        resource_type: &str,
        action: Action,
        error: &Error,
        ignored: bool,
    ) -> Self {
        Self {
            resource,
            resource_type: resource_type.to_string(),
            action,
            status: ReportStatus::Failed {
                kind: error.kind().description().to_string(),
                error: error.to_string(),
            },
            changes: Vec::new(),
            diff: None,
            ignored,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ReportStatus::Failed { .. })
    }
}

/// Summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub updated: usize,
    pub up_to_date: usize,
    pub bypassed: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Count one report
    pub fn add(&mut self, status: &ReportStatus) {
        match status {
            ReportStatus::Updated => self.updated += 1,
            ReportStatus::UpToDate => self.up_to_date += 1,
            ReportStatus::Bypassed => self.bypassed += 1,
            ReportStatus::Failed { .. } => self.failed += 1,
        }
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &Self) {
        self.updated += other.updated;
        self.up_to_date += other.up_to_date;
        self.bypassed += other.bypassed;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.updated + self.up_to_date + self.bypassed + self.failed
    }

    pub fn has_changes(&self) -> bool {
        self.updated > 0
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub why_run: bool,
    pub reports: Vec<ResourceReport>,
    pub summary: RunSummary,
    /// A failure stopped the run before every resource was processed
    pub aborted: bool,
}

impl RunReport {
    pub fn new(why_run: bool) -> Self {
        Self {
            why_run,
            ..Self::default()
        }
    }

    pub fn push(&mut self, report: ResourceReport) {
        self.summary.add(&report.status);
        self.reports.push(report);
    }

    /// Whether every failure was one the declarations said to ignore
    pub fn success(&self) -> bool {
        !self.aborted && self.reports.iter().all(|r| !r.is_failed() || r.ignored)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResourceReport> {
        self.reports.iter().filter(|r| r.is_failed())
    }
}

/// Group reports by resource type
pub fn group_by_type(reports: &[ResourceReport]) -> BTreeMap<String, Vec<&ResourceReport>> {
    let mut groups: BTreeMap<String, Vec<&ResourceReport>> = BTreeMap::new();
    for report in reports {
        groups
            .entry(report.resource_type.clone())
            .or_default()
            .push(report);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(resource: &str, updated: bool, bypassed: bool) -> ActionOutcome {
        ActionOutcome {
            resource: resource.to_string(),
            action: Action::Create,
            updated,
            bypassed,
            changes: if updated {
                vec!["create new file /tmp/a".into()]
            } else {
                Vec::new()
            },
            diff: None,
        }
    }

    #[test]
    fn test_status_from_outcome() {
        let updated = ResourceReport::from_outcome("file", outcome("file[/tmp/a]", true, false));
        let current = ResourceReport::from_outcome("file", outcome("file[/tmp/b]", false, false));
        let bypassed = ResourceReport::from_outcome("file", outcome("file[/tmp/c]", false, true));
        assert_eq!(updated.status, ReportStatus::Updated);
        assert_eq!(current.status, ReportStatus::UpToDate);
        assert_eq!(bypassed.status, ReportStatus::Bypassed);
    }

    #[test]
    fn test_summary_counts() {
        let mut report = RunReport::new(false);
        report.push(ResourceReport::from_outcome("file", outcome("file[/tmp/a]", true, false)));
        report.push(ResourceReport::from_outcome("cron", outcome("cron[job]", false, false)));
        let err = Error::invalid("cron[bad]", "minute '61' is out of range");
        report.push(ResourceReport::from_error(
            "cron[bad]".into(),
            "cron",
            Action::Create,
            &err,
            true,
        ));

        assert_eq!(report.summary.updated, 1);
        assert_eq!(report.summary.up_to_date, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.total(), 3);
        assert!(report.success());
        assert_eq!(report.failures().count(), 1);

        let mut merged = RunSummary::default();
        merged.merge(&report.summary);
        merged.merge(&report.summary);
        assert_eq!(merged.total(), 6);
    }

    #[test]
    fn test_unignored_failure_is_not_success() {
        let mut report = RunReport::new(false);
        let err = Error::inspection("service[nginx]", "systemctl not found");
        report.push(ResourceReport::from_error(
            "service[nginx]".into(),
            "service",
            Action::Start,
            &err,
            false,
        ));
        assert!(!report.success());
    }

    #[test]
    fn test_group_by_type() {
        let reports = vec![
            ResourceReport::from_outcome("file", outcome("file[/tmp/a]", true, false)),
            ResourceReport::from_outcome("cron", outcome("cron[job]", false, false)),
            ResourceReport::from_outcome("file", outcome("file[/tmp/b]", false, false)),
        ];
        let groups = group_by_type(&reports);
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["cron", "file"]);
        assert_eq!(groups["file"].len(), 2);
    }

    #[test]
    fn test_serializes_status_inline() {
        let report = ResourceReport::from_outcome("file", outcome("file[/tmp/a]", true, false));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "updated");
        assert_eq!(json["action"], "create");
        assert!(json.get("ignored").is_none());
    }
}
