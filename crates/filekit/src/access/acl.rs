//! Entry-list access control.
//!
//! Platforms without owner/group/mode describe access as a list of
//! principal → rights entries plus an "inherit from parent" flag. Entries
//! are compared as a set: order and duplicates do not matter.

use super::AccessReconciler;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// One allow or deny entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AclEntry {
    pub principal: String,
    pub rights: BTreeSet<String>,
    #[serde(default)]
    pub deny: bool,
}

impl AclEntry {
    pub fn allow<I, S>(principal: impl Into<String>, rights: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            principal: principal.into(),
            rights: rights.into_iter().map(Into::into).collect(),
            deny: false,
        }
    }

    pub fn deny<I, S>(principal: impl Into<String>, rights: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deny: true,
            ..Self::allow(principal, rights)
        }
    }

    fn label(&self) -> String {
        let verb = if self.deny { "deny" } else { "allow" };
        let rights: Vec<&str> = self.rights.iter().map(String::as_str).collect();
        format!("{verb} {}:{}", self.principal, rights.join("+"))
    }
}

/// Desired entries and inheritance. Unset parts are not managed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclSpec {
    pub entries: Option<Vec<AclEntry>>,
    pub inherits: Option<bool>,
}

impl AclSpec {
    pub fn is_empty(&self) -> bool {
        self.entries.is_none() && self.inherits.is_none()
    }
}

/// Explicit entries and inheritance flag as stored on a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclState {
    pub entries: Vec<AclEntry>,
    pub inherits: bool,
}

impl Default for AclState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            inherits: true,
        }
    }
}

/// Reads and writes entry-list ACLs.
pub trait AclBackend {
    fn read(&self, path: &Path) -> Result<AclState>;

    fn write(&self, path: &Path, state: &AclState) -> Result<()>;

    fn principal_exists(&self, principal: &str) -> bool;
}

fn normalize(entries: &[AclEntry]) -> BTreeSet<AclEntry> {
    let mut merged: BTreeMap<(String, bool), BTreeSet<String>> = BTreeMap::new();
    for entry in entries {
        merged
            .entry((entry.principal.clone(), entry.deny))
            .or_default()
            .extend(entry.rights.iter().cloned());
    }
    merged
        .into_iter()
        .map(|((principal, deny), rights)| AclEntry {
            principal,
            rights,
            deny,
        })
        .collect()
}

fn render(entries: &BTreeSet<AclEntry>) -> String {
    let labels: Vec<String> = entries.iter().map(AclEntry::label).collect();
    format!("[{}]", labels.join(", "))
}

/// ACL reconciliation for one path.
pub struct AclAccess<'a> {
    path: PathBuf,
    spec: AclSpec,
    backend: &'a dyn AclBackend,
    current: AclState,
}

impl<'a> AclAccess<'a> {
    /// Check principals and read the current ACL.
    pub fn new(path: impl Into<PathBuf>, spec: &AclSpec, backend: &'a dyn AclBackend) -> Result<Self> {
        let path = path.into();
        for entry in spec.entries.iter().flatten() {
            if !backend.principal_exists(&entry.principal) {
                return Err(Error::NoSuchUser(entry.principal.clone()));
            }
        }
        let current = backend.read(&path)?;
        Ok(Self {
            path,
            spec: spec.clone(),
            backend,
            current,
        })
    }

    fn should_update_entries(&self) -> bool {
        self.spec
            .entries
            .as_ref()
            .is_some_and(|wanted| normalize(wanted) != normalize(&self.current.entries))
    }

    fn should_update_inherits(&self) -> bool {
        self.spec
            .inherits
            .is_some_and(|wanted| wanted != self.current.inherits)
    }
}

impl AccessReconciler for AclAccess<'_> {
    fn compare(&self) -> bool {
        self.should_update_entries() || self.should_update_inherits()
    }

    fn describe_changes(&self) -> Vec<String> {
        let mut changes = Vec::new();
        if self.should_update_entries()
            && let Some(wanted) = &self.spec.entries
        {
            changes.push(format!(
                "change acl entries from {} to {}",
                render(&normalize(&self.current.entries)),
                render(&normalize(wanted))
            ));
        }
        if self.should_update_inherits()
            && let Some(wanted) = self.spec.inherits
        {
            changes.push(format!(
                "change inherits from '{}' to '{wanted}'",
                self.current.inherits
            ));
        }
        changes
    }

    fn apply(&mut self) -> Result<()> {
        if !self.compare() {
            return Ok(());
        }
        let mut next = self.current.clone();
        if let Some(wanted) = &self.spec.entries {
            next.entries = normalize(wanted).into_iter().collect();
        }
        if let Some(inherits) = self.spec.inherits {
            next.inherits = inherits;
        }
        self.backend.write(&self.path, &next)?;
        log::info!("updated acl on {}", self.path.display());
        self.current = self.backend.read(&self.path)?;
        Ok(())
    }
}

/// In-memory ACL store.
#[derive(Debug, Default)]
pub struct MemoryAcl {
    principals: HashSet<String>,
    acls: RefCell<BTreeMap<PathBuf, AclState>>,
}

impl MemoryAcl {
    pub fn new<I, S>(principals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            principals: principals.into_iter().map(Into::into).collect(),
            acls: RefCell::default(),
        }
    }

    pub fn get(&self, path: &Path) -> Option<AclState> {
        self.acls.borrow().get(path).cloned()
    }
}

impl AclBackend for MemoryAcl {
    fn read(&self, path: &Path) -> Result<AclState> {
        Ok(self.get(path).unwrap_or_default())
    }

    fn write(&self, path: &Path, state: &AclState) -> Result<()> {
        self.acls
            .borrow_mut()
            .insert(path.to_path_buf(), state.clone());
        Ok(())
    }

    fn principal_exists(&self, principal: &str) -> bool {
        self.principals.contains(principal)
    }
}
