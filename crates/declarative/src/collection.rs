//! Resource collection - declared resources in run order

use crate::error::{Error, Result};
use crate::provider::Converge;
use crate::types::Action;

/// One declared resource with the actions to run on it.
pub struct Entry {
    pub provider: Box<dyn Converge>,
    /// Actions to run, in order
    pub actions: Vec<Action>,
    /// Keep going if this resource fails
    pub ignore_failure: bool,
}

impl Entry {
    pub fn new(provider: Box<dyn Converge>, actions: Vec<Action>) -> Self {
        Self {
            provider,
            actions,
            ignore_failure: false,
        }
    }

    pub fn ignore_failure(mut self, ignore: bool) -> Self {
        self.ignore_failure = ignore;
        self
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("resource", &self.provider.identity())
            .field("actions", &self.actions)
            .field("ignore_failure", &self.ignore_failure)
            .finish()
    }
}

/// Declared resources in declaration order.
#[derive(Debug, Default)]
pub struct ResourceCollection {
    entries: Vec<Entry>,
}

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every declared action has a handler.
    pub fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            if let Some(&action) = entry
                .actions
                .iter()
                .find(|&&action| !entry.provider.supports(action))
            {
                return Err(Error::UnsupportedAction {
                    resource: entry.provider.identity(),
                    action,
                });
            }
        }
        Ok(())
    }

    /// Keep only entries matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Converge) -> bool,
    {
        Self {
            entries: self
                .entries
                .into_iter()
                .filter(|e| predicate(e.provider.as_ref()))
                .collect(),
        }
    }

    /// Keep only entries matching a target pattern
    ///
    /// Target format: "type" or "type.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (resource_type, name) = parse_target(t);
                self.filter(|r| matches_filter(r, &resource_type, name.as_deref()))
            }
        }
    }
}

/// Parse a target string like "type.name" into (type, name)
///
/// Only the first dot separates, so names may contain dots.
pub fn parse_target(target: &str) -> (String, Option<String>) {
    match target.split_once('.') {
        Some((resource_type, name)) => (resource_type.to_string(), Some(name.to_string())),
        None => (target.to_string(), None),
    }
}

/// Check if a resource matches the filter criteria
fn matches_filter(resource: &dyn Converge, resource_type: &str, name: Option<&str>) -> bool {
    let actual = resource.resource_type();
    // Allow plural aliases
    let matches_type = match resource_type {
        "directories" => actual == "directory",
        "registry" | "registry_keys" => actual == "registry_key",
        _ => actual == resource_type || resource_type.strip_suffix('s') == Some(actual),
    };
    if !matches_type {
        return false;
    }

    name.is_none_or(|n| resource.name().contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::tests::MarkerProvider;

    fn collection() -> ResourceCollection {
        let mut collection = ResourceCollection::new();
        collection.push(Entry::new(Box::new(MarkerProvider::new("motd")), vec![Action::Create]));
        collection.push(Entry::new(
            Box::new(MarkerProvider::new("app.conf")),
            vec![Action::Delete],
        ));
        collection
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("file"), ("file".into(), None));
        assert_eq!(
            parse_target("file./etc/app.conf"),
            ("file".into(), Some("/etc/app.conf".into()))
        );
    }

    #[test]
    fn test_filter_by_type() {
        assert_eq!(collection().filter_by_target(Some("marker")).len(), 2);
        assert_eq!(collection().filter_by_target(Some("markers")).len(), 2);
        assert!(collection().filter_by_target(Some("file")).is_empty());
        assert_eq!(collection().filter_by_target(None).len(), 2);
    }

    #[test]
    fn test_filter_by_name() {
        let filtered = collection().filter_by_target(Some("marker.app.conf"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.entries()[0].provider.identity(), "marker[app.conf]");
    }

    #[test]
    fn test_validate_rejects_unsupported_actions() {
        let mut collection = collection();
        assert!(collection.validate().is_ok());

        collection.push(Entry::new(
            Box::new(MarkerProvider::new("svc")),
            vec![Action::Create, Action::Restart],
        ));
        let err = collection.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAction);
        assert_eq!(err.resource(), "marker[svc]");
    }
}
