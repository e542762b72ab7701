//! Registry key resource
//!
//! Keys and values are reached through a [`RegistryStore`], so the provider
//! runs anywhere a store exists. [`MemoryRegistry`] keeps everything in
//! memory. Key paths and value names compare case-insensitively, as the
//! Windows registry does.

use declarative::{
    Action, ActionFn, Converger, Error, FailureKind, IoResultExt, Provider, Requirement,
    Requirements, Resource, ResourceStatus, Result, RunContext,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::rc::Rc;

/// Registry view to operate on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// Native view of the running machine
    #[default]
    Machine,
    I386,
    X86_64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    ExpandString,
    MultiString,
    Dword,
    DwordBigEndian,
    Qword,
    Binary,
}

/// Value data as declared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistryData {
    Number(u64),
    Text(String),
    Lines(Vec<String>),
}

impl fmt::Display for RegistryData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Lines(lines) => write!(f, "{lines:?}"),
        }
    }
}

/// A named value under a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryValue {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub data: RegistryData,
}

impl RegistryValue {
    pub fn new(name: impl Into<String>, value_type: ValueType, data: RegistryData) -> Self {
        Self {
            name: name.into(),
            value_type,
            data,
        }
    }

    fn same_name(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }

    fn matches(&self, other: &Self) -> bool {
        self.same_name(other) && self.value_type == other.value_type && self.data == other.data
    }

    /// Check the data has the shape the type needs.
    fn validate(&self) -> std::result::Result<(), String> {
        let fits = match self.value_type {
            ValueType::String | ValueType::ExpandString => matches!(self.data, RegistryData::Text(_)),
            ValueType::MultiString => matches!(self.data, RegistryData::Lines(_)),
            ValueType::Dword | ValueType::DwordBigEndian => {
                matches!(self.data, RegistryData::Number(n) if u32::try_from(n).is_ok())
            }
            ValueType::Qword => matches!(self.data, RegistryData::Number(_)),
            ValueType::Binary => {
                matches!(&self.data, RegistryData::Text(hex) if hex.len() % 2 == 0 && hex.chars().all(|c| c.is_ascii_hexdigit()))
            }
        };
        if fits {
            Ok(())
        } else {
            Err(format!("value '{}': data {} does not fit type {:?}", self.name, self.data, self.value_type))
        }
    }

    /// Data for change descriptions; binary data is not shown.
    fn display_data(&self) -> String {
        if self.value_type == ValueType::Binary {
            "<binary data>".to_string()
        } else {
            self.data.to_string()
        }
    }
}

/// Access to a registry.
///
/// Every operation takes the full key path (`HKLM\Software\...`) and the
/// registry view to use.
pub trait RegistryStore {
    fn key_exists(&self, key: &str, arch: Architecture) -> io::Result<bool>;

    fn get_values(&self, key: &str, arch: Architecture) -> io::Result<Vec<RegistryValue>>;

    fn set_value(&self, key: &str, arch: Architecture, value: &RegistryValue) -> io::Result<()>;

    fn delete_value(&self, key: &str, arch: Architecture, name: &str) -> io::Result<()>;

    /// Create `key`, and its missing parents when `recursive`.
    fn create_key(&self, key: &str, arch: Architecture, recursive: bool) -> io::Result<()>;

    /// Delete `key`, and its subkeys when `recursive`.
    fn delete_key(&self, key: &str, arch: Architecture, recursive: bool) -> io::Result<()>;

    fn has_subkeys(&self, key: &str, arch: Architecture) -> io::Result<bool>;
}

const HIVES: [&str; 10] = [
    "HKLM",
    "HKEY_LOCAL_MACHINE",
    "HKCU",
    "HKEY_CURRENT_USER",
    "HKU",
    "HKEY_USERS",
    "HKCR",
    "HKEY_CLASSES_ROOT",
    "HKCC",
    "HKEY_CURRENT_CONFIG",
];

fn hive(key: &str) -> &str {
    key.split('\\').next().unwrap_or_default()
}

fn parent_key(key: &str) -> Option<&str> {
    key.rsplit_once('\\').map(|(parent, _)| parent)
}

/// Registry held in memory, keyed by lowercased path.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    keys: RefCell<BTreeMap<(Architecture, String), Vec<RegistryValue>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(key: &str) -> String {
        key.trim_end_matches('\\').to_ascii_lowercase()
    }

    fn not_found(key: &str) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("registry key {key} does not exist"))
    }

    fn exists(&self, key: &str, arch: Architecture) -> bool {
        let key = Self::normalize(key);
        // hives always exist
        !key.contains('\\') || self.keys.borrow().contains_key(&(arch, key))
    }

    fn subkeys(&self, key: &str, arch: Architecture) -> Vec<String> {
        let prefix = format!("{}\\", Self::normalize(key));
        self.keys
            .borrow()
            .keys()
            .filter(|(a, k)| *a == arch && k.starts_with(&prefix))
            .map(|(_, k)| k.clone())
            .collect()
    }
}

impl RegistryStore for MemoryRegistry {
    fn key_exists(&self, key: &str, arch: Architecture) -> io::Result<bool> {
        Ok(self.exists(key, arch))
    }

    fn get_values(&self, key: &str, arch: Architecture) -> io::Result<Vec<RegistryValue>> {
        self.keys
            .borrow()
            .get(&(arch, Self::normalize(key)))
            .cloned()
            .ok_or_else(|| Self::not_found(key))
    }

    fn set_value(&self, key: &str, arch: Architecture, value: &RegistryValue) -> io::Result<()> {
        let mut keys = self.keys.borrow_mut();
        let values = keys
            .get_mut(&(arch, Self::normalize(key)))
            .ok_or_else(|| Self::not_found(key))?;
        match values.iter_mut().find(|v| v.same_name(value)) {
            Some(existing) => *existing = value.clone(),
            None => values.push(value.clone()),
        }
        Ok(())
    }

    fn delete_value(&self, key: &str, arch: Architecture, name: &str) -> io::Result<()> {
        let mut keys = self.keys.borrow_mut();
        let values = keys
            .get_mut(&(arch, Self::normalize(key)))
            .ok_or_else(|| Self::not_found(key))?;
        values.retain(|v| !v.name.eq_ignore_ascii_case(name));
        Ok(())
    }

    fn create_key(&self, key: &str, arch: Architecture, recursive: bool) -> io::Result<()> {
        if let Some(parent) = parent_key(key)
            && !self.exists(parent, arch)
        {
            if !recursive {
                return Err(Self::not_found(parent));
            }
            self.create_key(parent, arch, true)?;
        }
        self.keys
            .borrow_mut()
            .entry((arch, Self::normalize(key)))
            .or_default();
        Ok(())
    }

    fn delete_key(&self, key: &str, arch: Architecture, recursive: bool) -> io::Result<()> {
        let subkeys = self.subkeys(key, arch);
        if !subkeys.is_empty() && !recursive {
            return Err(io::Error::other(format!("registry key {key} has subkeys")));
        }
        let mut keys = self.keys.borrow_mut();
        for subkey in subkeys {
            keys.remove(&(arch, subkey));
        }
        keys.remove(&(arch, Self::normalize(key)));
        Ok(())
    }

    fn has_subkeys(&self, key: &str, arch: Architecture) -> io::Result<bool> {
        Ok(!self.subkeys(key, arch).is_empty())
    }
}

/// A registry key and the values it should hold
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistryKeyResource {
    pub name: String,
    /// Full key path; defaults to the name
    pub key: String,
    pub values: Vec<RegistryValue>,
    pub architecture: Architecture,
    /// Create missing parent keys; delete subkeys
    pub recursive: bool,
    #[serde(skip)]
    pub status: ResourceStatus,
}

impl RegistryKeyResource {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            ..Self::default()
        }
    }

    pub fn value(mut self, value: RegistryValue) -> Self {
        self.values.push(value);
        self
    }
}

impl Resource for RegistryKeyResource {
    fn resource_type(&self) -> &'static str {
        "registry_key"
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

/// Converges a [`RegistryKeyResource`] through a [`RegistryStore`]
pub struct RegistryKeyProvider {
    new_resource: RegistryKeyResource,
    store: Rc<dyn RegistryStore>,
    key_exists: bool,
    parent_exists: bool,
    has_subkeys: bool,
    current_values: Vec<RegistryValue>,
}

impl fmt::Debug for RegistryKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryKeyProvider")
            .field("new_resource", &self.new_resource)
            .field("key_exists", &self.key_exists)
            .field("current_values", &self.current_values)
            .finish_non_exhaustive()
    }
}

impl RegistryKeyProvider {
    pub fn new(resource: RegistryKeyResource, store: Rc<dyn RegistryStore>) -> Self {
        Self {
            new_resource: resource,
            store,
            key_exists: false,
            parent_exists: true,
            has_subkeys: false,
            current_values: Vec::new(),
        }
    }

    fn current(&self, wanted: &RegistryValue) -> Option<&RegistryValue> {
        self.current_values.iter().find(|v| v.same_name(wanted))
    }

    fn ensure_key(&self, conv: &mut Converger<'_>) -> Result<()> {
        if self.key_exists {
            return Ok(());
        }
        let identity = conv.resource().to_string();
        let resource = &self.new_resource;
        let store = Rc::clone(&self.store);
        conv.converge_by(format!("create key {}", resource.key), |_| {
            store
                .create_key(&resource.key, resource.architecture, resource.recursive)
                .io_context(&identity, || format!("failed to create key {}", resource.key))
        })
    }

    fn set_values<F>(&self, conv: &mut Converger<'_>, needs_update: F) -> Result<()>
    where
        F: Fn(&RegistryValue, Option<&RegistryValue>) -> bool,
    {
        let identity = conv.resource().to_string();
        let resource = &self.new_resource;
        for value in &resource.values {
            let current = self.current(value);
            if !needs_update(value, current) {
                continue;
            }
            let description = match current {
                Some(old) => format!(
                    "set value {} in {} from {} to {}",
                    value.name,
                    resource.key,
                    old.display_data(),
                    value.display_data()
                ),
                None => format!("set value {} in {} to {}", value.name, resource.key, value.display_data()),
            };
            let store = Rc::clone(&self.store);
            conv.converge_by(description, |_| {
                store
                    .set_value(&resource.key, resource.architecture, value)
                    .io_context(&identity, || format!("failed to set value {} in {}", value.name, resource.key))
            })?;
        }
        Ok(())
    }

    fn action_create(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        self.ensure_key(conv)?;
        self.set_values(conv, |wanted, current| !current.is_some_and(|c| c.matches(wanted)))
    }

    fn action_create_if_missing(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        self.ensure_key(conv)?;
        self.set_values(conv, |_, current| current.is_none())
    }

    fn action_delete(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if !self.key_exists {
            return Ok(());
        }
        let identity = conv.resource().to_string();
        let resource = &self.new_resource;
        for value in &resource.values {
            let Some(current) = self.current(value) else {
                continue;
            };
            let store = Rc::clone(&self.store);
            conv.converge_by(format!("delete value {} from {}", current.name, resource.key), |_| {
                store
                    .delete_value(&resource.key, resource.architecture, &current.name)
                    .io_context(&identity, || format!("failed to delete value {}", current.name))
            })?;
        }
        Ok(())
    }

    fn action_delete_key(&mut self, conv: &mut Converger<'_>) -> Result<()> {
        if !self.key_exists {
            return Ok(());
        }
        let identity = conv.resource().to_string();
        let resource = &self.new_resource;
        let store = Rc::clone(&self.store);
        conv.converge_by(format!("delete key {}", resource.key), |_| {
            store
                .delete_key(&resource.key, resource.architecture, resource.recursive)
                .io_context(&identity, || format!("failed to delete key {}", resource.key))
        })
    }
}

impl Provider for RegistryKeyProvider {
    type Resource = RegistryKeyResource;

    const ACTIONS: &'static [(Action, ActionFn<Self>)] = &[
        (Action::Create, Self::action_create),
        (Action::CreateIfMissing, Self::action_create_if_missing),
        (Action::Delete, Self::action_delete),
        (Action::DeleteKey, Self::action_delete_key),
    ];

    fn new_resource(&self) -> &RegistryKeyResource {
        &self.new_resource
    }

    fn new_resource_mut(&mut self) -> &mut RegistryKeyResource {
        &mut self.new_resource
    }

    fn check_resource_semantics(&self) -> Result<()> {
        let identity = self.new_resource.identity();
        let key = &self.new_resource.key;
        if !HIVES.iter().any(|h| h.eq_ignore_ascii_case(hive(key))) {
            return Err(Error::invalid(identity, format!("'{key}' does not start with a registry hive")));
        }
        for value in &self.new_resource.values {
            value.validate().map_err(|message| Error::invalid(&identity, message))?;
        }
        Ok(())
    }

    fn load_current_resource(&mut self, _ctx: &RunContext) -> Result<()> {
        let identity = self.new_resource.identity();
        let key = self.new_resource.key.clone();
        let arch = self.new_resource.architecture;
        let inspect = |e: io::Error| Error::inspection(&identity, format!("{key}: {e}"));

        self.key_exists = self.store.key_exists(&key, arch).map_err(inspect)?;
        self.parent_exists = match parent_key(&key) {
            Some(parent) => self.store.key_exists(parent, arch).map_err(inspect)?,
            None => true,
        };
        if self.key_exists {
            self.current_values = self.store.get_values(&key, arch).map_err(inspect)?;
            self.has_subkeys = self.store.has_subkeys(&key, arch).map_err(inspect)?;
        } else {
            self.current_values.clear();
            self.has_subkeys = false;
        }
        log::debug!(
            "{identity}: key {} with {} value(s)",
            if self.key_exists { "exists" } else { "missing" },
            self.current_values.len()
        );
        Ok(())
    }

    fn define_resource_requirements(&self, requirements: &mut Requirements<Self>, _ctx: &RunContext) {
        let key = &self.new_resource.key;
        let parent = parent_key(key).unwrap_or_default().to_string();
        requirements.assert(
            &[Action::Create, Action::CreateIfMissing],
            Requirement::new(|p: &Self| p.key_exists || p.parent_exists || p.new_resource.recursive)
                .failure(
                    FailureKind::RegistryKeyMissing,
                    format!("Parent of key {key} does not exist and recursive is false"),
                )
                .whyrun(format!("Assuming parent key {parent} would have been created")),
        );
        requirements.assert(
            &[Action::DeleteKey],
            Requirement::new(|p: &Self| !p.has_subkeys || p.new_resource.recursive).failure(
                FailureKind::Generic,
                format!("Cannot delete key {key}: it has subkeys and recursive is false"),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ActionOutcome, Config, ErrorKind, RecordingEvents, run_action};

    const KEY: &str = r"HKLM\Software\Converge\Testing";

    fn string(name: &str, data: &str) -> RegistryValue {
        RegistryValue::new(name, ValueType::String, RegistryData::Text(data.into()))
    }

    fn store() -> Rc<MemoryRegistry> {
        let store = Rc::new(MemoryRegistry::new());
        store.create_key(r"HKLM\Software\Converge", Architecture::Machine, true).unwrap();
        store
    }

    fn run(
        store: &Rc<MemoryRegistry>,
        resource: RegistryKeyResource,
        action: Action,
        why_run: bool,
    ) -> (Result<ActionOutcome>, RecordingEvents) {
        let events = RecordingEvents::new();
        let ctx = RunContext::new(Config {
            why_run,
            ..Config::default()
        })
        .with_events(events.clone());
        let store: Rc<dyn RegistryStore> = store.clone();
        let mut provider = RegistryKeyProvider::new(resource, store);
        (run_action(&mut provider, action, &ctx), events)
    }

    #[test]
    fn test_create_key_and_value() {
        let store = store();
        let resource = RegistryKeyResource::new(KEY).value(string("one", "1"));

        let (outcome, events) = run(&store, resource.clone(), Action::Create, false);

        assert!(outcome.unwrap().updated);
        assert_eq!(
            events.changes(),
            vec![format!("create key {KEY}"), format!("set value one in {KEY} to \"1\"")]
        );
        assert_eq!(store.get_values(KEY, Architecture::Machine).unwrap(), vec![string("one", "1")]);

        assert!(!run(&store, resource, Action::Create, false).0.unwrap().updated);
    }

    #[test]
    fn test_case_insensitive_match() {
        let store = store();
        store.create_key(KEY, Architecture::Machine, false).unwrap();
        store.set_value(KEY, Architecture::Machine, &string("One", "1")).unwrap();
        let resource = RegistryKeyResource::new(KEY.to_lowercase()).value(string("one", "1"));

        let (outcome, events) = run(&store, resource, Action::Create, false);
        assert!(!outcome.unwrap().updated);
        assert!(events.changes().is_empty());
    }

    #[test]
    fn test_wrong_data_and_type() {
        let store = store();
        store.create_key(KEY, Architecture::Machine, false).unwrap();
        store.set_value(KEY, Architecture::Machine, &string("one", "2")).unwrap();
        let resource = RegistryKeyResource::new(KEY).value(string("one", "1"));

        let (outcome, events) = run(&store, resource.clone(), Action::CreateIfMissing, false);
        assert!(!outcome.unwrap().updated);
        assert!(events.changes().is_empty());

        let (outcome, events) = run(&store, resource, Action::Create, false);
        assert!(outcome.unwrap().updated);
        assert_eq!(events.changes(), vec![format!("set value one in {KEY} from \"2\" to \"1\"")]);

        let multi = RegistryValue::new("one", ValueType::MultiString, RegistryData::Lines(vec!["1".into()]));
        let resource = RegistryKeyResource::new(KEY).value(multi.clone());
        assert!(run(&store, resource, Action::Create, false).0.unwrap().updated);
        assert_eq!(store.get_values(KEY, Architecture::Machine).unwrap(), vec![multi]);
    }

    #[test]
    fn test_missing_parent() {
        let store = Rc::new(MemoryRegistry::new());
        let resource = RegistryKeyResource::new(KEY);

        let err = run(&store, resource.clone(), Action::Create, false).0.unwrap_err();
        assert_eq!(err.failure(), Some(FailureKind::RegistryKeyMissing));

        let (outcome, events) = run(&store, resource.clone(), Action::Create, true);
        assert!(outcome.unwrap().updated);
        assert_eq!(events.assumptions().len(), 1);
        assert!(!store.key_exists(KEY, Architecture::Machine).unwrap());

        let mut recursive = resource;
        recursive.recursive = true;
        assert!(run(&store, recursive, Action::Create, false).0.unwrap().updated);
        assert!(store.key_exists(r"HKLM\Software", Architecture::Machine).unwrap());
        assert!(store.key_exists(KEY, Architecture::Machine).unwrap());
    }

    #[test]
    fn test_delete_value() {
        let store = store();
        store.create_key(KEY, Architecture::Machine, false).unwrap();
        store.set_value(KEY, Architecture::Machine, &string("one", "1")).unwrap();
        store.set_value(KEY, Architecture::Machine, &string("two", "2")).unwrap();
        let resource = RegistryKeyResource::new(KEY).value(string("one", "wrong data"));

        let (outcome, _) = run(&store, resource.clone(), Action::Delete, false);
        assert!(outcome.unwrap().updated);
        assert_eq!(store.get_values(KEY, Architecture::Machine).unwrap(), vec![string("two", "2")]);

        assert!(!run(&store, resource, Action::Delete, false).0.unwrap().updated);
    }

    #[test]
    fn test_delete_key_with_subkeys() {
        let store = store();
        store.create_key(&format!(r"{KEY}\Child"), Architecture::Machine, true).unwrap();
        let mut resource = RegistryKeyResource::new(KEY);

        let err = run(&store, resource.clone(), Action::DeleteKey, false).0.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Assertion);

        resource.recursive = true;
        assert!(run(&store, resource.clone(), Action::DeleteKey, false).0.unwrap().updated);
        assert!(!store.key_exists(KEY, Architecture::Machine).unwrap());
        assert!(!run(&store, resource, Action::DeleteKey, false).0.unwrap().updated);
    }

    #[test]
    fn test_architectures_are_separate() {
        let store = store();
        let mut resource = RegistryKeyResource::new(KEY);
        resource.architecture = Architecture::I386;
        resource.recursive = true;

        assert!(run(&store, resource, Action::Create, false).0.unwrap().updated);
        assert!(store.key_exists(KEY, Architecture::I386).unwrap());
        assert!(!store.key_exists(KEY, Architecture::Machine).unwrap());
    }

    #[test]
    fn test_invalid_declarations() {
        let store = store();
        let err = run(&store, RegistryKeyResource::new(r"HKXX\Software"), Action::Create, false)
            .0
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let dword = RegistryValue::new("n", ValueType::Dword, RegistryData::Text("x".into()));
        let err = run(&store, RegistryKeyResource::new(KEY).value(dword), Action::Create, false)
            .0
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_binary_data_is_not_shown() {
        let store = store();
        let binary = RegistryValue::new("blob", ValueType::Binary, RegistryData::Text("ff00".into()));
        let resource = RegistryKeyResource::new(KEY).value(binary);

        let (_, events) = run(&store, resource, Action::Create, false);
        assert_eq!(events.changes()[1], format!("set value blob in {KEY} to <binary data>"));
    }
}
