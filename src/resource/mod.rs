//! Resource declarations
//!
//! A declaration file is TOML with one `[[resource]]` table per resource,
//! converged in the order written:
//!
//! ```toml
//! [[resource]]
//! type = "file"
//! name = "/etc/motd"
//! content = "hello\n"
//! mode = "0644"
//!
//! [[resource]]
//! type = "service"
//! name = "nginx"
//! action = ["enable", "start"]
//! ```
//!
//! `type` selects the provider, `action` is a string or a list (each type
//! has a default), and `ignore_failure` keeps the run going when the
//! resource fails. Every other key is a property of the resource.

pub mod cron;
pub mod directory;
pub mod execute;
pub mod file;
pub mod filesystem;
pub mod link;
pub mod registry;
pub mod service;

use crate::paths;
use anyhow::{Context, Result, bail};
use declarative::{Action, Converge, Entry, ResourceCollection};
use filekit::AclBackend;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use cron::{CronProvider, CronResource};
use directory::{DirectoryProvider, DirectoryResource};
use execute::{ExecuteProvider, ExecuteResource};
use file::{FileProvider, FileResource};
use link::{LinkProvider, LinkResource};
use registry::{RegistryKeyProvider, RegistryKeyResource, RegistryStore};
use service::{ServiceProvider, ServiceResource};

/// Platform services some providers need. A missing backend makes the
/// declarations that need it fail.
#[derive(Default, Clone)]
pub struct Backends {
    /// Access-control lists for `rights` on files
    pub acl: Option<Rc<dyn AclBackend>>,
    /// Registry for `registry_key` resources
    pub registry: Option<Rc<dyn RegistryStore>>,
}

#[derive(Debug, Default, Deserialize)]
struct DeclarationFile {
    #[serde(default)]
    resource: Vec<toml::Table>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Declaration {
    File(FileResource),
    Directory(DirectoryResource),
    Link(LinkResource),
    Cron(CronResource),
    Service(ServiceResource),
    Execute(ExecuteResource),
    RegistryKey(RegistryKeyResource),
}

impl Declaration {
    /// Build the provider along with the action run when none is declared.
    fn into_provider(self, backends: &Backends) -> Result<(Box<dyn Converge>, Action)> {
        Ok(match self {
            Self::File(mut r) => {
                r.path = resolve_path(&r.name, &r.path);
                (Box::new(FileProvider::new(r, backends.acl.clone())), Action::Create)
            }
            Self::Directory(mut r) => {
                r.path = resolve_path(&r.name, &r.path);
                (Box::new(DirectoryProvider::new(r)), Action::Create)
            }
            Self::Link(mut r) => {
                r.target_file = resolve_path(&r.name, &r.target_file);
                r.to = expand_path(&r.to);
                (Box::new(LinkProvider::new(r)), Action::Create)
            }
            Self::Cron(r) => (Box::new(CronProvider::new(r)), Action::Create),
            Self::Service(r) => (Box::new(ServiceProvider::new(r)), Action::Nothing),
            Self::Execute(mut r) => {
                r.cwd = r.cwd.as_deref().map(expand_path);
                r.creates = r.creates.as_deref().map(expand_path);
                (Box::new(ExecuteProvider::new(r)), Action::Run)
            }
            Self::RegistryKey(mut r) => {
                let Some(store) = backends.registry.clone() else {
                    bail!("registry keys are not supported on this platform");
                };
                if r.key.is_empty() {
                    r.key.clone_from(&r.name);
                }
                (Box::new(RegistryKeyProvider::new(r, store)), Action::Create)
            }
        })
    }
}

fn expand_path(path: &Path) -> PathBuf {
    paths::expand(&path.to_string_lossy())
}

/// The declared path, or the name when no path is given, expanded.
fn resolve_path(name: &str, path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        paths::expand(name)
    } else {
        expand_path(path)
    }
}

fn parse_actions(value: &toml::Value) -> Result<Vec<Action>> {
    let parse = |v: &toml::Value| -> Result<Action> {
        let name = v
            .as_str()
            .with_context(|| format!("action must be a string, found {}", v.type_str()))?;
        name.parse::<Action>().map_err(anyhow::Error::msg)
    };
    match value {
        toml::Value::Array(items) if items.is_empty() => bail!("action list is empty"),
        toml::Value::Array(items) => items.iter().map(parse).collect(),
        other => Ok(vec![parse(other)?]),
    }
}

fn parse_entry(mut table: toml::Table, backends: &Backends) -> Result<Entry> {
    let action = table.remove("action");
    let ignore_failure = match table.remove("ignore_failure") {
        None => false,
        Some(toml::Value::Boolean(ignore)) => ignore,
        Some(other) => bail!("ignore_failure must be a boolean, found {}", other.type_str()),
    };
    match table.get("name") {
        Some(toml::Value::String(name)) if !name.is_empty() => {}
        Some(_) => bail!("name must be a non-empty string"),
        None => bail!("missing name"),
    }

    let declaration: Declaration = toml::Value::Table(table).try_into()?;
    let (provider, default_action) = declaration.into_provider(backends)?;
    let actions = match action {
        Some(value) => parse_actions(&value)?,
        None => vec![default_action],
    };
    Ok(Entry::new(provider, actions).ignore_failure(ignore_failure))
}

/// Parse declarations into a validated collection.
pub fn parse(text: &str, backends: &Backends) -> Result<ResourceCollection> {
    let file: DeclarationFile = toml::from_str(text).context("Invalid declaration file")?;

    let mut collection = ResourceCollection::new();
    for (index, table) in file.resource.into_iter().enumerate() {
        let label = match (table.get("type"), table.get("name")) {
            (Some(toml::Value::String(t)), Some(toml::Value::String(n))) => format!("{t}[{n}]"),
            _ => format!("resource #{}", index + 1),
        };
        let entry = parse_entry(table, backends).with_context(|| format!("Invalid {label}"))?;
        collection.push(entry);
    }

    collection.validate()?;
    log::debug!("Loaded {} resource(s)", collection.len());
    Ok(collection)
}

/// Read and parse a declaration file.
pub fn load(path: &Path, backends: &Backends) -> Result<ResourceCollection> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    parse(&text, backends).with_context(|| format!("Failed to load {}", path.display()))
}
