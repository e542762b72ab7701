//! Resource trait for declarative state management
//!
//! A Resource is declared desired state: an identity, typed properties and
//! the bookkeeping the convergence protocol writes back. The same type also
//! describes observed state when a provider loads the current resource.

use crate::types::ResourceStatus;
use std::fmt;

/// Core trait for declared resources
///
/// # Example
///
/// ```ignore
/// use declarative::{Resource, ResourceStatus};
///
/// #[derive(Debug, Clone, Default)]
/// struct MotdResource {
///     path: String,
///     content: Option<String>,
///     status: ResourceStatus,
/// }
///
/// impl Resource for MotdResource {
///     fn resource_type(&self) -> &'static str { "motd" }
///     fn name(&self) -> &str { &self.path }
///     fn status(&self) -> &ResourceStatus { &self.status }
///     fn status_mut(&mut self) -> &mut ResourceStatus { &mut self.status }
/// }
/// ```
pub trait Resource: fmt::Debug {
    /// Resource type category, e.g. "file", "cron", "service"
    fn resource_type(&self) -> &'static str;

    /// Name identifying this resource within its type
    fn name(&self) -> &str;

    /// `type[name]`, used in every message about this resource
    fn identity(&self) -> String {
        format!("{}[{}]", self.resource_type(), self.name())
    }

    /// Convergence bookkeeping
    fn status(&self) -> &ResourceStatus;

    /// Mutable convergence bookkeeping
    fn status_mut(&mut self) -> &mut ResourceStatus;

    /// Whether content must be kept out of logs and reports
    fn sensitive(&self) -> bool {
        false
    }
}
