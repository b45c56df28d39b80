//! Plugin information models.
//!
//! Besides its implementation class, a manifest entry may name an info class
//! describing the component (vendor, serial number, axis names...). Info
//! objects are built from the component's configuration entry. Entries
//! without an `info` key fall back to the group's default info class.

use crate::kwargs::Kwargs;
use crate::protocols::Group;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration keys that identify the plugin rather than configure the component.
pub const META_KEYS: [&str; 2] = ["plugin_name", "plugin_id"];

/// Information about one configured component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInfo {
    /// Type name of the info class that produced this object
    pub info_type: String,
    /// Plugin distribution name
    pub plugin_name: Option<String>,
    /// Key inside the plugin manifest
    pub plugin_id: Option<String>,
    /// Remaining configuration fields
    pub fields: Kwargs,
}

impl ComponentInfo {
    /// Split a configuration entry into plugin identification and fields.
    pub fn from_entry(info_type: &str, entry: &Kwargs) -> Self {
        Self {
            info_type: info_type.to_string(),
            plugin_name: entry.get_str("plugin_name").map(str::to_string),
            plugin_id: entry.get_str("plugin_id").map(str::to_string),
            fields: entry.without(&META_KEYS),
        }
    }
}

/// Factory for info objects.
pub trait InfoClass: Send + Sync + 'static {
    /// Type name of the info class.
    fn type_name(&self) -> &str;

    /// Build the info object from a configuration entry.
    fn build(&self, entry: &Kwargs) -> anyhow::Result<ComponentInfo> {
        Ok(ComponentInfo::from_entry(self.type_name(), entry))
    }
}

/// Info class that requires a set of fields to be present.
#[derive(Debug, Clone)]
pub struct FieldsInfo {
    type_name: String,
    required: Vec<String>,
}

impl FieldsInfo {
    /// Info class named `type_name` accepting any entry.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            required: Vec::new(),
        }
    }

    /// Require `field` in every entry.
    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }
}

impl InfoClass for FieldsInfo {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn build(&self, entry: &Kwargs) -> anyhow::Result<ComponentInfo> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .map(String::as_str)
            .filter(|field| !entry.contains_key(field))
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("{} is missing fields: {}", self.type_name, missing.join(", "));
        }
        Ok(ComponentInfo::from_entry(&self.type_name, entry))
    }
}

/// Default info class for a group.
pub fn fallback_info(group: Group) -> Arc<dyn InfoClass> {
    let type_name = match group {
        Group::Devices => "DeviceInfo",
        Group::Presenters => "PresenterInfo",
        Group::Views => "ViewInfo",
    };
    Arc::new(FieldsInfo::new(type_name))
}
