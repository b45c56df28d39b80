//! Plugin manifest types.
//!
//! Every installed plugin ships one YAML manifest listing the components it
//! provides, per group:
//!
//! ```yaml
//! devices:
//!   motor:
//!     class: redsun_mock.motor:MockMotor
//!     info: redsun_mock.motor:MotorInfo
//! presenters:
//!   stage:
//!     class: redsun_mock.controller:StageController
//! ```
//!
//! The legacy group names `models`, `controllers` and `widgets` are accepted.
//! Top-level keys that are not group names (plugin metadata such as `name` or
//! `version`) are ignored.

use crate::protocols::Group;
use anyhow::{anyhow, Context, Result};
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One manifest entry: where to find the implementation and info classes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Implementation class as `"<module>:<symbol>"`.
    #[serde(default)]
    pub class: Option<String>,

    /// Info class as `"<module>:<symbol>"`.
    #[serde(default)]
    pub info: Option<String>,
}

/// Parsed plugin manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    groups: BTreeMap<Group, BTreeMap<String, ManifestEntry>>,
}

impl Manifest {
    /// Load a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!("Manifest not found: {}", path.display()));
        }

        debug!("Loading plugin manifest from: {}", path.display());

        let raw: BTreeMap<String, serde_yaml::Value> = Figment::new()
            .merge(Yaml::file(path))
            .extract()
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;

        Self::from_sections(raw)
    }

    /// Parse a manifest from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let raw: Option<BTreeMap<String, serde_yaml::Value>> =
            serde_yaml::from_str(content).context("Failed to parse manifest")?;
        Self::from_sections(raw.unwrap_or_default())
    }

    fn from_sections(raw: BTreeMap<String, serde_yaml::Value>) -> Result<Self> {
        let mut groups: BTreeMap<Group, BTreeMap<String, ManifestEntry>> = BTreeMap::new();

        for (key, value) in raw {
            let group = match key.parse::<Group>() {
                Ok(group) => group,
                Err(_) => {
                    debug!("Ignoring manifest key '{}'", key);
                    continue;
                }
            };
            let entries: BTreeMap<String, ManifestEntry> = serde_yaml::from_value(value)
                .with_context(|| format!("Invalid '{}' section in manifest", key))?;

            let target = groups.entry(group).or_default();
            let canonical = key == group.as_str();
            for (id, entry) in entries {
                // canonical section wins over its legacy alias
                if canonical {
                    target.insert(id, entry);
                } else {
                    target.entry(id).or_insert(entry);
                }
            }
        }

        Ok(Self { groups })
    }

    /// Entries of one group, or `None` if the manifest has no such section.
    pub fn group(&self, group: Group) -> Option<&BTreeMap<String, ManifestEntry>> {
        self.groups.get(&group)
    }

    /// Look up one entry.
    pub fn entry(&self, group: Group, plugin_id: &str) -> Option<&ManifestEntry> {
        self.groups.get(&group)?.get(plugin_id)
    }

    /// Groups present in this manifest.
    pub fn groups(&self) -> impl Iterator<Item = Group> + '_ {
        self.groups.keys().copied()
    }
}

/// A `"<module>:<symbol>"` reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolRef {
    /// Module path
    pub module: String,
    /// Symbol name inside the module
    pub symbol: String,
}

impl SymbolRef {
    /// Create a reference from its parts.
    pub fn new(module: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            symbol: symbol.into(),
        }
    }

    /// Parse `"<module>:<symbol>"`. Exactly one separator and two non-empty
    /// parts are required.
    pub fn parse(reference: &str) -> Result<Self> {
        let (module, symbol) = reference
            .split_once(':')
            .ok_or_else(|| anyhow!("'{}' is not of the form '<module>:<symbol>'", reference))?;
        if module.is_empty() || symbol.is_empty() || symbol.contains(':') {
            return Err(anyhow!("'{}' is not of the form '<module>:<symbol>'", reference));
        }
        Ok(Self::new(module, symbol))
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.symbol)
    }
}

/// An installed plugin as reported by a plugin source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPlugin {
    /// Distribution name, matched against `plugin_name` in configurations
    pub name: String,
    /// Location of the plugin's manifest
    pub manifest_path: PathBuf,
}
