//! Container configuration schema.
//!
//! ```yaml
//! schema_version: 1.0
//! session: Microscope        # optional, default "Redsun"
//! frontend: pyqt
//! devices:
//!   motor:
//!     plugin_name: redsun-mock
//!     plugin_id: motor
//!     egu: mm
//! presenters: {}
//! views: {}
//! storage:                   # optional
//!   backend: zarr
//! ```
//!
//! Component sections keep the order in which entries appear in the file;
//! that order is the build order within each group.

use crate::kwargs::Kwargs;
use crate::protocols::Group;
use crate::storage::StorageConfig;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default session name.
pub const DEFAULT_SESSION: &str = "Redsun";

/// Default frontend for programmatic containers.
pub const DEFAULT_FRONTEND: &str = "pyqt";

/// Current configuration schema version.
pub const SCHEMA_VERSION: f64 = 1.0;

fn default_session() -> String {
    DEFAULT_SESSION.to_string()
}

/// Top-level container configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Configuration schema version
    pub schema_version: f64,

    /// Session name, used for window titles and storage paths
    #[serde(default = "default_session")]
    pub session: String,

    /// Frontend identifier
    pub frontend: String,

    /// Device entries, name to kwargs
    #[serde(default)]
    pub devices: ComponentSection,

    /// Presenter entries
    #[serde(default)]
    pub presenters: ComponentSection,

    /// View entries
    #[serde(default)]
    pub views: ComponentSection,

    /// Storage backend settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            session: default_session(),
            frontend: DEFAULT_FRONTEND.to_string(),
            devices: ComponentSection::default(),
            presenters: ComponentSection::default(),
            views: ComponentSection::default(),
            storage: None,
        }
    }
}

impl ContainerConfig {
    /// Section for `group`.
    pub fn section(&self, group: Group) -> &ComponentSection {
        match group {
            Group::Devices => &self.devices,
            Group::Presenters => &self.presenters,
            Group::Views => &self.views,
        }
    }

    /// Session-level settings as a mapping. Component sections are not
    /// included; they never reach other components.
    pub fn to_kwargs(&self) -> Kwargs {
        let mut kwargs = Kwargs::new()
            .with("schema_version", self.schema_version)
            .with("session", self.session.as_str())
            .with("frontend", self.frontend.as_str());
        if let Some(storage) = &self.storage {
            if let Ok(value) = serde_yaml::to_value(storage) {
                kwargs.insert("storage", value);
            }
        }
        kwargs
    }
}

/// Ordered `name -> kwargs` entries of one group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentSection {
    entries: Vec<(String, Kwargs)>,
}

impl ComponentSection {
    /// Empty section.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, kwargs: Kwargs) -> Self {
        self.insert(name, kwargs);
        self
    }

    /// Insert an entry. An existing entry keeps its position and gets the new kwargs.
    pub fn insert(&mut self, name: impl Into<String>, kwargs: Kwargs) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = kwargs,
            None => self.entries.push((name, kwargs)),
        }
    }

    /// Kwargs of one entry.
    pub fn get(&self, name: &str) -> Option<&Kwargs> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, k)| k)
    }

    /// Entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Kwargs)> {
        self.entries.iter().map(|(n, k)| (n.as_str(), k))
    }

    /// Entry names in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the section is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ComponentSection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, kwargs) in &self.entries {
            map.serialize_entry(name, kwargs)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ComponentSection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SectionVisitor;

        impl<'de> Visitor<'de> for SectionVisitor {
            type Value = ComponentSection;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of component names to keyword arguments")
            }

            // `devices:` with nothing below it
            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(ComponentSection::default())
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(ComponentSection::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut section = ComponentSection::default();
                while let Some((name, kwargs)) = access.next_entry::<String, Option<Kwargs>>()? {
                    if section.get(&name).is_some() {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate component name '{}'",
                            name
                        )));
                    }
                    section.entries.push((name, kwargs.unwrap_or_default()));
                }
                Ok(section)
            }
        }

        deserializer.deserialize_any(SectionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
schema_version: 1
frontend: pyqt
devices:
  stage:
    plugin_name: redsun-mock
    plugin_id: motor
    egu: mm
  camera:
    plugin_name: redsun-mock
    plugin_id: detector
  bare:
presenters:
views:
"#;

    #[test]
    fn sections_keep_file_order() {
        let config: ContainerConfig = serde_yaml::from_str(CONFIG).unwrap();

        assert_eq!(config.session, "Redsun");
        assert_eq!(config.schema_version, 1.0);
        assert_eq!(config.devices.names().collect::<Vec<_>>(), vec!["stage", "camera", "bare"]);
        assert_eq!(config.devices.get("stage").unwrap().get_str("egu"), Some("mm"));
        assert!(config.devices.get("bare").unwrap().is_empty());
        assert!(config.presenters.is_empty());
        assert!(config.storage.is_none());
    }

    #[test]
    fn section_rejects_scalars() {
        let err = serde_yaml::from_str::<ContainerConfig>("schema_version: 1\nfrontend: pyqt\ndevices: 3\n");
        assert!(err.is_err());
    }

    #[test]
    fn insert_keeps_position() {
        let mut section = ComponentSection::new()
            .with("a", Kwargs::new())
            .with("b", Kwargs::new());
        section.insert("a", Kwargs::new().with("x", 1));

        assert_eq!(section.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(section.get("a").unwrap().len(), 1);
    }

    #[test]
    fn to_kwargs_exposes_session_settings_only() {
        let config: ContainerConfig = serde_yaml::from_str(CONFIG).unwrap();
        let kwargs = config.to_kwargs();

        assert_eq!(kwargs.get_str("session"), Some("Redsun"));
        assert_eq!(kwargs.get_str("frontend"), Some("pyqt"));
        assert!(!kwargs.contains_key("devices"));
    }
}
