//! Declarative container layouts.
//!
//! A [`ContainerLayout`] lists component declarations in order. Layouts can
//! extend a base layout: the derived layout starts with the base's
//! declarations, and a declaration under an existing key replaces the
//! inherited one in place.
//!
//! ```rust,ignore
//! fn base() -> ContainerLayout {
//!     ContainerLayout::new()
//!         .config("config/mock_app.yaml")
//!         .device("motor", ComponentField::new(motor_class()).from_config("motor"))
//!         .presenter("ctrl", ComponentField::new(controller_class()))
//! }
//!
//! // same layout, but the motor is exposed as "stage" with micrometer units
//! let layout = ContainerLayout::extends(base())
//!     .device("motor", ComponentField::new(motor_class()).alias("stage").kwarg("egu", "um"));
//! let container = Container::new(layout)?;
//! ```
//!
//! Names resolve as `alias` if set, else the declaration key.

use super::app::Container;
use crate::config::{load_config, merge, ContainerConfig};
use crate::error::{AppResult, ConfigError, RedsunError};
use crate::kwargs::Kwargs;
use crate::plugin::info::META_KEYS;
use crate::protocols::{ClassRef, Group};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Declaration of one component.
#[derive(Debug, Clone)]
pub struct ComponentField {
    class: ClassRef,
    alias: Option<String>,
    from_config: Option<String>,
    kwargs: Kwargs,
}

impl ComponentField {
    /// Declare a component of `class`.
    pub fn new(class: ClassRef) -> Self {
        Self {
            class,
            alias: None,
            from_config: None,
            kwargs: Kwargs::new(),
        }
    }

    /// Name the component `alias` instead of its declaration key.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Take kwargs from the config file entry named `key` in this
    /// component's group. Inline kwargs still win.
    pub fn from_config(mut self, key: impl Into<String>) -> Self {
        self.from_config = Some(key.into());
        self
    }

    /// Add one inline kwarg.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.kwargs.insert(key, value);
        self
    }

    /// Add inline kwargs.
    pub fn kwargs(mut self, kwargs: Kwargs) -> Self {
        self.kwargs.overlay(&kwargs);
        self
    }

    /// Resolved component name for declaration key `key`.
    pub fn resolved_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.alias.as_deref().unwrap_or(key)
    }
}

#[derive(Debug, Clone)]
struct Declaration {
    key: String,
    group: Group,
    field: ComponentField,
    inherited: bool,
}

/// Ordered component declarations plus container options.
#[derive(Debug, Clone, Default)]
pub struct ContainerLayout {
    config_path: Option<PathBuf>,
    session: Option<String>,
    frontend: Option<String>,
    declarations: Vec<Declaration>,
    // same-level redeclarations, reported when the layout is finalized
    duplicates: Vec<(Group, String)>,
}

impl ContainerLayout {
    /// Empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout inheriting every declaration and option of `base`.
    pub fn extends(base: ContainerLayout) -> Self {
        let mut layout = base;
        for declaration in &mut layout.declarations {
            declaration.inherited = true;
        }
        layout
    }

    /// Attach a configuration file.
    pub fn config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Override the session name.
    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Override the frontend.
    pub fn frontend(mut self, frontend: impl Into<String>) -> Self {
        self.frontend = Some(frontend.into());
        self
    }

    /// Declare a device.
    pub fn device(self, key: impl Into<String>, field: ComponentField) -> Self {
        self.declare(Group::Devices, key.into(), field)
    }

    /// Declare a presenter.
    pub fn presenter(self, key: impl Into<String>, field: ComponentField) -> Self {
        self.declare(Group::Presenters, key.into(), field)
    }

    /// Declare a view.
    pub fn view(self, key: impl Into<String>, field: ComponentField) -> Self {
        self.declare(Group::Views, key.into(), field)
    }

    fn declare(mut self, group: Group, key: String, field: ComponentField) -> Self {
        // each group is its own namespace; only a same-group key overrides
        match self.declarations.iter_mut().find(|d| d.group == group && d.key == key) {
            Some(existing) if existing.inherited => {
                debug!("Overriding inherited {} declaration '{}'", group, key);
                existing.field = field;
                existing.inherited = false;
            }
            Some(_) => self.duplicates.push((group, key)),
            None => self.declarations.push(Declaration {
                key,
                group,
                field,
                inherited: false,
            }),
        }
        self
    }

    /// Attached configuration file.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Resolved names of the declared components of `group`, in order.
    pub fn names(&self, group: Group) -> Vec<&str> {
        self.declarations
            .iter()
            .filter(|d| d.group == group)
            .map(|d| d.field.resolved_name(&d.key))
            .collect()
    }

    /// Turn the layout into an unbuilt container.
    ///
    /// # Errors
    ///
    /// - configuration errors from the attached file, or an unknown frontend
    /// - [`ConfigError::NoConfigSource`] if a component uses `from_config`
    ///   without an attached file
    /// - [`RedsunError::DuplicateComponent`] for name collisions in one group
    /// - [`RedsunError::ProtocolViolation`] for a class declared in the wrong group
    pub fn finalize(self) -> AppResult<Container> {
        if let Some((group, key)) = self.duplicates.into_iter().next() {
            return Err(RedsunError::DuplicateComponent { group, name: key });
        }

        let file_config = match &self.config_path {
            Some(path) => Some(load_config(path)?),
            None => None,
        };
        let mut config = file_config.clone().unwrap_or_default();
        if let Some(session) = self.session {
            config.session = session;
        }
        if let Some(frontend) = self.frontend {
            config.frontend = frontend;
        }

        let mut container = Container::with_config(config)?;
        container.set_config_path(self.config_path);

        let mut seen: BTreeSet<(Group, String)> = BTreeSet::new();
        for Declaration { key, group, field, .. } in self.declarations {
            let name = field.resolved_name(&key).to_string();
            if !seen.insert((group, name.clone())) {
                return Err(RedsunError::DuplicateComponent { group, name });
            }

            let kwargs = declared_kwargs(&name, group, &field, file_config.as_ref())?;
            container.register(group, &name, field.class, kwargs)?;
        }

        Ok(container)
    }
}

/// Plugin defaults, overlaid with the config entry (for `from_config`
/// fields), overlaid with inline kwargs.
fn declared_kwargs(
    name: &str,
    group: Group,
    field: &ComponentField,
    file_config: Option<&ContainerConfig>,
) -> AppResult<Kwargs> {
    let layered = match &field.from_config {
        Some(key) => {
            let config = file_config.ok_or_else(|| ConfigError::NoConfigSource(name.to_string()))?;
            let section = config.section(group).get(key).map(|entry| entry.without(&META_KEYS));
            merge(name, &field.kwargs, section.as_ref())
        }
        None => field.kwargs.clone(),
    };

    let mut kwargs = field.class.defaults();
    kwargs.overlay(&layered);
    Ok(kwargs)
}

/// An application described by a static layout.
///
/// Implement [`AppDefinition::layout`]; derived applications call their
/// base's `layout()` and pass it to [`ContainerLayout::extends`].
pub trait AppDefinition {
    /// Declarations of this application.
    fn layout() -> ContainerLayout;

    /// Unbuilt container for this application.
    fn container() -> AppResult<Container> {
        Self::layout().finalize()
    }
}
