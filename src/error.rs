//! Custom error types for the application container.
//!
//! This module defines the primary error type, `RedsunError`, together with
//! `ConfigError` for everything that can go wrong while loading and validating
//! configuration. Both use the `thiserror` crate.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: fatal configuration problems (malformed YAML, missing
//!   top-level keys, unknown frontend, `from_config` without a config file).
//!   These abort startup and are returned to the caller.
//! - **`ComponentBuild`**: a presenter or view constructor failed. The original
//!   `anyhow::Error` is preserved as the source so callers can downcast it.
//! - **`NotBuilt`** / **`ComponentNotBuilt`**: programmer errors, raised when
//!   reading built state before `build()` completed.
//! - **`DuplicateComponent`** / **`DuplicateProvider`**: name collisions inside
//!   one namespace.
//!
//! Soft failures (plugin resolution, protocol violations, device construction)
//! never surface as errors from the batch operations; they are logged and the
//! offending component is skipped.

use crate::protocols::Group;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, RedsunError>;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// The configuration file exists but could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Offending path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML, or a section has the wrong shape.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// The top-level YAML value is not a mapping.
    #[error("Configuration must be a mapping at the top level, found {found}")]
    WrongType {
        /// Kind of YAML value found instead
        found: &'static str,
    },

    /// Required top-level keys are absent.
    #[error("Configuration is missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    /// The `frontend` identifier is not one of the supported frontends.
    #[error("Unknown frontend '{frontend}'. Supported: {}", .supported.join(", "))]
    UnknownFrontend {
        /// Requested frontend
        frontend: String,
        /// Known frontend identifiers
        supported: Vec<&'static str>,
    },

    /// A component asked for its kwargs from the config file, but the
    /// container layout declares no config file.
    #[error("Component '{0}' requests configuration, but no config file is attached to the container")]
    NoConfigSource(String),

    /// The storage section cannot be turned into a writer.
    #[error("Invalid storage configuration: {0}")]
    InvalidStorage(String),
}

/// Primary error type for the container.
#[derive(Error, Debug)]
pub enum RedsunError {
    /// Fatal configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Built state was read before `build()` completed.
    #[error("Container not built. Call build() first.")]
    NotBuilt,

    /// The container is already built and cannot be modified.
    #[error("Container already built; components and storage can only be changed before build()")]
    AlreadyBuilt,

    /// A single component instance was read before it was built.
    #[error("Component {0} has not been instantiated yet. Call 'build' first.")]
    ComponentNotBuilt(String),

    /// Two components in the same group share a name.
    #[error("Duplicate {group} name '{name}'")]
    DuplicateComponent {
        /// Group namespace in which the collision happened
        group: Group,
        /// Colliding name
        name: String,
    },

    /// A class was registered in a group it cannot be built for.
    #[error("Class '{class}' cannot be used as a {group} component")]
    ProtocolViolation {
        /// Type name of the class
        class: String,
        /// Target group
        group: Group,
    },

    /// A component constructor (or its post-construction hook) failed.
    #[error("Failed to build {group} '{name}': {source}")]
    ComponentBuild {
        /// Group of the failing component
        group: Group,
        /// Resolved component name
        name: String,
        /// The error returned by the component
        #[source]
        source: anyhow::Error,
    },

    /// A provider with this name was already registered in the injection surface.
    #[error("Provider '{0}' is already registered")]
    DuplicateProvider(String),

    /// A bus signal was requested with a payload type different from the one
    /// it was registered with.
    #[error("Signal '{owner}.{name}' is registered with a different payload type")]
    SignalType {
        /// Component owning the signal
        owner: String,
        /// Signal name
        name: String,
    },
}

impl RedsunError {
    /// Returns the underlying component error, if this is a build failure.
    pub fn component_source(&self) -> Option<&anyhow::Error> {
        match self {
            RedsunError::ComponentBuild { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_lists_every_key() {
        let err = ConfigError::MissingKeys(vec!["schema_version".into(), "frontend".into()]);
        assert_eq!(
            err.to_string(),
            "Configuration is missing required keys: schema_version, frontend"
        );
    }

    #[test]
    fn config_error_converts_into_redsun_error() {
        let err: RedsunError = ConfigError::WrongType { found: "sequence" }.into();
        assert!(matches!(err, RedsunError::Config(ConfigError::WrongType { .. })));
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: RedsunError = ConfigError::Read {
            path: PathBuf::from("app.yaml"),
            source: io,
        }
        .into();
        assert!(matches!(err, RedsunError::Config(ConfigError::Read { .. })));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn component_source_is_preserved() {
        let err = RedsunError::ComponentBuild {
            group: Group::Presenters,
            name: "ctrl".into(),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.component_source().map(|e| e.to_string()), Some("boom".into()));
        assert_eq!(err.to_string(), "Failed to build presenter 'ctrl': boom");
    }
}
