//! Configuration loading.
//!
//! Loading happens in three steps:
//!
//! 1. The file is parsed as plain YAML and its shape checked: the top level
//!    must be a mapping containing every key in [`REQUIRED_KEYS`].
//! 2. The mapping is deserialized into a [`ContainerConfig`]. Parsing goes
//!    through `serde_yaml` directly so component sections keep file order.
//! 3. `REDSUN_`-prefixed environment variables override top-level scalars
//!    (`REDSUN_SESSION`, `REDSUN_FRONTEND`), collected through `figment`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use redsun::config::loader::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config/mock_app.yaml"))?;
//! println!("Session: {}", config.session);
//! ```

use super::schema::ContainerConfig;
use crate::error::ConfigError;
use figment::providers::Env;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::{debug, info};

/// Top-level keys every configuration file must define.
pub const REQUIRED_KEYS: [&str; 2] = ["schema_version", "frontend"];

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "REDSUN_";

/// Read a configuration file into a raw, shape-checked mapping.
pub fn load_raw(path: &Path) -> Result<Mapping, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    debug!("Loading config from: {}", path.display());

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_raw(&content)
}

/// Parse a YAML document into a raw, shape-checked mapping.
pub fn parse_raw(content: &str) -> Result<Mapping, ConfigError> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(ConfigError::WrongType {
                found: value_kind(&other),
            })
        }
    };

    let missing: Vec<String> = REQUIRED_KEYS
        .iter()
        .filter(|key| !mapping.contains_key(**key))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::MissingKeys(missing));
    }

    Ok(mapping)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// Deserialize a shape-checked mapping.
pub fn from_raw(raw: Mapping) -> Result<ContainerConfig, ConfigError> {
    serde_yaml::from_value(Value::Mapping(raw)).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Apply `REDSUN_SESSION` / `REDSUN_FRONTEND` on top of `config`.
///
/// Values are taken verbatim, so `REDSUN_SESSION=2024` names the session
/// `"2024"` instead of being parsed as a number.
pub fn apply_env_overrides(config: &mut ContainerConfig) {
    for (key, value) in Env::prefixed(ENV_PREFIX).only(&["session", "frontend"]).iter() {
        match key.as_str().to_lowercase().as_str() {
            "session" => {
                debug!("Session overridden from environment: {}", value);
                config.session = value;
            }
            "frontend" => {
                debug!("Frontend overridden from environment: {}", value);
                config.frontend = value;
            }
            _ => {}
        }
    }
}

/// Load a configuration file.
///
/// # Errors
///
/// - [`ConfigError::NotFound`] / [`ConfigError::Read`] if the file is unreadable
/// - [`ConfigError::WrongType`] if the top level is not a mapping
/// - [`ConfigError::MissingKeys`] if a required key is absent
/// - [`ConfigError::Parse`] for malformed YAML or sections of the wrong shape
pub fn load_config(path: &Path) -> Result<ContainerConfig, ConfigError> {
    let mut config = from_raw(load_raw(path)?)?;
    apply_env_overrides(&mut config);

    info!(
        "Loaded config: session '{}', frontend '{}' ({} devices, {} presenters, {} views)",
        config.session,
        config.frontend,
        config.devices.len(),
        config.presenters.len(),
        config.views.len()
    );
    Ok(config)
}

/// Load a configuration from a YAML string.
///
/// Useful for testing or loading configs from embedded resources. Environment
/// overrides are applied as for files.
pub fn load_config_from_str(content: &str) -> Result<ContainerConfig, ConfigError> {
    let mut config = from_raw(parse_raw(content)?)?;
    apply_env_overrides(&mut config);
    Ok(config)
}
