//! Plugin discovery and resolution.
//!
//! - [`source`]: where installed plugins and their manifests live
//! - [`manifest`]: the per-plugin YAML manifest
//! - [`symbols`]: `"<module>:<symbol>"` lookup of registered classes
//! - [`info`]: info classes describing configured components
//! - [`resolver`]: `(plugin_name, plugin_id, group)` to class

pub mod info;
pub mod manifest;
pub mod resolver;
pub mod source;
pub mod symbols;

pub use info::{ComponentInfo, FieldsInfo, InfoClass};
pub use manifest::{InstalledPlugin, Manifest, ManifestEntry, SymbolRef};
pub use resolver::{ManifestResolver, ResolutionPass, Resolved};
pub use source::{DirectoryPluginSource, PluginSource, StaticPluginSource};
pub use symbols::SymbolTable;
