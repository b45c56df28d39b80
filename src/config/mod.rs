//! Configuration loading and kwarg merging.

pub mod loader;
pub mod merge;
pub mod schema;

pub use loader::{load_config, load_config_from_str, REQUIRED_KEYS};
pub use merge::{merge, merge_layers};
pub use schema::{ComponentSection, ContainerConfig, DEFAULT_FRONTEND, DEFAULT_SESSION};
