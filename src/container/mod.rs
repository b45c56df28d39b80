//! Application container.
//!
//! - [`component`]: per-component descriptors and their build state
//! - [`layout`]: declarative layouts with inheritance
//! - [`frontend`]: frontend identifiers and the launch boundary
//! - [`app`]: the [`Container`] and its build orchestration

pub mod app;
pub mod component;
pub mod frontend;
pub mod layout;

pub use app::Container;
pub use component::{ComponentDescriptor, DeviceComponent, PresenterComponent, ViewComponent};
pub use frontend::{Frontend, HeadlessLauncher, Launcher};
pub use layout::{AppDefinition, ComponentField, ContainerLayout};
