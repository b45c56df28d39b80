//! # Redsun Core Library
//!
//! Plugin resolution and dependency-ordered construction of an instrument
//! control application. A YAML configuration names the session, the
//! frontend and three groups of components; each component points at a
//! plugin and an id in that plugin's manifest. The container resolves the
//! classes, merges their keyword arguments and builds everything in a fixed
//! order: devices, then presenters, then views.
//!
//! ## Crate Structure
//!
//! - **`protocols`**: the `Device`, `Presenter` and `View` interfaces, their
//!   optional capabilities and the class handles that construct them.
//! - **`structural`**: adapters for classes described only by their members.
//! - **`plugin`**: plugin sources, manifests and the manifest resolver.
//! - **`config`**: configuration file loading and kwarg merging.
//! - **`container`**: layouts, components and the build orchestrator.
//! - **`bus`**: the virtual bus shared by presenters and views.
//! - **`di`**: the dependency container providers register into.
//! - **`storage`**: writer backends and storage injection into devices.
//! - **`mock`**: simulated components backing the `redsun-mock` plugin.
//! - **`logging`**: `tracing` subscriber setup for binaries.
//! - **`error`**: crate-wide error types.
//!
//! ## Example
//!
//! ```no_run
//! use redsun::container::{ContainerLayout, ComponentField, HeadlessLauncher};
//! use redsun::mock;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut container = ContainerLayout::new()
//!     .session("bench")
//!     .frontend("headless")
//!     .device("stage", ComponentField::new(mock::motor_class()).kwarg("axis", vec!["X", "Y"]))
//!     .presenter("ctrl", ComponentField::new(mock::controller_class()))
//!     .finalize()?;
//!
//! container.run(&HeadlessLauncher)?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod container;
pub mod di;
pub mod error;
pub mod kwargs;
pub mod logging;
pub mod mock;
pub mod plugin;
pub mod protocols;
pub mod storage;
pub mod structural;

pub use container::{Container, ContainerLayout};
pub use error::{AppResult, ConfigError, RedsunError};
pub use kwargs::Kwargs;
pub use protocols::{ClassRef, Device, Group, Presenter, View};
