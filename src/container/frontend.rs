//! Frontend selection and launch boundary.
//!
//! The container does not render anything. A [`Launcher`] receives the built
//! container and runs whatever event loop the frontend needs; the container
//! only validates the frontend identifier and sequences build, launch and
//! shutdown.

use super::app::Container;
use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Frontend identifiers accepted in configuration files.
pub const SUPPORTED_FRONTENDS: [&str; 3] = ["pyqt", "pyside", "headless"];

/// Supported frontends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frontend {
    /// Qt via PyQt bindings
    PyQt,
    /// Qt via PySide bindings
    PySide,
    /// No user interface
    Headless,
}

impl Frontend {
    /// Configuration identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frontend::PyQt => "pyqt",
            Frontend::PySide => "pyside",
            Frontend::Headless => "headless",
        }
    }

    /// Whether this frontend runs a Qt event loop.
    pub fn is_qt(&self) -> bool {
        matches!(self, Frontend::PyQt | Frontend::PySide)
    }
}

impl fmt::Display for Frontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frontend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pyqt" => Ok(Frontend::PyQt),
            "pyside" => Ok(Frontend::PySide),
            "headless" => Ok(Frontend::Headless),
            _ => Err(ConfigError::UnknownFrontend {
                frontend: s.to_string(),
                supported: SUPPORTED_FRONTENDS.to_vec(),
            }),
        }
    }
}

/// Runs the user interface for a built container.
pub trait Launcher {
    /// Run until the user interface exits.
    fn launch(&self, container: &Container) -> anyhow::Result<()>;
}

/// Launcher that logs the built object graph and returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessLauncher;

impl Launcher for HeadlessLauncher {
    fn launch(&self, container: &Container) -> anyhow::Result<()> {
        info!(
            "Session '{}' running headless ({} frontend configured)",
            container.session(),
            container.frontend()
        );
        for component in container.components() {
            info!("  {} [{}]", component, component.type_name());
        }
        Ok(())
    }
}
