//! Storage boundary.
//!
//! The container does not write data itself. When the configuration carries
//! a `storage` section, one writer is created per container and attached to
//! every device that exposes a [`StorageSlot`]; devices without a slot are
//! never touched.
//!
//! Writers come from a [`StorageRegistry`] keyed by backend identifier. The
//! default registry knows `zarr`, which resolves the store root on disk and
//! hands out store paths according to the configured filename provider.
//!
//! ```yaml
//! storage:
//!   backend: zarr
//!   base_path: /data/scans          # default: ~/redsun-storage/<session>
//!   filename_provider: static       # auto_increment | uuid | static
//!   filename: calibration
//! ```

use crate::error::ConfigError;
use crate::protocols::Device;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Backend used when the section does not name one.
pub const DEFAULT_BACKEND: &str = "zarr";

/// Directory under the home directory holding per-session stores.
pub const DEFAULT_STORAGE_DIR: &str = "redsun-storage";

// =============================================================================
// Configuration
// =============================================================================

/// How store names are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameProvider {
    /// `00000`, `00001`, ... skipping names that already exist
    #[default]
    AutoIncrement,
    /// A random UUID per store
    Uuid,
    /// Always the configured `filename`
    Static,
}

/// The `storage` section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend identifier
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Root directory of the stores
    #[serde(default, alias = "base_uri", skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,

    /// Filename strategy
    #[serde(default)]
    pub filename_provider: FilenameProvider,

    /// Filename for the `static` provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            base_path: None,
            filename_provider: FilenameProvider::default(),
            filename: None,
        }
    }
}

impl StorageConfig {
    /// Store root for `session`: `base_path` if set, else
    /// `~/redsun-storage/<session>`.
    pub fn resolve_base_path(&self, session: &str) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.base_path {
            return Ok(path.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_STORAGE_DIR).join(session))
            .ok_or_else(|| {
                ConfigError::InvalidStorage("no base_path configured and no home directory found".into())
            })
    }

    /// Check field combinations that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filename_provider == FilenameProvider::Static && self.filename.is_none() {
            return Err(ConfigError::InvalidStorage(
                "filename_provider 'static' requires 'filename'".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Writers
// =============================================================================

/// Shared writer handed to devices carrying the storage marker.
pub trait Writer: Send + Sync + fmt::Debug {
    /// Backend identifier.
    fn backend(&self) -> &str;

    /// Store root.
    fn base_path(&self) -> &Path;

    /// Path of the next store to write.
    fn next_store(&self) -> PathBuf;
}

/// Writer laying stores out as `<base_path>/<name>.<backend>`.
#[derive(Debug)]
pub struct PathWriter {
    backend: String,
    base_path: PathBuf,
    provider: FilenameProvider,
    filename: Option<String>,
    counter: Mutex<u64>,
}

impl PathWriter {
    /// Create the writer, creating `base_path` if absent.
    pub fn create(config: &StorageConfig, session: &str) -> Result<Self, ConfigError> {
        config.validate()?;
        let base_path = config.resolve_base_path(session)?;
        std::fs::create_dir_all(&base_path).map_err(|e| {
            ConfigError::InvalidStorage(format!("cannot create {}: {}", base_path.display(), e))
        })?;
        info!("Storage root: {}", base_path.display());

        Ok(Self {
            backend: config.backend.clone(),
            base_path,
            provider: config.filename_provider,
            filename: config.filename.clone(),
            counter: Mutex::new(0),
        })
    }

    fn store_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", name, self.backend))
    }
}

impl Writer for PathWriter {
    fn backend(&self) -> &str {
        &self.backend
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn next_store(&self) -> PathBuf {
        match self.provider {
            FilenameProvider::Uuid => self.store_path(&uuid::Uuid::new_v4().to_string()),
            FilenameProvider::Static => {
                self.store_path(self.filename.as_deref().unwrap_or_default())
            }
            FilenameProvider::AutoIncrement => {
                let mut counter = self.counter.lock();
                loop {
                    let candidate = self.store_path(&format!("{:05}", *counter));
                    *counter += 1;
                    if !candidate.exists() {
                        return candidate;
                    }
                }
            }
        }
    }
}

type WriterFactory = Box<dyn Fn(&StorageConfig, &str) -> Result<Arc<dyn Writer>, ConfigError> + Send + Sync>;

/// Writer factories keyed by backend identifier.
pub struct StorageRegistry {
    factories: HashMap<String, WriterFactory>,
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("backends", &self.list_backends())
            .finish()
    }
}

impl StorageRegistry {
    /// Registry with the built-in `zarr` backend.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_BACKEND, |config, session| {
            Ok(Arc::new(PathWriter::create(config, session)?) as Arc<dyn Writer>)
        });
        registry
    }

    /// Registry without any backend.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend. Re-registering an identifier replaces it.
    pub fn register<F>(&mut self, backend: &str, factory: F)
    where
        F: Fn(&StorageConfig, &str) -> Result<Arc<dyn Writer>, ConfigError> + Send + Sync + 'static,
    {
        self.factories.insert(backend.to_string(), Box::new(factory));
    }

    /// Create a writer for `config`.
    pub fn create(&self, config: &StorageConfig, session: &str) -> Result<Arc<dyn Writer>, ConfigError> {
        let factory = self.factories.get(&config.backend).ok_or_else(|| {
            ConfigError::InvalidStorage(format!(
                "unknown backend '{}'. Available: {}",
                config.backend,
                self.list_backends().join(", ")
            ))
        })?;
        factory(config, session)
    }

    /// Registered backend identifiers, sorted.
    pub fn list_backends(&self) -> Vec<String> {
        let mut backends: Vec<String> = self.factories.keys().cloned().collect();
        backends.sort();
        backends
    }
}

// =============================================================================
// Device Marker
// =============================================================================

/// Storage marker carried by devices that write data.
#[derive(Debug, Clone, Default)]
pub struct StorageSlot {
    writer: Option<Arc<dyn Writer>>,
}

impl StorageSlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the shared writer.
    pub fn attach(&mut self, writer: Arc<dyn Writer>) {
        self.writer = Some(writer);
    }

    /// Attached writer, if any.
    pub fn writer(&self) -> Option<&Arc<dyn Writer>> {
        self.writer.as_ref()
    }

    /// Whether a writer has been attached.
    pub fn is_attached(&self) -> bool {
        self.writer.is_some()
    }
}

/// Attaches one lazily created writer to marked devices during a build.
pub struct StorageInjector<'a> {
    config: Option<&'a StorageConfig>,
    session: &'a str,
    registry: &'a StorageRegistry,
    writer: Option<Arc<dyn Writer>>,
    failed: bool,
}

impl<'a> StorageInjector<'a> {
    /// Injector for one build. With `config == None` it never creates a writer.
    pub fn new(config: Option<&'a StorageConfig>, session: &'a str, registry: &'a StorageRegistry) -> Self {
        Self {
            config,
            session,
            registry,
            writer: None,
            failed: false,
        }
    }

    /// Attach the writer to `device` if it carries the storage marker.
    ///
    /// The writer is created on the first marked device. A creation failure
    /// is logged once; the device and later ones are built without a writer.
    pub fn inject(&mut self, name: &str, device: &mut dyn Device) {
        let Some(config) = self.config else {
            return;
        };
        let Some(slot) = device.storage_slot() else {
            return;
        };
        if self.failed {
            return;
        }

        if self.writer.is_none() {
            match self.registry.create(config, self.session) {
                Ok(writer) => self.writer = Some(writer),
                Err(e) => {
                    error!("Failed to create storage writer: {}", e);
                    self.failed = true;
                    return;
                }
            }
        }
        if let Some(writer) = &self.writer {
            slot.attach(writer.clone());
            debug!("Attached {} writer to device '{}'", writer.backend(), name);
        }
    }

    /// The writer created during this build, if any.
    pub fn writer(&self) -> Option<&Arc<dyn Writer>> {
        self.writer.as_ref()
    }
}
