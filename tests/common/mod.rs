//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use redsun::bus::VirtualBus;
use redsun::di::DependencyContainer;
use redsun::kwargs::Kwargs;
use redsun::plugin::{ManifestResolver, StaticPluginSource, SymbolTable};
use redsun::protocols::{
    ClassRef, DataKey, Device, DeviceMap, HasShutdown, IsInjectable, IsProvider, Presenter, Reading, View,
};
use redsun::storage::StorageSlot;
use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// Devices
// =============================================================================

/// Device that keeps the kwargs it was built with.
pub struct RecordingDevice {
    pub name: String,
    pub kwargs: Kwargs,
    pub storage: Option<StorageSlot>,
}

impl Device for RecordingDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_configuration(&self) -> BTreeMap<String, Reading> {
        BTreeMap::new()
    }

    fn describe_configuration(&self) -> BTreeMap<String, DataKey> {
        BTreeMap::new()
    }

    fn storage_slot(&mut self) -> Option<&mut StorageSlot> {
        self.storage.as_mut()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn recording_device() -> ClassRef {
    ClassRef::device("RecordingDevice", |name, kwargs| {
        Ok(Box::new(RecordingDevice {
            name: name.to_string(),
            kwargs: kwargs.clone(),
            storage: None,
        }))
    })
}

/// Same as [`recording_device`], but carrying the storage marker.
pub fn storage_device() -> ClassRef {
    ClassRef::device("StorageDevice", |name, kwargs| {
        Ok(Box::new(RecordingDevice {
            name: name.to_string(),
            kwargs: kwargs.clone(),
            storage: Some(StorageSlot::new()),
        }))
    })
}

/// Recording device whose class ships plugin defaults.
pub fn defaulted_device() -> ClassRef {
    let class = ClassRef::device_fn("DefaultedDevice", |name, kwargs| {
        Ok(Box::new(RecordingDevice {
            name: name.to_string(),
            kwargs: kwargs.clone(),
            storage: None,
        }))
    })
    .with_defaults(Kwargs::new().with("egu", "mm").with("step_size", 0.1));
    ClassRef::Device(Arc::new(class))
}

pub fn failing_device() -> ClassRef {
    ClassRef::device("FailingDevice", |name, _| anyhow::bail!("device '{}' is unplugged", name))
}

pub fn kwargs_of(devices: &DeviceMap, name: &str) -> Kwargs {
    devices[name]
        .as_any()
        .downcast_ref::<RecordingDevice>()
        .expect("recording device")
        .kwargs
        .clone()
}

// =============================================================================
// Presenters
// =============================================================================

/// Provider name used by [`RecordingPresenter`].
pub const GREETING: &str = "greeting";

/// Presenter publishing a greeting and counting shutdowns.
pub struct RecordingPresenter {
    pub name: String,
    pub devices: DeviceMap,
    pub virtual_bus: Arc<VirtualBus>,
    pub shutdowns: Arc<AtomicUsize>,
}

impl Presenter for RecordingPresenter {
    fn name(&self) -> &str {
        &self.name
    }

    fn devices(&self) -> &DeviceMap {
        &self.devices
    }

    fn virtual_bus(&self) -> &Arc<VirtualBus> {
        &self.virtual_bus
    }

    fn as_provider(&self) -> Option<&dyn IsProvider> {
        Some(self)
    }

    fn as_shutdown(&self) -> Option<&dyn HasShutdown> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl IsProvider for RecordingPresenter {
    fn register_providers(&self, container: &DependencyContainer) -> anyhow::Result<()> {
        container.register_object(GREETING, Arc::new(format!("hello from {}", self.name)))?;
        Ok(())
    }
}

impl HasShutdown for RecordingPresenter {
    fn shutdown(&self) -> anyhow::Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn recording_presenter(shutdowns: Arc<AtomicUsize>) -> ClassRef {
    ClassRef::presenter("RecordingPresenter", move |name, devices, bus, _| {
        Ok(Box::new(RecordingPresenter {
            name: name.to_string(),
            devices: devices.clone(),
            virtual_bus: bus.clone(),
            shutdowns: shutdowns.clone(),
        }))
    })
}

pub fn failing_presenter() -> ClassRef {
    ClassRef::presenter("FailingPresenter", |_, _, _, _| anyhow::bail!("no devices to present"))
}

// =============================================================================
// Views
// =============================================================================

/// View that resolves the greeting when injected.
pub struct RecordingView {
    pub name: String,
    pub virtual_bus: Arc<VirtualBus>,
    pub greeting: Option<Arc<String>>,
}

impl View for RecordingView {
    fn name(&self) -> &str {
        &self.name
    }

    fn virtual_bus(&self) -> &Arc<VirtualBus> {
        &self.virtual_bus
    }

    fn as_injectable(&mut self) -> Option<&mut dyn IsInjectable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl IsInjectable for RecordingView {
    fn inject_dependencies(&mut self, container: &Arc<DependencyContainer>) -> anyhow::Result<()> {
        self.greeting = container.resolve::<String>(GREETING);
        Ok(())
    }
}

pub fn recording_view() -> ClassRef {
    ClassRef::view("RecordingView", |name, bus, _| {
        Ok(Box::new(RecordingView {
            name: name.to_string(),
            virtual_bus: bus.clone(),
            greeting: None,
        }))
    })
}

pub fn failing_view() -> ClassRef {
    ClassRef::view("FailingView", |_, _, _| anyhow::bail!("display unavailable"))
}

// =============================================================================
// Plugins on disk
// =============================================================================

/// Write `<dir>/<file>` and return its path.
pub fn write_file(dir: &Path, file: &str, content: &str) -> PathBuf {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(&path, content).expect("write file");
    path
}

pub const MOCK_MANIFEST: &str = r#"
devices:
  motor:
    class: redsun_mock.motor:MockMotor
    info: redsun_mock.motor:MotorInfo
  detector:
    class: redsun_mock.detector:MockDetector
  ghost:
    class: redsun_mock.motor:DoesNotExist
presenters:
  stage:
    class: redsun_mock.controller:StageController
views:
  stage:
    class: redsun_mock.view:StageView
"#;

/// Resolver over one `redsun-mock` plugin whose manifest lives in `dir`.
pub fn mock_resolver(dir: &Path) -> ManifestResolver {
    let manifest = write_file(dir, "redsun-mock/redsun.yaml", MOCK_MANIFEST);
    let source = StaticPluginSource::new().with_plugin("redsun-mock", manifest);

    let symbols = Arc::new(SymbolTable::new());
    redsun::mock::register_symbols(&symbols);
    ManifestResolver::new(Arc::new(source), symbols)
}
