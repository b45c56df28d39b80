//! Dynamically described classes.
//!
//! Some component classes are not Rust types implementing [`Device`],
//! [`Presenter`] or [`View`] but objects that describe their members at
//! runtime (scripted components, remote proxies, generated drivers). They
//! qualify for a group structurally, by exposing the member names the group
//! requires, and are driven through the adapters in this module.
//!
//! Member values travel as `serde_json::Value`. A dynamic device's
//! `read_configuration` member must return a JSON object of
//! [`Reading`]s, `describe_configuration` an object of [`DataKey`]s.
//!
//! Optional members enable the matching capabilities on the adapters:
//!
//! | Member | Capability |
//! |--------|------------|
//! | `storage` | storage marker on devices |
//! | `register_providers` | [`IsProvider`] on presenters |
//! | `shutdown` | [`HasShutdown`] on presenters |
//! | `inject_dependencies` | [`IsInjectable`] on views |

use crate::bus::VirtualBus;
use crate::di::DependencyContainer;
use crate::kwargs::Kwargs;
use crate::protocols::{
    DataKey, Device, DeviceClass, DeviceMap, HasShutdown, IsInjectable, IsProvider, Presenter,
    PresenterClass, Reading, View, ViewClass,
};
use crate::storage::StorageSlot;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Constructor arguments handed to a dynamic class.
#[derive(Clone, Copy)]
pub struct DynamicArgs<'a> {
    /// Resolved component name
    pub name: &'a str,
    /// Final constructor kwargs
    pub kwargs: &'a Kwargs,
    /// Built devices, when constructing a presenter
    pub devices: Option<&'a DeviceMap>,
    /// Shared bus, when constructing a presenter or view
    pub virtual_bus: Option<&'a Arc<VirtualBus>>,
}

/// A class whose members are only known at runtime.
pub trait DynamicClass: Send + Sync + 'static {
    /// Type name used in logs and manifests.
    fn type_name(&self) -> &str;

    /// Member names exposed by instances of this class.
    fn members(&self) -> &[&str];

    /// Plugin-level default kwargs.
    fn defaults(&self) -> Kwargs {
        Kwargs::new()
    }

    /// Construct an instance.
    fn instantiate(&self, args: DynamicArgs<'_>) -> anyhow::Result<Box<dyn DynamicObject>>;
}

/// An instance of a [`DynamicClass`].
pub trait DynamicObject: Send + Sync + 'static {
    /// Read an attribute-like member.
    fn get(&self, member: &str) -> Option<Value>;

    /// Invoke a method-like member.
    fn call(&self, member: &str, args: Value) -> anyhow::Result<Value>;

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
}

fn has_member(members: &[&str], member: &str) -> bool {
    members.contains(&member)
}

fn call_as<T: DeserializeOwned>(obj: &dyn DynamicObject, member: &str) -> anyhow::Result<T> {
    let value = obj.call(member, Value::Null)?;
    serde_json::from_value(value).with_context(|| format!("member '{}' returned an unexpected shape", member))
}

// =============================================================================
// Devices
// =============================================================================

/// [`Device`] backed by a dynamic object.
pub struct StructuralDevice {
    name: String,
    parent: Option<String>,
    storage: Option<StorageSlot>,
    inner: Box<dyn DynamicObject>,
}

impl StructuralDevice {
    /// The wrapped dynamic object.
    pub fn inner(&self) -> &dyn DynamicObject {
        self.inner.as_ref()
    }
}

impl Device for StructuralDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    fn read_configuration(&self) -> BTreeMap<String, Reading> {
        call_as(self.inner.as_ref(), "read_configuration").unwrap_or_else(|e| {
            tracing::warn!(device = %self.name, error = %e, "read_configuration failed");
            BTreeMap::new()
        })
    }

    fn describe_configuration(&self) -> BTreeMap<String, DataKey> {
        call_as(self.inner.as_ref(), "describe_configuration").unwrap_or_else(|e| {
            tracing::warn!(device = %self.name, error = %e, "describe_configuration failed");
            BTreeMap::new()
        })
    }

    fn storage_slot(&mut self) -> Option<&mut StorageSlot> {
        self.storage.as_mut()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Device constructor for a structurally qualifying dynamic class.
pub struct StructuralDeviceClass {
    class: Arc<dyn DynamicClass>,
}

impl StructuralDeviceClass {
    /// Wrap a dynamic class.
    pub fn new(class: Arc<dyn DynamicClass>) -> Self {
        Self { class }
    }
}

impl DeviceClass for StructuralDeviceClass {
    fn type_name(&self) -> &str {
        self.class.type_name()
    }

    fn defaults(&self) -> Kwargs {
        self.class.defaults()
    }

    fn build(&self, name: &str, kwargs: &Kwargs) -> anyhow::Result<Box<dyn Device>> {
        let inner = self.class.instantiate(DynamicArgs {
            name,
            kwargs,
            devices: None,
            virtual_bus: None,
        })?;
        // the object may report its own name; the resolved one is the fallback
        let own_name = inner
            .get("name")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| name.to_string());
        let parent = inner.get("parent").and_then(|v| v.as_str().map(str::to_string));
        let storage = has_member(self.class.members(), "storage").then(StorageSlot::default);

        Ok(Box::new(StructuralDevice {
            name: own_name,
            parent,
            storage,
            inner,
        }))
    }
}

// =============================================================================
// Presenters
// =============================================================================

/// [`Presenter`] backed by a dynamic object.
pub struct StructuralPresenter {
    name: String,
    devices: DeviceMap,
    virtual_bus: Arc<VirtualBus>,
    provides: bool,
    shuts_down: bool,
    inner: Box<dyn DynamicObject>,
}

impl StructuralPresenter {
    /// The wrapped dynamic object.
    pub fn inner(&self) -> &dyn DynamicObject {
        self.inner.as_ref()
    }
}

impl Presenter for StructuralPresenter {
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
        self.provides.then_some(self as &dyn IsProvider)
    }

    fn as_shutdown(&self) -> Option<&dyn HasShutdown> {
        self.shuts_down.then_some(self as &dyn HasShutdown)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl IsProvider for StructuralPresenter {
    /// The `register_providers` member returns a JSON object; each entry is
    /// published as a shared `serde_json::Value`.
    fn register_providers(&self, container: &DependencyContainer) -> anyhow::Result<()> {
        let provided: BTreeMap<String, Value> = call_as(self.inner.as_ref(), "register_providers")?;
        for (name, value) in provided {
            container.register_object(name, Arc::new(value))?;
        }
        Ok(())
    }
}

impl HasShutdown for StructuralPresenter {
    fn shutdown(&self) -> anyhow::Result<()> {
        self.inner.call("shutdown", Value::Null).map(|_| ())
    }
}

/// Presenter constructor for a structurally qualifying dynamic class.
pub struct StructuralPresenterClass {
    class: Arc<dyn DynamicClass>,
}

impl StructuralPresenterClass {
    /// Wrap a dynamic class.
    pub fn new(class: Arc<dyn DynamicClass>) -> Self {
        Self { class }
    }
}

impl PresenterClass for StructuralPresenterClass {
    fn type_name(&self) -> &str {
        self.class.type_name()
    }

    fn defaults(&self) -> Kwargs {
        self.class.defaults()
    }

    fn build(
        &self,
        name: &str,
        devices: &DeviceMap,
        virtual_bus: &Arc<VirtualBus>,
        kwargs: &Kwargs,
    ) -> anyhow::Result<Box<dyn Presenter>> {
        let inner = self.class.instantiate(DynamicArgs {
            name,
            kwargs,
            devices: Some(devices),
            virtual_bus: Some(virtual_bus),
        })?;
        let members = self.class.members();

        Ok(Box::new(StructuralPresenter {
            name: name.to_string(),
            devices: devices.clone(),
            virtual_bus: virtual_bus.clone(),
            provides: has_member(members, "register_providers"),
            shuts_down: has_member(members, "shutdown"),
            inner,
        }))
    }
}

// =============================================================================
// Views
// =============================================================================

/// [`View`] backed by a dynamic object.
pub struct StructuralView {
    name: String,
    virtual_bus: Arc<VirtualBus>,
    injectable: bool,
    inner: Box<dyn DynamicObject>,
}

impl StructuralView {
    /// The wrapped dynamic object.
    pub fn inner(&self) -> &dyn DynamicObject {
        self.inner.as_ref()
    }
}

impl View for StructuralView {
    fn name(&self) -> &str {
        &self.name
    }

    fn virtual_bus(&self) -> &Arc<VirtualBus> {
        &self.virtual_bus
    }

    fn as_injectable(&mut self) -> Option<&mut dyn IsInjectable> {
        if self.injectable {
            Some(self as &mut dyn IsInjectable)
        } else {
            None
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl IsInjectable for StructuralView {
    /// Hands the provider names and the container configuration to the
    /// `inject_dependencies` member.
    fn inject_dependencies(&mut self, container: &Arc<DependencyContainer>) -> anyhow::Result<()> {
        let args = serde_json::json!({
            "providers": container.names(),
            "config": serde_json::to_value(container.config())?,
        });
        self.inner.call("inject_dependencies", args).map(|_| ())
    }
}

/// View constructor for a structurally qualifying dynamic class.
pub struct StructuralViewClass {
    class: Arc<dyn DynamicClass>,
}

impl StructuralViewClass {
    /// Wrap a dynamic class.
    pub fn new(class: Arc<dyn DynamicClass>) -> Self {
        Self { class }
    }
}

impl ViewClass for StructuralViewClass {
    fn type_name(&self) -> &str {
        self.class.type_name()
    }

    fn defaults(&self) -> Kwargs {
        self.class.defaults()
    }

    fn build(
        &self,
        name: &str,
        virtual_bus: &Arc<VirtualBus>,
        kwargs: &Kwargs,
    ) -> anyhow::Result<Box<dyn View>> {
        let inner = self.class.instantiate(DynamicArgs {
            name,
            kwargs,
            devices: None,
            virtual_bus: Some(virtual_bus),
        })?;

        Ok(Box::new(StructuralView {
            name: name.to_string(),
            virtual_bus: virtual_bus.clone(),
            injectable: has_member(self.class.members(), "inject_dependencies"),
            inner,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::{satisfies, ClassRef, Group};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Scripted stage exposing the device members plus `storage` and `shutdown`.
    struct ScriptedStage;

    struct ScriptedStageObject {
        egu: String,
        calls: Mutex<Vec<String>>,
    }

    impl DynamicClass for ScriptedStage {
        fn type_name(&self) -> &str {
            "ScriptedStage"
        }

        fn members(&self) -> &[&str] {
            &[
                "name",
                "parent",
                "read_configuration",
                "describe_configuration",
                "storage",
                "devices",
                "virtual_bus",
                "shutdown",
                "register_providers",
                "inject_dependencies",
            ]
        }

        fn instantiate(&self, args: DynamicArgs<'_>) -> anyhow::Result<Box<dyn DynamicObject>> {
            Ok(Box::new(ScriptedStageObject {
                egu: args.kwargs.get_str("egu").unwrap_or("mm").to_string(),
                calls: Mutex::new(Vec::new()),
            }))
        }
    }

    impl DynamicObject for ScriptedStageObject {
        fn get(&self, member: &str) -> Option<Value> {
            match member {
                "parent" => Some(json!("rack")),
                _ => None,
            }
        }

        fn call(&self, member: &str, args: Value) -> anyhow::Result<Value> {
            self.calls.lock().push(member.to_string());
            match member {
                "read_configuration" => Ok(json!({
                    "egu": {"value": self.egu, "timestamp": 0.0}
                })),
                "describe_configuration" => Ok(json!({
                    "egu": {"source": "settings", "dtype": "string", "shape": []}
                })),
                "register_providers" => Ok(json!({"stage_limits": [0, 100]})),
                "inject_dependencies" => {
                    anyhow::ensure!(args["providers"].is_array(), "missing providers");
                    Ok(Value::Null)
                }
                "shutdown" => Ok(Value::Null),
                other => anyhow::bail!("no member {}", other),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn class() -> ClassRef {
        ClassRef::Dynamic(Arc::new(ScriptedStage))
    }

    #[test]
    fn dynamic_device_is_driven_through_members() {
        let class = class();
        assert!(satisfies(&class, Group::Devices));

        let kwargs = Kwargs::new().with("egu", "um");
        let mut device = class.device_class().unwrap().build("stage", &kwargs).unwrap();

        assert_eq!(device.name(), "stage");
        assert_eq!(device.parent(), Some("rack"));
        assert_eq!(device.read_configuration()["egu"].value, json!("um"));
        assert_eq!(device.describe_configuration()["egu"].dtype, "string");
        assert!(device.storage_slot().is_some());
    }

    #[test]
    fn dynamic_presenter_exposes_optional_capabilities() {
        let bus = Arc::new(VirtualBus::new());
        let presenter = class()
            .presenter_class()
            .unwrap()
            .build("ctrl", &DeviceMap::new(), &bus, &Kwargs::new())
            .unwrap();

        let di = DependencyContainer::new(Kwargs::new());
        presenter.as_provider().unwrap().register_providers(&di).unwrap();
        assert_eq!(*di.resolve::<Value>("stage_limits").unwrap(), json!([0, 100]));

        presenter.as_shutdown().unwrap().shutdown().unwrap();
        let inner = presenter
            .as_any()
            .downcast_ref::<StructuralPresenter>()
            .unwrap()
            .inner()
            .as_any()
            .downcast_ref::<ScriptedStageObject>()
            .unwrap();
        assert_eq!(*inner.calls.lock(), vec!["register_providers", "shutdown"]);
    }

    #[test]
    fn dynamic_view_receives_injection_surface() {
        let bus = Arc::new(VirtualBus::new());
        let mut view = class()
            .view_class()
            .unwrap()
            .build("panel", &bus, &Kwargs::new())
            .unwrap();

        let di = Arc::new(DependencyContainer::new(Kwargs::new()));
        view.as_injectable().unwrap().inject_dependencies(&di).unwrap();
    }
}
