//! Component protocols and capability checks.
//!
//! Every component belongs to one of three groups: devices, presenters and
//! views. A group is described by a canonical interface (the [`Device`],
//! [`Presenter`] and [`View`] traits) and by a minimal set of member names a
//! class must expose to qualify for the group.
//!
//! Classes are represented by [`ClassRef`], a cheap handle over the
//! constructor object of a component:
//!
//! - nominal classes implement [`DeviceClass`], [`PresenterClass`] or
//!   [`ViewClass`] and qualify for their own group only;
//! - dynamic classes implement [`DynamicClass`] and describe their members at
//!   runtime. They qualify for any group whose required members they expose.
//!
//! [`satisfies`] runs both checks. The structural path is deliberately open:
//! a dynamic class that exposes the right member names but means something
//! else still qualifies.
//!
//! Optional capabilities ([`IsProvider`], [`IsInjectable`], [`HasShutdown`])
//! are discovered through accessor methods on the component traits rather
//! than downcasting.

use crate::bus::VirtualBus;
use crate::di::DependencyContainer;
use crate::kwargs::Kwargs;
use crate::storage::StorageSlot;
use crate::structural::{DynamicClass, StructuralDeviceClass, StructuralPresenterClass, StructuralViewClass};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// Groups
// =============================================================================

/// Component group. Each group is an independent naming namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    /// Hardware abstractions (motors, detectors, ...)
    #[serde(alias = "models")]
    Devices,
    /// Controllers sitting between devices and views
    #[serde(alias = "controllers")]
    Presenters,
    /// User interface widgets
    #[serde(alias = "widgets")]
    Views,
}

impl Group {
    /// All groups in build order.
    pub const ALL: [Group; 3] = [Group::Devices, Group::Presenters, Group::Views];

    /// Section / manifest key for this group.
    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Devices => "devices",
            Group::Presenters => "presenters",
            Group::Views => "views",
        }
    }

    /// Members a class must expose to structurally qualify for this group.
    pub fn required_members(&self) -> &'static [&'static str] {
        match self {
            Group::Devices => &["read_configuration", "describe_configuration", "name", "parent"],
            Group::Presenters => &["devices", "virtual_bus"],
            Group::Views => &["virtual_bus"],
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Group::Devices => "device",
            Group::Presenters => "presenter",
            Group::Views => "view",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for Group {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "devices" | "models" => Ok(Group::Devices),
            "presenters" | "controllers" => Ok(Group::Presenters),
            "views" | "widgets" => Ok(Group::Views),
            other => Err(format!("unknown component group '{}'", other)),
        }
    }
}

// =============================================================================
// Component Interfaces
// =============================================================================

/// A single configuration reading, Bluesky style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Current value
    pub value: serde_json::Value,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

/// Description of one configuration field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataKey {
    /// Where the value comes from (e.g. "settings")
    pub source: String,
    /// JSON data type ("number", "string", "array", ...)
    pub dtype: String,
    /// Array shape, empty for scalars
    #[serde(default)]
    pub shape: Vec<usize>,
}

/// Built devices keyed by resolved name.
pub type DeviceMap = BTreeMap<String, Arc<dyn Device>>;

/// Canonical device interface.
pub trait Device: Send + Sync + 'static {
    /// Resolved component name.
    fn name(&self) -> &str;

    /// Name of the owning device, if this device is a sub-component.
    fn parent(&self) -> Option<&str> {
        None
    }

    /// Current configuration values.
    fn read_configuration(&self) -> BTreeMap<String, Reading>;

    /// Schema of the values returned by [`Device::read_configuration`].
    fn describe_configuration(&self) -> BTreeMap<String, DataKey>;

    /// Storage marker. Devices that want a writer return their slot; the
    /// container attaches the shared writer to it during build.
    fn storage_slot(&mut self) -> Option<&mut StorageSlot> {
        None
    }

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
}

/// Canonical presenter interface.
pub trait Presenter: Send + Sync + 'static {
    /// Resolved component name.
    fn name(&self) -> &str;

    /// Devices made available to this presenter.
    fn devices(&self) -> &DeviceMap;

    /// Shared signal bus.
    fn virtual_bus(&self) -> &Arc<VirtualBus>;

    /// Provider capability.
    fn as_provider(&self) -> Option<&dyn IsProvider> {
        None
    }

    /// Shutdown capability.
    fn as_shutdown(&self) -> Option<&dyn HasShutdown> {
        None
    }

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
}

/// Canonical view interface.
pub trait View: Send + Sync + 'static {
    /// Resolved component name.
    fn name(&self) -> &str;

    /// Shared signal bus.
    fn virtual_bus(&self) -> &Arc<VirtualBus>;

    /// Injection capability.
    fn as_injectable(&mut self) -> Option<&mut dyn IsInjectable> {
        None
    }

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
}

/// Presenters that publish dependencies for views.
pub trait IsProvider {
    /// Register providers into the container-wide injection surface.
    fn register_providers(&self, container: &DependencyContainer) -> anyhow::Result<()>;
}

/// Views that consume dependencies published by presenters.
pub trait IsInjectable {
    /// Pull dependencies out of the injection surface.
    fn inject_dependencies(&mut self, container: &Arc<DependencyContainer>) -> anyhow::Result<()>;
}

/// Presenters holding resources that need an orderly shutdown.
pub trait HasShutdown {
    /// Release resources. Called once per `Container::shutdown`.
    fn shutdown(&self) -> anyhow::Result<()>;
}

// =============================================================================
// Classes
// =============================================================================

/// Constructor object for devices.
pub trait DeviceClass: Send + Sync + 'static {
    /// Type name used in logs and manifests.
    fn type_name(&self) -> &str;

    /// Plugin-level default kwargs, overridden by config and inline kwargs.
    fn defaults(&self) -> Kwargs {
        Kwargs::new()
    }

    /// Instantiate the device.
    fn build(&self, name: &str, kwargs: &Kwargs) -> anyhow::Result<Box<dyn Device>>;
}

/// Constructor object for presenters.
pub trait PresenterClass: Send + Sync + 'static {
    /// Type name used in logs and manifests.
    fn type_name(&self) -> &str;

    /// Plugin-level default kwargs.
    fn defaults(&self) -> Kwargs {
        Kwargs::new()
    }

    /// Instantiate the presenter with the already-built devices.
    fn build(
        &self,
        name: &str,
        devices: &DeviceMap,
        virtual_bus: &Arc<VirtualBus>,
        kwargs: &Kwargs,
    ) -> anyhow::Result<Box<dyn Presenter>>;
}

/// Constructor object for views.
pub trait ViewClass: Send + Sync + 'static {
    /// Type name used in logs and manifests.
    fn type_name(&self) -> &str;

    /// Plugin-level default kwargs.
    fn defaults(&self) -> Kwargs {
        Kwargs::new()
    }

    /// Instantiate the view.
    fn build(
        &self,
        name: &str,
        virtual_bus: &Arc<VirtualBus>,
        kwargs: &Kwargs,
    ) -> anyhow::Result<Box<dyn View>>;
}

type DeviceCtor = dyn Fn(&str, &Kwargs) -> anyhow::Result<Box<dyn Device>> + Send + Sync;
type PresenterCtor =
    dyn Fn(&str, &DeviceMap, &Arc<VirtualBus>, &Kwargs) -> anyhow::Result<Box<dyn Presenter>> + Send + Sync;
type ViewCtor = dyn Fn(&str, &Arc<VirtualBus>, &Kwargs) -> anyhow::Result<Box<dyn View>> + Send + Sync;

/// Closure-backed class, for components that need nothing but a constructor.
pub struct FnClass<F: ?Sized> {
    type_name: &'static str,
    defaults: Kwargs,
    ctor: Box<F>,
}

impl<F: ?Sized> FnClass<F> {
    /// Attach plugin-level default kwargs.
    pub fn with_defaults(mut self, defaults: Kwargs) -> Self {
        self.defaults = defaults;
        self
    }
}

impl DeviceClass for FnClass<DeviceCtor> {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn defaults(&self) -> Kwargs {
        self.defaults.clone()
    }

    fn build(&self, name: &str, kwargs: &Kwargs) -> anyhow::Result<Box<dyn Device>> {
        (self.ctor)(name, kwargs)
    }
}

impl PresenterClass for FnClass<PresenterCtor> {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn defaults(&self) -> Kwargs {
        self.defaults.clone()
    }

    fn build(
        &self,
        name: &str,
        devices: &DeviceMap,
        virtual_bus: &Arc<VirtualBus>,
        kwargs: &Kwargs,
    ) -> anyhow::Result<Box<dyn Presenter>> {
        (self.ctor)(name, devices, virtual_bus, kwargs)
    }
}

impl ViewClass for FnClass<ViewCtor> {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn defaults(&self) -> Kwargs {
        self.defaults.clone()
    }

    fn build(
        &self,
        name: &str,
        virtual_bus: &Arc<VirtualBus>,
        kwargs: &Kwargs,
    ) -> anyhow::Result<Box<dyn View>> {
        (self.ctor)(name, virtual_bus, kwargs)
    }
}

/// Handle to the implementation class of a component.
#[derive(Clone)]
pub enum ClassRef {
    /// Nominal device class
    Device(Arc<dyn DeviceClass>),
    /// Nominal presenter class
    Presenter(Arc<dyn PresenterClass>),
    /// Nominal view class
    View(Arc<dyn ViewClass>),
    /// Class described by its members at runtime
    Dynamic(Arc<dyn DynamicClass>),
}

impl ClassRef {
    /// Device class from a constructor closure.
    pub fn device<F>(type_name: &'static str, ctor: F) -> Self
    where
        F: Fn(&str, &Kwargs) -> anyhow::Result<Box<dyn Device>> + Send + Sync + 'static,
    {
        ClassRef::Device(Arc::new(Self::device_fn(type_name, ctor)))
    }

    /// Closure-backed device class, before wrapping, so defaults can be attached.
    pub fn device_fn<F>(type_name: &'static str, ctor: F) -> FnClass<DeviceCtor>
    where
        F: Fn(&str, &Kwargs) -> anyhow::Result<Box<dyn Device>> + Send + Sync + 'static,
    {
        FnClass {
            type_name,
            defaults: Kwargs::new(),
            ctor: Box::new(ctor),
        }
    }

    /// Presenter class from a constructor closure.
    pub fn presenter<F>(type_name: &'static str, ctor: F) -> Self
    where
        F: Fn(&str, &DeviceMap, &Arc<VirtualBus>, &Kwargs) -> anyhow::Result<Box<dyn Presenter>>
            + Send
            + Sync
            + 'static,
    {
        let class: FnClass<PresenterCtor> = FnClass {
            type_name,
            defaults: Kwargs::new(),
            ctor: Box::new(ctor),
        };
        ClassRef::Presenter(Arc::new(class))
    }

    /// View class from a constructor closure.
    pub fn view<F>(type_name: &'static str, ctor: F) -> Self
    where
        F: Fn(&str, &Arc<VirtualBus>, &Kwargs) -> anyhow::Result<Box<dyn View>> + Send + Sync + 'static,
    {
        let class: FnClass<ViewCtor> = FnClass {
            type_name,
            defaults: Kwargs::new(),
            ctor: Box::new(ctor),
        };
        ClassRef::View(Arc::new(class))
    }

    /// Type name of the underlying class.
    pub fn type_name(&self) -> &str {
        match self {
            ClassRef::Device(c) => c.type_name(),
            ClassRef::Presenter(c) => c.type_name(),
            ClassRef::View(c) => c.type_name(),
            ClassRef::Dynamic(c) => c.type_name(),
        }
    }

    /// Group whose canonical interface this class implements, if any.
    pub fn nominal_group(&self) -> Option<Group> {
        match self {
            ClassRef::Device(_) => Some(Group::Devices),
            ClassRef::Presenter(_) => Some(Group::Presenters),
            ClassRef::View(_) => Some(Group::Views),
            ClassRef::Dynamic(_) => None,
        }
    }

    /// Plugin-level default kwargs.
    pub fn defaults(&self) -> Kwargs {
        match self {
            ClassRef::Device(c) => c.defaults(),
            ClassRef::Presenter(c) => c.defaults(),
            ClassRef::View(c) => c.defaults(),
            ClassRef::Dynamic(c) => c.defaults(),
        }
    }

    /// View this class as a device constructor.
    pub fn device_class(&self) -> Option<Arc<dyn DeviceClass>> {
        match self {
            ClassRef::Device(c) => Some(c.clone()),
            ClassRef::Dynamic(c) if implements_structural(self, Group::Devices) => {
                Some(Arc::new(StructuralDeviceClass::new(c.clone())))
            }
            _ => None,
        }
    }

    /// View this class as a presenter constructor.
    pub fn presenter_class(&self) -> Option<Arc<dyn PresenterClass>> {
        match self {
            ClassRef::Presenter(c) => Some(c.clone()),
            ClassRef::Dynamic(c) if implements_structural(self, Group::Presenters) => {
                Some(Arc::new(StructuralPresenterClass::new(c.clone())))
            }
            _ => None,
        }
    }

    /// View this class as a view constructor.
    pub fn view_class(&self) -> Option<Arc<dyn ViewClass>> {
        match self {
            ClassRef::View(c) => Some(c.clone()),
            ClassRef::Dynamic(c) if implements_structural(self, Group::Views) => {
                Some(Arc::new(StructuralViewClass::new(c.clone())))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ClassRef::Device(_) => "Device",
            ClassRef::Presenter(_) => "Presenter",
            ClassRef::View(_) => "View",
            ClassRef::Dynamic(_) => "Dynamic",
        };
        write!(f, "ClassRef::{}({})", kind, self.type_name())
    }
}

impl From<Arc<dyn DeviceClass>> for ClassRef {
    fn from(class: Arc<dyn DeviceClass>) -> Self {
        ClassRef::Device(class)
    }
}

impl From<Arc<dyn PresenterClass>> for ClassRef {
    fn from(class: Arc<dyn PresenterClass>) -> Self {
        ClassRef::Presenter(class)
    }
}

impl From<Arc<dyn ViewClass>> for ClassRef {
    fn from(class: Arc<dyn ViewClass>) -> Self {
        ClassRef::View(class)
    }
}

impl From<Arc<dyn DynamicClass>> for ClassRef {
    fn from(class: Arc<dyn DynamicClass>) -> Self {
        ClassRef::Dynamic(class)
    }
}

// =============================================================================
// Protocol Checks
// =============================================================================

/// Nominal check: the class implements the group's canonical interface.
pub fn implements_nominal(class: &ClassRef, group: Group) -> bool {
    class.nominal_group() == Some(group)
}

/// Structural check: the class exposes every member the group requires.
///
/// Only dynamic classes are checked this way; nominal classes cannot be
/// constructed through another group's interface.
pub fn implements_structural(class: &ClassRef, group: Group) -> bool {
    match class {
        ClassRef::Dynamic(c) => {
            let members = c.members();
            group.required_members().iter().all(|m| members.contains(m))
        }
        _ => false,
    }
}

/// Whether `class` qualifies for `group`, nominally or structurally.
pub fn satisfies(class: &ClassRef, group: Group) -> bool {
    implements_nominal(class, group) || implements_structural(class, group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structural::{DynamicArgs, DynamicObject};

    struct Members(&'static [&'static str]);

    impl DynamicClass for Members {
        fn type_name(&self) -> &str {
            "Members"
        }

        fn members(&self) -> &[&str] {
            self.0
        }

        fn instantiate(&self, _args: DynamicArgs<'_>) -> anyhow::Result<Box<dyn DynamicObject>> {
            anyhow::bail!("not constructible")
        }
    }

    fn dynamic(members: &'static [&'static str]) -> ClassRef {
        ClassRef::Dynamic(Arc::new(Members(members)))
    }

    fn nominal_device() -> ClassRef {
        ClassRef::device("Nothing", |_, _| anyhow::bail!("unused"))
    }

    #[test]
    fn group_names_accept_legacy_aliases() {
        assert_eq!("models".parse::<Group>(), Ok(Group::Devices));
        assert_eq!("controllers".parse::<Group>(), Ok(Group::Presenters));
        assert_eq!("widgets".parse::<Group>(), Ok(Group::Views));
        assert!("motors".parse::<Group>().is_err());

        let parsed: Group = serde_yaml::from_str("controllers").unwrap();
        assert_eq!(parsed, Group::Presenters);
    }

    #[test]
    fn nominal_class_satisfies_only_its_group() {
        let class = nominal_device();
        assert!(satisfies(&class, Group::Devices));
        assert!(!satisfies(&class, Group::Presenters));
        assert!(!satisfies(&class, Group::Views));
        assert!(class.device_class().is_some());
        assert!(class.view_class().is_none());
    }

    #[test]
    fn structural_class_needs_every_member() {
        let device_like = dynamic(&["read_configuration", "describe_configuration", "name", "parent"]);
        assert!(satisfies(&device_like, Group::Devices));
        assert!(!satisfies(&device_like, Group::Views));

        let partial = dynamic(&["read_configuration", "name"]);
        assert!(!satisfies(&partial, Group::Devices));
        assert!(partial.device_class().is_none());
    }

    #[test]
    fn structural_check_accepts_lookalikes() {
        // anything with a bus reference passes as a view
        let lookalike = dynamic(&["virtual_bus", "devices", "unrelated"]);
        assert!(satisfies(&lookalike, Group::Views));
        assert!(satisfies(&lookalike, Group::Presenters));
    }
}
