//! Component descriptors.
//!
//! A descriptor pairs a resolved name with the class and final kwargs of one
//! component, and owns the instance once it is built. Reading the instance
//! before a successful build is an error.

use crate::bus::VirtualBus;
use crate::di::DependencyContainer;
use crate::error::{AppResult, RedsunError};
use crate::kwargs::Kwargs;
use crate::protocols::{Device, DeviceClass, DeviceMap, Group, Presenter, PresenterClass, View, ViewClass};
use crate::storage::StorageInjector;
use std::fmt;
use std::sync::Arc;

/// Descriptor of one component of class `C` producing instances `I`.
pub struct Component<C: ?Sized, I> {
    name: String,
    class: Arc<C>,
    kwargs: Kwargs,
    instance: Option<I>,
}

/// Device descriptor.
pub type DeviceComponent = Component<dyn DeviceClass, Arc<dyn Device>>;

/// Presenter descriptor.
pub type PresenterComponent = Component<dyn PresenterClass, Arc<dyn Presenter>>;

/// View descriptor.
pub type ViewComponent = Component<dyn ViewClass, Arc<dyn View>>;

impl<C: ?Sized, I> Component<C, I> {
    /// Create an unbuilt descriptor.
    pub fn new(name: impl Into<String>, class: Arc<C>, kwargs: Kwargs) -> Self {
        Self {
            name: name.into(),
            class,
            kwargs,
            instance: None,
        }
    }

    /// Resolved name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Implementation class.
    pub fn class(&self) -> &Arc<C> {
        &self.class
    }

    /// Final constructor kwargs.
    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Whether the instance exists.
    pub fn is_built(&self) -> bool {
        self.instance.is_some()
    }

    /// The built instance.
    pub fn instance(&self) -> AppResult<&I> {
        self.instance
            .as_ref()
            .ok_or_else(|| RedsunError::ComponentNotBuilt(self.name.clone()))
    }

    /// Drop the instance, returning to the unbuilt state.
    pub fn reset(&mut self) {
        self.instance = None;
    }

    fn status(&self) -> &'static str {
        if self.is_built() {
            "built"
        } else {
            "pending"
        }
    }
}

impl DeviceComponent {
    /// Build the device and attach the storage writer if it carries the marker.
    pub fn build(&mut self, storage: &mut StorageInjector<'_>) -> anyhow::Result<&Arc<dyn Device>> {
        let mut device = self.class.build(&self.name, &self.kwargs)?;
        storage.inject(&self.name, device.as_mut());
        Ok(self.instance.insert(Arc::from(device)))
    }
}

impl PresenterComponent {
    /// Build the presenter and publish its providers, if it has any.
    pub fn build(
        &mut self,
        devices: &DeviceMap,
        virtual_bus: &Arc<VirtualBus>,
        di: &DependencyContainer,
    ) -> anyhow::Result<&Arc<dyn Presenter>> {
        let presenter = self.class.build(&self.name, devices, virtual_bus, &self.kwargs)?;
        if let Some(provider) = presenter.as_provider() {
            provider.register_providers(di)?;
        }
        Ok(self.instance.insert(Arc::from(presenter)))
    }
}

impl ViewComponent {
    /// Build the view and hand it the injection surface, if it accepts one.
    pub fn build(
        &mut self,
        virtual_bus: &Arc<VirtualBus>,
        di: &Arc<DependencyContainer>,
    ) -> anyhow::Result<&Arc<dyn View>> {
        let mut view = self.class.build(&self.name, virtual_bus, &self.kwargs)?;
        if let Some(injectable) = view.as_injectable() {
            injectable.inject_dependencies(di)?;
        }
        Ok(self.instance.insert(Arc::from(view)))
    }
}

impl fmt::Display for DeviceComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceComponent({:?}, {})", self.name, self.status())
    }
}

impl fmt::Display for PresenterComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PresenterComponent({:?}, {})", self.name, self.status())
    }
}

impl fmt::Display for ViewComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewComponent({:?}, {})", self.name, self.status())
    }
}

/// Borrowed descriptor of any group.
#[derive(Clone, Copy)]
pub enum ComponentDescriptor<'a> {
    /// A device
    Device(&'a DeviceComponent),
    /// A presenter
    Presenter(&'a PresenterComponent),
    /// A view
    View(&'a ViewComponent),
}

impl ComponentDescriptor<'_> {
    /// Group of the component.
    pub fn group(&self) -> Group {
        match self {
            ComponentDescriptor::Device(_) => Group::Devices,
            ComponentDescriptor::Presenter(_) => Group::Presenters,
            ComponentDescriptor::View(_) => Group::Views,
        }
    }

    /// Resolved name.
    pub fn name(&self) -> &str {
        match self {
            ComponentDescriptor::Device(c) => c.name(),
            ComponentDescriptor::Presenter(c) => c.name(),
            ComponentDescriptor::View(c) => c.name(),
        }
    }

    /// Type name of the implementation class.
    pub fn type_name(&self) -> &str {
        match self {
            ComponentDescriptor::Device(c) => c.class().type_name(),
            ComponentDescriptor::Presenter(c) => c.class().type_name(),
            ComponentDescriptor::View(c) => c.class().type_name(),
        }
    }

    /// Final constructor kwargs.
    pub fn kwargs(&self) -> &Kwargs {
        match self {
            ComponentDescriptor::Device(c) => c.kwargs(),
            ComponentDescriptor::Presenter(c) => c.kwargs(),
            ComponentDescriptor::View(c) => c.kwargs(),
        }
    }

    /// Whether the instance exists.
    pub fn is_built(&self) -> bool {
        match self {
            ComponentDescriptor::Device(c) => c.is_built(),
            ComponentDescriptor::Presenter(c) => c.is_built(),
            ComponentDescriptor::View(c) => c.is_built(),
        }
    }
}

impl fmt::Display for ComponentDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentDescriptor::Device(c) => fmt::Display::fmt(c, f),
            ComponentDescriptor::Presenter(c) => fmt::Display::fmt(c, f),
            ComponentDescriptor::View(c) => fmt::Display::fmt(c, f),
        }
    }
}
