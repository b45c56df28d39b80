//! Application container and build orchestration.
//!
//! The container owns three ordered descriptor sets and turns them into a
//! live object graph:
//!
//! 1. a fresh [`VirtualBus`] and [`DependencyContainer`] are created;
//! 2. devices are built in declaration order. A failing device is logged and
//!    left out; the others still build. Devices carrying the storage marker
//!    receive the container's writer;
//! 3. presenters are built with every successfully built device and the bus.
//!    Providers publish into the injection surface. A failure aborts the
//!    build and is returned;
//! 4. views are built with the bus; injectable views receive the injection
//!    surface. A failure aborts the build and is returned;
//! 5. the container is marked built.
//!
//! ```text
//! UNBUILT --build()--> BUILT --shutdown()--> UNBUILT
//! ```
//!
//! Built state (`devices()`, `presenters()`, `views()`, the bus and the
//! injection surface) is only readable while built.

use super::component::{ComponentDescriptor, DeviceComponent, PresenterComponent, ViewComponent};
use super::frontend::{Frontend, Launcher};
use super::layout::ContainerLayout;
use crate::bus::VirtualBus;
use crate::config::{load_config, merge_layers, ContainerConfig};
use crate::di::DependencyContainer;
use crate::error::{AppResult, RedsunError};
use crate::kwargs::Kwargs;
use crate::plugin::info::{ComponentInfo, META_KEYS};
use crate::plugin::resolver::ManifestResolver;
use crate::protocols::{ClassRef, DeviceMap, Group, Presenter, View};
use crate::storage::{StorageConfig, StorageInjector, StorageRegistry, Writer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Application container.
pub struct Container {
    config: ContainerConfig,
    config_path: Option<PathBuf>,
    frontend: Frontend,

    devices: Vec<DeviceComponent>,
    presenters: Vec<PresenterComponent>,
    views: Vec<ViewComponent>,

    virtual_bus: Option<Arc<VirtualBus>>,
    di_container: Option<Arc<DependencyContainer>>,
    storage_registry: StorageRegistry,
    storage_writer: Option<Arc<dyn Writer>>,
    plugin_info: BTreeMap<Group, BTreeMap<String, ComponentInfo>>,

    is_built: bool,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("session", &self.config.session)
            .field("frontend", &self.frontend)
            .field("devices", &self.devices.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("presenters", &self.presenters.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("views", &self.views.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("is_built", &self.is_built)
            .finish()
    }
}

impl Container {
    /// Unbuilt container from a declarative layout.
    pub fn new(layout: ContainerLayout) -> AppResult<Self> {
        layout.finalize()
    }

    /// Empty, unbuilt container for `config`. Components declared in the
    /// config's sections are not registered; see [`Container::from_config`].
    ///
    /// Fails with `ConfigError::UnknownFrontend` for an unsupported frontend.
    pub fn with_config(config: ContainerConfig) -> AppResult<Self> {
        let frontend: Frontend = config.frontend.parse()?;
        Ok(Self {
            config,
            config_path: None,
            frontend,
            devices: Vec::new(),
            presenters: Vec::new(),
            views: Vec::new(),
            virtual_bus: None,
            di_container: None,
            storage_registry: StorageRegistry::new(),
            storage_writer: None,
            plugin_info: BTreeMap::new(),
            is_built: false,
        })
    }

    /// Unbuilt container declared entirely by a configuration file.
    ///
    /// Every entry of the `devices`, `presenters` and `views` sections names
    /// its plugin through `plugin_name` and `plugin_id`. Entries that cannot
    /// be resolved are logged and skipped; the remaining keys of each entry
    /// become the component's kwargs, on top of the plugin's defaults.
    pub fn from_config(path: &Path, resolver: &ManifestResolver) -> AppResult<Self> {
        let config = load_config(path)?;
        let mut container = Self::with_config(config)?;
        container.config_path = Some(path.to_path_buf());

        let mut pass = resolver.pass();
        for group in Group::ALL {
            let entries: Vec<(String, Kwargs)> = container
                .config
                .section(group)
                .iter()
                .map(|(name, entry)| (name.to_string(), entry.clone()))
                .collect();

            for (name, entry) in entries {
                let (Some(plugin_name), Some(plugin_id)) = (entry.get_str("plugin_name"), entry.get_str("plugin_id"))
                else {
                    error!(
                        "{} '{}' does not name both plugin_name and plugin_id. Skipping.",
                        group, name
                    );
                    continue;
                };

                let Some(resolved) = pass.resolve(plugin_name, plugin_id, group) else {
                    continue;
                };

                let info = match resolved.info.build(&entry) {
                    Ok(info) => info,
                    Err(e) => {
                        error!("Invalid info for {} '{}': {:#}", group, name, e);
                        continue;
                    }
                };

                let kwargs = merge_layers(
                    &resolved.class.defaults(),
                    Some(&entry.without(&META_KEYS)),
                    &Kwargs::new(),
                );
                match container.register(group, &name, resolved.class, kwargs) {
                    Ok(()) => {
                        container.plugin_info.entry(group).or_default().insert(name, info);
                    }
                    Err(e) => error!("{}", e),
                }
            }
        }

        info!(
            "Container '{}' declared from {}: {} devices, {} presenters, {} views",
            container.config.session,
            path.display(),
            container.devices.len(),
            container.presenters.len(),
            container.views.len()
        );
        Ok(container)
    }

    pub(crate) fn set_config_path(&mut self, path: Option<PathBuf>) {
        self.config_path = path;
    }

    /// Register a component.
    ///
    /// # Errors
    ///
    /// - [`RedsunError::AlreadyBuilt`] once the container is built
    /// - [`RedsunError::DuplicateComponent`] if `name` is taken in `group`
    /// - [`RedsunError::ProtocolViolation`] if `class` cannot build a `group` component
    pub fn register(&mut self, group: Group, name: &str, class: ClassRef, kwargs: Kwargs) -> AppResult<()> {
        if self.is_built {
            return Err(RedsunError::AlreadyBuilt);
        }
        if self.names(group).any(|existing| existing == name) {
            return Err(RedsunError::DuplicateComponent {
                group,
                name: name.to_string(),
            });
        }

        let violation = || RedsunError::ProtocolViolation {
            class: class.type_name().to_string(),
            group,
        };
        match group {
            Group::Devices => {
                let class = class.device_class().ok_or_else(violation)?;
                self.devices.push(DeviceComponent::new(name, class, kwargs));
            }
            Group::Presenters => {
                let class = class.presenter_class().ok_or_else(violation)?;
                self.presenters.push(PresenterComponent::new(name, class, kwargs));
            }
            Group::Views => {
                let class = class.view_class().ok_or_else(violation)?;
                self.views.push(ViewComponent::new(name, class, kwargs));
            }
        }
        debug!("Registered {} '{}'", group, name);
        Ok(())
    }

    fn names(&self, group: Group) -> Box<dyn Iterator<Item = &str> + '_> {
        match group {
            Group::Devices => Box::new(self.devices.iter().map(|c| c.name())),
            Group::Presenters => Box::new(self.presenters.iter().map(|c| c.name())),
            Group::Views => Box::new(self.views.iter().map(|c| c.name())),
        }
    }

    /// Configure storage. Only allowed before `build()`.
    pub fn set_storage(&mut self, storage: StorageConfig) -> AppResult<()> {
        if self.is_built {
            return Err(RedsunError::AlreadyBuilt);
        }
        storage.validate()?;
        self.config.storage = Some(storage);
        Ok(())
    }

    /// Writer factories used at build time, for registering extra backends.
    pub fn storage_registry_mut(&mut self) -> &mut StorageRegistry {
        &mut self.storage_registry
    }

    /// Build every registered component.
    ///
    /// Calling `build()` on a built container logs a warning and changes
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`RedsunError::ComponentBuild`] naming the first presenter or view that
    /// failed. The container stays unbuilt. Device failures are logged and
    /// never returned.
    pub fn build(&mut self) -> AppResult<&mut Self> {
        if self.is_built {
            warn!("Container already built, skipping rebuild");
            return Ok(self);
        }

        info!("Building container '{}'", self.config.session);

        let virtual_bus = Arc::new(VirtualBus::new());
        let di = Arc::new(DependencyContainer::new(self.config.to_kwargs()));
        self.virtual_bus = Some(virtual_bus.clone());
        self.di_container = Some(di.clone());
        self.storage_writer = None;
        self.reset_instances();

        // Devices: failures are isolated
        let mut storage = StorageInjector::new(
            self.config.storage.as_ref(),
            &self.config.session,
            &self.storage_registry,
        );
        let mut built_devices = DeviceMap::new();
        for component in &mut self.devices {
            let name = component.name().to_string();
            match component.build(&mut storage) {
                Ok(device) => {
                    debug!("Built device '{}'", name);
                    built_devices.insert(name, device.clone());
                }
                Err(e) => {
                    error!("Failed to build device '{}': {:#}", name, e);
                }
            }
        }
        self.storage_writer = storage.writer().cloned();

        // Presenters: first failure aborts
        for component in &mut self.presenters {
            let name = component.name().to_string();
            if let Err(source) = component.build(&built_devices, &virtual_bus, &di) {
                error!("Failed to build presenter '{}': {:#}", name, source);
                return Err(RedsunError::ComponentBuild {
                    group: Group::Presenters,
                    name,
                    source,
                });
            }
            debug!("Built presenter '{}'", name);
        }

        // Views: first failure aborts
        for component in &mut self.views {
            let name = component.name().to_string();
            if let Err(source) = component.build(&virtual_bus, &di) {
                error!("Failed to build view '{}': {:#}", name, source);
                return Err(RedsunError::ComponentBuild {
                    group: Group::Views,
                    name,
                    source,
                });
            }
            debug!("Built view '{}'", name);
        }

        self.is_built = true;
        info!(
            "Container built: {}/{} devices, {} presenters, {} views",
            built_devices.len(),
            self.devices.len(),
            self.presenters.len(),
            self.views.len()
        );
        Ok(self)
    }

    fn reset_instances(&mut self) {
        self.devices.iter_mut().for_each(DeviceComponent::reset);
        self.presenters.iter_mut().for_each(PresenterComponent::reset);
        self.views.iter_mut().for_each(ViewComponent::reset);
    }

    /// Shut down every presenter that supports it and return to the unbuilt
    /// state. Individual shutdown failures are logged, not returned. Does
    /// nothing if the container is not built.
    pub fn shutdown(&mut self) {
        if !self.is_built {
            return;
        }

        for component in &self.presenters {
            let Ok(presenter) = component.instance() else {
                continue;
            };
            if let Some(handle) = presenter.as_shutdown() {
                if let Err(e) = handle.shutdown() {
                    error!("Error shutting down presenter '{}': {:#}", component.name(), e);
                }
            }
        }

        self.is_built = false;
        info!("Container '{}' shut down", self.config.session);
    }

    /// Build if needed, hand the container to `launcher`, then shut down.
    pub fn run(&mut self, launcher: &dyn Launcher) -> anyhow::Result<()> {
        self.build()?;
        info!("Launching {} frontend", self.frontend);
        let result = launcher.launch(self);
        self.shutdown();
        result
    }

    fn ensure_built(&self) -> AppResult<()> {
        if self.is_built {
            Ok(())
        } else {
            Err(RedsunError::NotBuilt)
        }
    }

    /// Built devices by name. Devices that failed to build are absent.
    pub fn devices(&self) -> AppResult<DeviceMap> {
        self.ensure_built()?;
        Ok(self
            .devices
            .iter()
            .filter_map(|c| c.instance().ok().map(|d| (c.name().to_string(), d.clone())))
            .collect())
    }

    /// Built presenters by name.
    pub fn presenters(&self) -> AppResult<BTreeMap<String, Arc<dyn Presenter>>> {
        self.ensure_built()?;
        Ok(self
            .presenters
            .iter()
            .filter_map(|c| c.instance().ok().map(|p| (c.name().to_string(), p.clone())))
            .collect())
    }

    /// Built views by name.
    pub fn views(&self) -> AppResult<BTreeMap<String, Arc<dyn View>>> {
        self.ensure_built()?;
        Ok(self
            .views
            .iter()
            .filter_map(|c| c.instance().ok().map(|v| (c.name().to_string(), v.clone())))
            .collect())
    }

    /// Signal bus of the current build.
    pub fn virtual_bus(&self) -> AppResult<&Arc<VirtualBus>> {
        self.ensure_built()?;
        self.virtual_bus.as_ref().ok_or(RedsunError::NotBuilt)
    }

    /// Injection surface of the current build.
    pub fn di_container(&self) -> AppResult<&Arc<DependencyContainer>> {
        self.ensure_built()?;
        self.di_container.as_ref().ok_or(RedsunError::NotBuilt)
    }

    /// Whether the container is built.
    pub fn is_built(&self) -> bool {
        self.is_built
    }

    /// Container configuration.
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Configuration file the container was declared from, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Session name.
    pub fn session(&self) -> &str {
        &self.config.session
    }

    /// Selected frontend.
    pub fn frontend(&self) -> Frontend {
        self.frontend
    }

    /// Writer created during the last build, if any device asked for one.
    pub fn storage_writer(&self) -> Option<&Arc<dyn Writer>> {
        self.storage_writer.as_ref()
    }

    /// Info objects of the components declared through `from_config`.
    pub fn plugin_info(&self, group: Group) -> Option<&BTreeMap<String, ComponentInfo>> {
        self.plugin_info.get(&group)
    }

    /// Every descriptor, devices first, then presenters, then views.
    pub fn components(&self) -> Vec<ComponentDescriptor<'_>> {
        self.devices
            .iter()
            .map(ComponentDescriptor::Device)
            .chain(self.presenters.iter().map(ComponentDescriptor::Presenter))
            .chain(self.views.iter().map(ComponentDescriptor::View))
            .collect()
    }

    /// Device descriptors in declaration order.
    pub fn device_components(&self) -> &[DeviceComponent] {
        &self.devices
    }

    /// Presenter descriptors in declaration order.
    pub fn presenter_components(&self) -> &[PresenterComponent] {
        &self.presenters
    }

    /// View descriptors in declaration order.
    pub fn view_components(&self) -> &[ViewComponent] {
        &self.views
    }
}
