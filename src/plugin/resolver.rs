//! Manifest resolver.
//!
//! Turns `(plugin_name, plugin_id, group)` into the implementation class and
//! info class the plugin declares for it. Every failure along the way is
//! soft: it is logged and the component is skipped, so one broken plugin
//! never prevents the rest of the application from loading.
//!
//! Manifests are read at most once per [`ResolutionPass`]; nothing is kept
//! between passes.

use super::info::{fallback_info, InfoClass};
use super::manifest::{InstalledPlugin, Manifest, SymbolRef};
use super::source::PluginSource;
use super::symbols::SymbolTable;
use crate::protocols::{satisfies, ClassRef, Group};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Result of a successful resolution.
#[derive(Clone)]
pub struct Resolved {
    /// Implementation class
    pub class: ClassRef,
    /// Info class (declared or the group default)
    pub info: Arc<dyn InfoClass>,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("class", &self.class)
            .field("info", &self.info.type_name())
            .finish()
    }
}

/// Resolves plugin components through a plugin source and a symbol table.
#[derive(Clone)]
pub struct ManifestResolver {
    source: Arc<dyn PluginSource>,
    symbols: Arc<SymbolTable>,
}

impl ManifestResolver {
    /// Create a resolver.
    pub fn new(source: Arc<dyn PluginSource>, symbols: Arc<SymbolTable>) -> Self {
        Self { source, symbols }
    }

    /// Symbol table backing this resolver.
    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// Installed plugins as reported by the source.
    pub fn installed(&self) -> Vec<InstalledPlugin> {
        self.source.list_plugins()
    }

    /// Start a resolution pass sharing one plugin listing and manifest cache.
    pub fn pass(&self) -> ResolutionPass<'_> {
        ResolutionPass {
            resolver: self,
            installed: None,
            manifests: BTreeMap::new(),
        }
    }

    /// Resolve a single component in its own pass.
    pub fn resolve(&self, plugin_name: &str, plugin_id: &str, group: Group) -> Option<Resolved> {
        self.pass().resolve(plugin_name, plugin_id, group)
    }
}

/// One load operation. Plugins are listed once and each manifest is parsed
/// at most once.
pub struct ResolutionPass<'a> {
    resolver: &'a ManifestResolver,
    installed: Option<BTreeMap<String, InstalledPlugin>>,
    // `None` records a manifest that failed to load
    manifests: BTreeMap<String, Option<Arc<Manifest>>>,
}

impl ResolutionPass<'_> {
    fn manifest(&mut self, plugin_name: &str) -> Option<Arc<Manifest>> {
        if let Some(cached) = self.manifests.get(plugin_name) {
            return cached.clone();
        }

        let resolver = self.resolver;
        let installed = self.installed.get_or_insert_with(|| {
            resolver
                .source
                .list_plugins()
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect()
        });

        let Some(plugin) = installed.get(plugin_name) else {
            error!("Plugin \"{}\" not found in the installed plugins.", plugin_name);
            return None;
        };

        let manifest = match Manifest::load(&plugin.manifest_path) {
            Ok(manifest) => Some(Arc::new(manifest)),
            Err(e) => {
                error!("Failed to load manifest of plugin \"{}\": {:#}", plugin_name, e);
                None
            }
        };
        self.manifests.insert(plugin_name.to_string(), manifest.clone());
        manifest
    }

    /// Resolve `(plugin_name, plugin_id)` in `group`.
    ///
    /// Returns `None`, after logging the reason, when the plugin is not
    /// installed, its manifest lacks the group or id, the entry has no
    /// `class`, the symbol is unknown or the class does not qualify for the
    /// group.
    pub fn resolve(&mut self, plugin_name: &str, plugin_id: &str, group: Group) -> Option<Resolved> {
        let manifest = self.manifest(plugin_name)?;

        let Some(entries) = manifest.group(group) else {
            error!(
                "Plugin \"{}\" does not provide any {}.",
                plugin_name,
                group.as_str()
            );
            return None;
        };

        let Some(entry) = entries.get(plugin_id) else {
            error!(
                "Plugin \"{}\" does not contain the id \"{}\".",
                plugin_name, plugin_id
            );
            return None;
        };

        let Some(class_ref) = entry.class.as_deref() else {
            error!(
                "Plugin id \"{}\" of \"{}\" does not contain the class key. Skipping.",
                plugin_id, plugin_name
            );
            return None;
        };

        let class = match SymbolRef::parse(class_ref) {
            Ok(symbol) => match self.resolver.symbols.class(&symbol) {
                Some(class) => class,
                None => {
                    error!(
                        "Plugin \"{}\" refers to unknown class \"{}\".",
                        plugin_name, symbol
                    );
                    return None;
                }
            },
            Err(e) => {
                error!("Plugin \"{}\": {}", plugin_name, e);
                return None;
            }
        };

        if !satisfies(&class, group) {
            error!(
                "{} exists, but does not implement any known protocol.",
                class.type_name()
            );
            return None;
        }

        let info = match entry.info.as_deref() {
            Some(info_ref) => self.resolve_info(plugin_name, info_ref)?,
            None => {
                debug!(
                    "Plugin \"{}\" does not contain the info key. Falling back to default info class.",
                    plugin_name
                );
                fallback_info(group)
            }
        };

        debug!(
            "Resolved {}/{} as {} ({})",
            plugin_name,
            plugin_id,
            class.type_name(),
            group
        );
        Some(Resolved { class, info })
    }

    fn resolve_info(&self, plugin_name: &str, info_ref: &str) -> Option<Arc<dyn InfoClass>> {
        let symbol = match SymbolRef::parse(info_ref) {
            Ok(symbol) => symbol,
            Err(e) => {
                error!("Plugin \"{}\": {}", plugin_name, e);
                return None;
            }
        };
        let info = self.resolver.symbols.info(&symbol);
        if info.is_none() {
            error!(
                "Plugin \"{}\" refers to unknown info class \"{}\".",
                plugin_name, symbol
            );
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::info::FieldsInfo;
    use crate::plugin::source::StaticPluginSource;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    const MANIFEST: &str = r#"
devices:
  motor:
    class: mock.motor:Motor
    info: mock.motor:MotorInfo
  plain:
    class: mock.motor:Motor
  classless:
    info: mock.motor:MotorInfo
  ghost:
    class: mock.motor:Ghost
  misplaced:
    class: mock.view:Panel
"#;

    fn symbols() -> Arc<SymbolTable> {
        let table = SymbolTable::new();
        table.register_class("mock.motor", "Motor", ClassRef::device("Motor", |_, _| anyhow::bail!("unused")));
        table.register_class("mock.view", "Panel", ClassRef::view("Panel", |_, _, _| anyhow::bail!("unused")));
        table.register_info("mock.motor", "MotorInfo", Arc::new(FieldsInfo::new("MotorInfo")));
        Arc::new(table)
    }

    fn resolver(dir: &Path) -> ManifestResolver {
        let manifest = dir.join("redsun.yaml");
        std::fs::write(&manifest, MANIFEST).unwrap();
        let source = StaticPluginSource::new().with_plugin("mock", manifest);
        ManifestResolver::new(Arc::new(source), symbols())
    }

    #[test]
    fn resolves_class_and_declared_info() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolver(dir.path()).resolve("mock", "motor", Group::Devices).unwrap();

        assert_eq!(resolved.class.type_name(), "Motor");
        assert_eq!(resolved.info.type_name(), "MotorInfo");
    }

    #[test]
    fn missing_info_falls_back_to_group_default() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolver(dir.path()).resolve("mock", "plain", Group::Devices).unwrap();
        assert_eq!(resolved.info.type_name(), "DeviceInfo");
    }

    #[test]
    #[traced_test]
    fn soft_failures_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());
        let mut pass = resolver.pass();

        assert!(pass.resolve("absent", "motor", Group::Devices).is_none());
        assert!(logs_contain("Plugin \"absent\" not found in the installed plugins."));

        assert!(pass.resolve("mock", "nope", Group::Devices).is_none());
        assert!(logs_contain("does not contain the id \"nope\""));

        assert!(pass.resolve("mock", "motor", Group::Views).is_none());
        assert!(logs_contain("does not provide any views"));

        assert!(pass.resolve("mock", "classless", Group::Devices).is_none());
        assert!(logs_contain("does not contain the class key"));

        assert!(pass.resolve("mock", "ghost", Group::Devices).is_none());
        assert!(logs_contain("unknown class \"mock.motor:Ghost\""));

        assert!(pass.resolve("mock", "misplaced", Group::Devices).is_none());
        assert!(logs_contain("Panel exists, but does not implement any known protocol."));
    }

    struct CountingSource {
        inner: StaticPluginSource,
        calls: AtomicUsize,
    }

    impl PluginSource for CountingSource {
        fn list_plugins(&self) -> Vec<InstalledPlugin> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_plugins()
        }
    }

    #[test]
    fn pass_lists_plugins_once() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("redsun.yaml");
        std::fs::write(&manifest, MANIFEST).unwrap();
        let source = Arc::new(CountingSource {
            inner: StaticPluginSource::new().with_plugin("mock", &manifest),
            calls: AtomicUsize::new(0),
        });
        let resolver = ManifestResolver::new(source.clone(), symbols());

        let mut pass = resolver.pass();
        assert!(pass.resolve("mock", "motor", Group::Devices).is_some());
        // the manifest is cached for the rest of the pass
        std::fs::remove_file(&manifest).unwrap();
        assert!(pass.resolve("mock", "plain", Group::Devices).is_some());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // a new pass reads again
        assert!(resolver.resolve("mock", "plain", Group::Devices).is_none());
    }
}
