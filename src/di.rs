//! Dependency injection surface.
//!
//! Presenters that implement `IsProvider` publish named providers here during
//! build; views that implement `IsInjectable` pull them out afterwards.
//! Providers are either shared objects or factories producing a fresh value
//! on every resolve. Registration is append-only.
//!
//! Every container also exposes its own configuration through
//! [`DependencyContainer::config`].

use crate::error::{AppResult, RedsunError};
use crate::kwargs::Kwargs;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type SharedAny = Arc<dyn Any + Send + Sync>;
type FactoryFn = dyn Fn() -> SharedAny + Send + Sync;

enum Provider {
    Object(SharedAny),
    Factory(Box<FactoryFn>),
}

impl Provider {
    fn get(&self) -> SharedAny {
        match self {
            Provider::Object(obj) => obj.clone(),
            Provider::Factory(factory) => factory(),
        }
    }
}

/// Container-wide registry of named providers.
pub struct DependencyContainer {
    providers: RwLock<BTreeMap<String, Provider>>,
    config: Kwargs,
}

impl fmt::Debug for DependencyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyContainer")
            .field("providers", &self.names())
            .field("config", &self.config)
            .finish()
    }
}

impl DependencyContainer {
    /// Create an injection surface exposing `config` as the container configuration.
    pub fn new(config: Kwargs) -> Self {
        Self {
            providers: RwLock::new(BTreeMap::new()),
            config,
        }
    }

    /// Container configuration as a mapping.
    pub fn config(&self) -> &Kwargs {
        &self.config
    }

    /// Register a shared object under `name`.
    pub fn register_object<T>(&self, name: impl Into<String>, object: Arc<T>) -> AppResult<()>
    where
        T: Send + Sync + 'static,
    {
        self.insert(name.into(), Provider::Object(object))
    }

    /// Register a factory under `name`; every resolve calls it again.
    pub fn register_factory<T, F>(&self, name: impl Into<String>, factory: F) -> AppResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let erased = move || -> SharedAny { Arc::new(factory()) };
        self.insert(name.into(), Provider::Factory(Box::new(erased)))
    }

    fn insert(&self, name: String, provider: Provider) -> AppResult<()> {
        let mut providers = self.providers.write();
        if providers.contains_key(&name) {
            return Err(RedsunError::DuplicateProvider(name));
        }
        tracing::debug!(provider = %name, "Registered provider");
        providers.insert(name, provider);
        Ok(())
    }

    /// Resolve a provider as `T`.
    ///
    /// Returns `None` if nothing is registered under `name` or the provider
    /// holds a different type.
    pub fn resolve<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let value = self.providers.read().get(name)?.get();
        value.downcast::<T>().ok()
    }

    /// Whether a provider is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn object_providers_are_shared() {
        let di = DependencyContainer::new(Kwargs::new());
        di.register_object("layout", Arc::new(String::from("grid"))).unwrap();

        let a = di.resolve::<String>("layout").unwrap();
        let b = di.resolve::<String>("layout").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.as_str(), "grid");
    }

    #[test]
    fn factory_runs_on_every_resolve() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let di = DependencyContainer::new(Kwargs::new());
        di.register_factory("ticket", move || counter.fetch_add(1, Ordering::SeqCst))
            .unwrap();

        assert_eq!(*di.resolve::<usize>("ticket").unwrap(), 0);
        assert_eq!(*di.resolve::<usize>("ticket").unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let di = DependencyContainer::new(Kwargs::new());
        di.register_object("x", Arc::new(1u8)).unwrap();
        let err = di.register_object("x", Arc::new(2u8)).unwrap_err();

        assert!(matches!(err, RedsunError::DuplicateProvider(name) if name == "x"));
        assert_eq!(*di.resolve::<u8>("x").unwrap(), 1);
    }

    #[test]
    fn wrong_type_or_missing_name_resolves_to_none() {
        let di = DependencyContainer::new(Kwargs::new().with("session", "Redsun"));
        di.register_object("x", Arc::new(1u8)).unwrap();

        assert!(di.resolve::<String>("x").is_none());
        assert!(di.resolve::<u8>("y").is_none());
        assert_eq!(di.config().get_str("session"), Some("Redsun"));
    }
}
