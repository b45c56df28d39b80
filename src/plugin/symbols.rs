//! Symbol table for manifest references.
//!
//! Manifests refer to classes as `"<module>:<symbol>"`. Plugins register the
//! classes they ship under those references when the application starts; the
//! resolver then looks them up by name.

use super::info::InfoClass;
use super::manifest::SymbolRef;
use crate::protocols::ClassRef;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of implementation and info classes, keyed by symbol reference.
#[derive(Default)]
pub struct SymbolTable {
    classes: RwLock<BTreeMap<SymbolRef, ClassRef>>,
    infos: RwLock<BTreeMap<SymbolRef, Arc<dyn InfoClass>>>,
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("classes", &self.classes.read().keys().collect::<Vec<_>>())
            .field("infos", &self.infos.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation class. Re-registering a reference replaces it.
    pub fn register_class(&self, module: &str, symbol: &str, class: ClassRef) {
        let key = SymbolRef::new(module, symbol);
        tracing::debug!("Registered class {} ({})", key, class.type_name());
        self.classes.write().insert(key, class);
    }

    /// Register an info class.
    pub fn register_info(&self, module: &str, symbol: &str, info: Arc<dyn InfoClass>) {
        self.infos.write().insert(SymbolRef::new(module, symbol), info);
    }

    /// Look up an implementation class.
    pub fn class(&self, symbol: &SymbolRef) -> Option<ClassRef> {
        self.classes.read().get(symbol).cloned()
    }

    /// Look up an info class.
    pub fn info(&self, symbol: &SymbolRef) -> Option<Arc<dyn InfoClass>> {
        self.infos.read().get(symbol).cloned()
    }

    /// Number of registered implementation classes.
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// Whether no implementation class is registered.
    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}
