//! Registry: maps stable node type names to factory prototypes.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::{chain::ChainError, node::Node};

/// A thread-safe map from node type name to a factory prototype. Looking a
/// type up produces a fresh instance from the prototype; registry entries
/// never hold per-message state.
#[derive(Default)]
pub struct Registry {
    prototypes: DashMap<String, Box<dyn Node>>,
}

impl Registry {
    /// An empty registry, without the built-in components.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in components.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for proto in crate::components::builtin_prototypes() {
            // built-in names are unique, this cannot fail
            let _ = registry.register(proto);
        }
        registry
    }

    /// Registers a prototype under its `type_name()`. Registering a duplicate
    /// type name is an error.
    pub fn register(&self, prototype: Box<dyn Node>) -> Result<(), ChainError> {
        let name = prototype.type_name().to_string();
        use dashmap::mapref::entry::Entry;
        match self.prototypes.entry(name.clone()) {
            Entry::Occupied(_) => Err(ChainError::DuplicateType(name)),
            Entry::Vacant(slot) => {
                slot.insert(prototype);
                Ok(())
            }
        }
    }

    /// Unregisters a type. Returns whether it was present.
    pub fn unregister(&self, type_name: &str) -> bool {
        self.prototypes.remove(type_name).is_some()
    }

    /// Produce a fresh, uninitialized instance of the given type.
    pub fn create(&self, type_name: &str) -> Option<Box<dyn Node>> {
        self.prototypes.get(type_name).map(|entry| entry.create())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.prototypes.contains_key(type_name)
    }

    /// All registered type names.
    pub fn types(&self) -> Vec<String> {
        self.prototypes.iter().map(|e| e.key().clone()).collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types())
            .finish()
    }
}

// Process-wide registry with the built-ins, used when the engine config does
// not supply its own.
static DEFAULT_REGISTRY: Lazy<Arc<Registry>> = Lazy::new(|| Arc::new(Registry::with_builtins()));

pub fn default_registry() -> Arc<Registry> {
    DEFAULT_REGISTRY.clone()
}
