//! Fixture type registry
//!
//! Maps type names to factories. A registry is assembled once at startup,
//! then shared read-only (behind an `Arc`) by every session; each session
//! constructs its own instances from it.

use std::collections::HashMap;
use std::sync::Arc;

use super::fixture::{FixtureClass, FixtureFactory};

/// Catalog of constructible fixture types.
#[derive(Clone, Default)]
pub struct FixtureRegistry {
    types: HashMap<String, Arc<dyn FixtureFactory>>,
}

impl FixtureRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its own class name.
    pub fn register<F>(&mut self, factory: F) -> &mut Self
    where
        F: FixtureFactory + 'static,
    {
        let name = factory.class_name().to_owned();
        self.types.insert(name, Arc::new(factory));
        self
    }

    /// Register a [`FixtureClass`].
    pub fn register_class<T: Send + 'static>(&mut self, class: FixtureClass<T>) -> &mut Self {
        self.register(class)
    }

    /// Look up a type by its exact registered name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn FixtureFactory>> {
        self.types.get(name).cloned()
    }

    /// Resolve a type name as written in a `make` statement.
    ///
    /// The name is tried verbatim first, then qualified by each imported
    /// namespace in import order (`<namespace>.<name>`).
    pub fn resolve(&self, name: &str, imports: &[String]) -> Option<Arc<dyn FixtureFactory>> {
        self.get(name).or_else(|| {
            imports.iter().find_map(|namespace| {
                let namespace = namespace.trim_end_matches('.');
                self.get(&format!("{namespace}.{name}"))
            })
        })
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl std::fmt::Debug for FixtureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
