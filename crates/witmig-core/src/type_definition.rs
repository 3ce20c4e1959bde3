//! # Type Definitions
//!
//! Registry of work item types that should be materialized in the target
//! store, each with an optional mapper.
//!
//! Registration is insert-if-absent: the first registration for a type name
//! wins and later ones are ignored without error.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Describes how a source work item type is materialized in the target.
///
/// The engine never interprets a mapper. Stage logic consults it.
pub trait TypeDefinitionMapper: Send + Sync + Debug {
    /// Name of the target type for items of `source_type`.
    fn target_type_name(&self, source_type: &str) -> String;
}

/// Type name to optional mapper. `None` means "use the default".
#[derive(Debug, Default, Clone)]
pub struct TypeDefinitionRegistry {
    definitions: BTreeMap<String, Option<Arc<dyn TypeDefinitionMapper>>>,
}

impl TypeDefinitionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mapper` under `type_name` unless the name is already present.
    ///
    /// Returns `true` if the entry was inserted.
    pub fn insert_if_absent(
        &mut self,
        type_name: impl Into<String>,
        mapper: Option<Arc<dyn TypeDefinitionMapper>>,
    ) -> bool {
        match self.definitions.entry(type_name.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(mapper);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Look up a type.
    ///
    /// `None` if the type is not registered, `Some(None)` if it is registered
    /// with the default mapping.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<Option<&Arc<dyn TypeDefinitionMapper>>> {
        self.definitions.get(type_name).map(Option::as_ref)
    }

    /// Check if a type is registered.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.definitions.contains_key(type_name)
    }

    /// Resolve the target type name for `source_type`.
    ///
    /// Registered types without a mapper keep their name. Unregistered
    /// types yield `None`.
    #[must_use]
    pub fn target_type_name(&self, source_type: &str) -> Option<String> {
        self.get(source_type).map(|mapper| match mapper {
            Some(m) => m.target_type_name(source_type),
            None => source_type.to_string(),
        })
    }

    /// Registered type names in sorted order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
