//! # Project Context
//!
//! Capability interface for a connection to a work item store.
//!
//! The engine stores a shared reference to a source and a target context but
//! invokes nothing on them; stages do. How items are fetched, serialized and
//! persisted is entirely up to the implementation.

use crate::{StageError, WorkItem, WorkItemId};
use std::fmt::Debug;

/// An authenticated connection to a work item store.
///
/// Implementations must be `Send + Sync` so one context can be shared between
/// the engine and the stages it drives. Writes go through `&self`; stores
/// that buffer state need their own interior mutability.
pub trait ProjectContext: Send + Sync + Debug {
    /// Diagnostic name of the project or collection.
    fn name(&self) -> &str;

    /// Snapshot of every work item in the store, ordered by id.
    fn work_items(&self) -> Result<Vec<WorkItem>, StageError>;

    /// Persist an item.
    ///
    /// Items whose id is unknown to the store are created with a fresh id;
    /// the id actually stored is returned.
    fn save(&self, item: WorkItem) -> Result<WorkItemId, StageError>;

    /// Find the first item whose `field` equals `value`.
    fn find_by_field(&self, field: &str, value: &str) -> Result<Option<WorkItem>, StageError> {
        Ok(self
            .work_items()?
            .into_iter()
            .find(|item| item.field(field).is_some_and(|v| v.as_str() == value)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
