//! # JSON File Store
//!
//! A [`ProjectContext`] backed by a JSON array of work items.
//!
//! The file is read once on open. Saves are kept in memory and written back
//! by [`JsonFileStore::persist`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use witmig_core::{MigrationError, ProjectContext, StageError, WorkItem, WorkItemId};

/// Maximum store file size (500 MB).
const MAX_STORE_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Work items of one project, loaded from and saved to a JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    name: String,
    path: PathBuf,
    items: Mutex<BTreeMap<WorkItemId, WorkItem>>,
}

impl JsonFileStore {
    /// Open a store. A missing file is an empty store.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, MigrationError> {
        let path = path.into();
        let items = if path.exists() {
            read_items(&path)?
        } else {
            tracing::debug!("Store file {:?} does not exist, starting empty", path);
            Vec::new()
        };

        Ok(Self {
            name: name.into(),
            path,
            items: Mutex::new(items.into_iter().map(|item| (item.id, item)).collect()),
        })
    }

    /// File the store persists to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of items currently held.
    pub fn len(&self) -> Result<usize, MigrationError> {
        self.items
            .lock()
            .map(|items| items.len())
            .map_err(|e| MigrationError::Io(format!("store '{}' is poisoned: {}", self.name, e)))
    }

    /// Check if the store holds no items.
    pub fn is_empty(&self) -> Result<bool, MigrationError> {
        self.len().map(|n| n == 0)
    }

    /// Write every item back to the file as pretty-printed JSON.
    pub fn persist(&self) -> Result<(), MigrationError> {
        let items: Vec<WorkItem> = self
            .items
            .lock()
            .map(|items| items.values().cloned().collect())
            .map_err(|e| MigrationError::Io(format!("store '{}' is poisoned: {}", self.name, e)))?;

        let json = serde_json::to_string_pretty(&items).map_err(|e| {
            MigrationError::Io(format!("Cannot encode store '{}': {}", self.name, e))
        })?;
        std::fs::write(&self.path, json).map_err(|e| {
            MigrationError::Io(format!("Cannot write '{}': {}", self.path.display(), e))
        })?;

        tracing::info!("Persisted {} work items to {:?}", items.len(), self.path);
        Ok(())
    }
}

fn read_items(path: &Path) -> Result<Vec<WorkItem>, MigrationError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| MigrationError::Io(format!("Cannot read '{}': {}", path.display(), e)))?;
    if metadata.len() > MAX_STORE_FILE_SIZE {
        return Err(MigrationError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_STORE_FILE_SIZE
        )));
    }

    let text = std::fs::read_to_string(path)
        .map_err(|e| MigrationError::Io(format!("Cannot read '{}': {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| MigrationError::Config(format!("Invalid store '{}': {}", path.display(), e)))
}

impl ProjectContext for JsonFileStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn work_items(&self) -> Result<Vec<WorkItem>, StageError> {
        self.items
            .lock()
            .map(|items| items.values().cloned().collect())
            .map_err(|e| StageError::Context(format!("store '{}' is poisoned: {}", self.name, e)))
    }

    /// Scans under the lock; only the match is cloned.
    fn find_by_field(&self, field: &str, value: &str) -> Result<Option<WorkItem>, StageError> {
        let items = self
            .items
            .lock()
            .map_err(|e| StageError::Context(format!("store '{}' is poisoned: {}", self.name, e)))?;
        Ok(items
            .values()
            .find(|item| item.field(field).is_some_and(|v| v.as_str() == value))
            .cloned())
    }

    /// Existing ids are updated in place. Unknown ids, and id 0, get the
    /// next free id.
    fn save(&self, mut item: WorkItem) -> Result<WorkItemId, StageError> {
        let mut items = self
            .items
            .lock()
            .map_err(|e| StageError::Context(format!("store '{}' is poisoned: {}", self.name, e)))?;

        if item.id.0 == 0 || !items.contains_key(&item.id) {
            let next = items.keys().next_back().map_or(0, |id| id.0).saturating_add(1);
            item.id = WorkItemId(next);
        }

        let id = item.id;
        items.insert(id, item);
        Ok(id)
    }
}

// =============================================================================
// TESTS
// =============================================================================
