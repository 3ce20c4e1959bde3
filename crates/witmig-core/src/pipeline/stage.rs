//! # Processing Stages
//!
//! A stage is one unit of pipeline work. The engine runs stages strictly in
//! registration order and consults each stage's status after it returns.
//!
//! ## Failure Channels
//!
//! | Stage behavior | Engine reaction |
//! |----------------|-----------------|
//! | `Ok(())`, status `Complete` | continue with the next stage |
//! | `Ok(())`, status `Failed` | stop, run result `Failed` |
//! | `Err(_)` | stop, error propagated out of `run` |
//!
//! Stages are expected to use the second channel. [`run_guarded`] converts a
//! fallible stage body into a status.

use crate::engine::MigrationContext;
use crate::{MigrationError, ProcessingStatus, StageError};
use std::collections::BTreeMap;

/// One unit of pipeline work.
pub trait ProcessingStage {
    /// Diagnostic name.
    fn name(&self) -> &str;

    /// Status after the last `execute`, `NotRun` before.
    fn status(&self) -> ProcessingStatus;

    /// Run the stage.
    ///
    /// `ctx` gives access to the source and target contexts, the registries
    /// and the field-mapping entry points.
    fn execute(&mut self, ctx: &MigrationContext) -> Result<(), StageError>;
}

/// Builds a stage from the engine context it will be appended to.
pub type StageFactory = fn(&MigrationContext) -> Result<Box<dyn ProcessingStage>, StageError>;

/// Stage factories keyed by stage name.
#[derive(Debug, Default, Clone)]
pub struct StageRegistry {
    factories: BTreeMap<String, StageFactory>,
}

impl StageRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, name: impl Into<String>, factory: StageFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, factory: StageFactory) -> Self {
        self.register(name, factory);
        self
    }

    /// Check if a factory is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered stage names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct the stage registered under `name`.
    pub fn build(
        &self,
        name: &str,
        ctx: &MigrationContext,
    ) -> Result<Box<dyn ProcessingStage>, MigrationError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| MigrationError::UnknownStage(name.to_string()))?;

        factory(ctx).map_err(|e| MigrationError::StageConstruction {
            stage: name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Run a stage body and translate its outcome into a terminal status.
///
/// An `Err` from `body` is logged with the stage name and becomes
/// `ProcessingStatus::Failed`; it never escapes.
pub fn run_guarded<F>(stage: &str, body: F) -> ProcessingStatus
where
    F: FnOnce() -> Result<(), StageError>,
{
    match body() {
        Ok(()) => ProcessingStatus::Complete,
        Err(e) => {
            tracing::error!(stage, error = %e, "stage failed");
            ProcessingStatus::Failed
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
