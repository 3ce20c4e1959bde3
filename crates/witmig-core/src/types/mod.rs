//! # Core Type Definitions
//!
//! This module contains the core types shared by every part of the engine:
//! - Work item representation (`WorkItemId`, `WorkItem`, `FieldValue`)
//! - Status reporting (`ProcessingStatus`, `RunResult`)
//! - Error types, one per boundary (`FieldMapError`, `StageError`,
//!   `TelemetryError`, `MigrationError`)
//!
//! ## Determinism Guarantees
//!
//! Fields are stored in a `BTreeMap` so iteration (and therefore anything a
//! rule or store derives from it) is ordered by field name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// WELL-KNOWN NAMES
// =============================================================================

/// Registry key whose rules apply to every work item type.
pub const WILDCARD_TYPE: &str = "*";

/// Default name of the field that tags a migrated item with its origin id.
pub const DEFAULT_REFLECTED_WORK_ITEM_ID_FIELD: &str = "TfsMigrationTool.ReflectedWorkItemId";

// =============================================================================
// WORK ITEM
// =============================================================================

/// Identifier of a work item inside one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkItemId(pub u64);

impl std::fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value of a single work item field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldValue(pub String);

impl FieldValue {
    /// Create a new field value from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A structured record being migrated.
///
/// A work item carries a type name (e.g. `"Bug"`) and a set of named fields.
/// The engine dispatches field-mapping rules on the type name; it never looks
/// at the fields itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Identifier within the owning store.
    pub id: WorkItemId,
    /// Name of the work item type.
    pub work_item_type: String,
    /// Named field values.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl WorkItem {
    /// Create an item with no fields.
    #[must_use]
    pub fn new(id: WorkItemId, work_item_type: impl Into<String>) -> Self {
        Self {
            id,
            work_item_type: work_item_type.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(name, value);
        self
    }

    /// The type name used for rule dispatch.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.work_item_type
    }

    /// Look up a field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Set a field, replacing any previous value.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), FieldValue::new(value));
    }

    /// Remove a field, returning its previous value.
    pub fn remove_field(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Terminal (or in-flight) status of a processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProcessingStatus {
    /// The stage has not been executed.
    #[default]
    NotRun,
    /// The stage is executing.
    Running,
    /// The stage finished successfully.
    Complete,
    /// The stage handled an internal error and gave up.
    Failed,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessingStatus::NotRun => "not-run",
            ProcessingStatus::Running => "running",
            ProcessingStatus::Complete => "complete",
            ProcessingStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Aggregate outcome of a whole pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunResult {
    /// No stage reported `Failed`.
    Complete,
    /// A stage reported `Failed`; later stages were not executed.
    Failed,
}

impl RunResult {
    /// Check if the run completed.
    #[must_use]
    pub fn is_complete(self) -> bool {
        matches!(self, RunResult::Complete)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Error raised by a field-mapping rule.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldMapError {
    /// The rule could not apply its transformation.
    #[error("Field map '{rule}' failed: {message}")]
    Rule { rule: String, message: String },

    /// The rule needed a field the source item does not carry.
    #[error("Field map '{rule}' requires missing field '{field}'")]
    MissingField { rule: String, field: String },
}

/// Error returned by a stage's `execute`.
///
/// A stage that returns `Err` aborts the whole run. Stages that want the
/// pipeline to stop cleanly should set `ProcessingStatus::Failed` instead
/// (see [`crate::pipeline::run_guarded`]).
#[derive(Debug, Error)]
pub enum StageError {
    /// A field-mapping rule failed while the stage was mapping an item.
    #[error(transparent)]
    FieldMap(#[from] FieldMapError),

    /// The source or target context refused an operation.
    #[error("Context error: {0}")]
    Context(String),

    /// Any other stage-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Error returned by a telemetry sink. Never affects a run.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Telemetry error: {0}")]
pub struct TelemetryError(pub String);

/// Errors surfaced by the migration engine.
///
/// - Setup-time errors (`UnknownStage`, `StageConstruction`,
///   `ContextAlreadySet`) are returned immediately to the assembler
/// - `StageAborted` is the abnormal run channel: a stage returned an error
///   instead of reporting `Failed`
#[derive(Debug, Error)]
pub enum MigrationError {
    /// No factory is registered under this stage name.
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// A stage factory failed to build its stage.
    #[error("Failed to construct stage '{stage}': {reason}")]
    StageConstruction { stage: String, reason: String },

    /// The source or target context was already set.
    #[error("{0} context is already set")]
    ContextAlreadySet(&'static str),

    /// A stage returned an error from `execute`.
    #[error("Stage '{stage}' aborted: {source}")]
    StageAborted {
        stage: String,
        #[source]
        source: StageError,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

// =============================================================================
// TESTS
// =============================================================================
