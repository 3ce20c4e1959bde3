//! # witmig-core
//!
//! The work item migration engine - THE LOGIC.
//!
//! A [`MigrationEngine`] runs an ordered list of processing stages that move
//! work items from a source store to a target store. While they process
//! items, stages call back into the engine to apply field-mapping rules
//! (dispatched by work item type) and to consult the registered type
//! definitions.
//!
//! ## Architectural Constraints
//!
//! - Synchronous: one stage at a time, on the caller's thread
//! - Fail fast: the first stage reporting `Failed` ends the run
//! - Opaque collaborators: stores ([`ProjectContext`]), rules ([`FieldMap`]),
//!   type mappers ([`TypeDefinitionMapper`]) and telemetry
//!   ([`TelemetrySink`]) are traits; this crate implements none of the
//!   store or rule semantics
//! - No async, no network dependencies

// =============================================================================
// MODULES
// =============================================================================

pub mod context;
pub mod engine;
pub mod field_map;
pub mod pipeline;
pub mod telemetry;
pub mod type_definition;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    DEFAULT_REFLECTED_WORK_ITEM_ID_FIELD, FieldMapError, FieldValue, MigrationError,
    ProcessingStatus, RunResult, StageError, TelemetryError, WILDCARD_TYPE, WorkItem, WorkItemId,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use context::ProjectContext;
pub use engine::{MigrationContext, MigrationEngine, ProcessorAction};
pub use field_map::{FieldMap, FieldMapRegistry};
pub use pipeline::{ProcessingStage, StageFactory, StageRegistry, run_guarded};
pub use type_definition::{TypeDefinitionMapper, TypeDefinitionRegistry};

// =============================================================================
// RE-EXPORTS: Telemetry
// =============================================================================

pub use telemetry::{
    NullTelemetry, RUN_EVENT, RUN_TIME_METRIC, RecordingTelemetry, RunIdentity, RunMeasurements,
    TelemetryRecord, TelemetrySink, TracingTelemetry,
};
