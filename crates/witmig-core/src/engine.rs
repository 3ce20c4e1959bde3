//! # Migration Engine
//!
//! Owns the ordered stage list and everything stages call back into.
//!
//! ## Lifecycle
//!
//! 1. Setup: set source and target, register field maps, type definitions,
//!    processor actions, then append stages in execution order.
//! 2. `run`: stages execute one at a time on the caller's thread. The first
//!    stage that reports `Failed` ends the run.
//!
//! `run` takes `&mut self`, so setup methods cannot be called while a run is
//! in flight and two runs can never overlap on one engine. There is no
//! cancellation or timeout: a stage that never returns blocks the run.
//!
//! Whether target writes made before a failing stage should be rolled back
//! is left to the target store; the engine does not track them.

use crate::context::ProjectContext;
use crate::field_map::{FieldMap, FieldMapRegistry};
use crate::pipeline::{ProcessingStage, StageRegistry};
use crate::telemetry::{
    RUN_EVENT, RUN_TIME_METRIC, RunIdentity, RunMeasurements, TelemetrySink, TracingTelemetry,
};
use crate::type_definition::{TypeDefinitionMapper, TypeDefinitionRegistry};
use crate::{
    DEFAULT_REFLECTED_WORK_ITEM_ID_FIELD, FieldMapError, MigrationError, ProcessingStatus,
    RunResult, StageError, WorkItem,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

/// Callback applied to a (source, target) pair after field mapping.
pub type ProcessorAction = Arc<dyn Fn(&WorkItem, &mut WorkItem) + Send + Sync>;

// =============================================================================
// MIGRATION CONTEXT
// =============================================================================

/// State shared with every stage: contexts, registries and configuration.
///
/// Stages receive `&MigrationContext` at construction and on every
/// `execute`, so all of it is read-only while a run is in progress.
pub struct MigrationContext {
    source: Option<Arc<dyn ProjectContext>>,
    target: Option<Arc<dyn ProjectContext>>,
    field_maps: FieldMapRegistry,
    type_definitions: TypeDefinitionRegistry,
    processor_actions: Vec<ProcessorAction>,
    reflected_work_item_id_field: String,
}

impl Default for MigrationContext {
    fn default() -> Self {
        Self {
            source: None,
            target: None,
            field_maps: FieldMapRegistry::new(),
            type_definitions: TypeDefinitionRegistry::new(),
            processor_actions: Vec::new(),
            reflected_work_item_id_field: DEFAULT_REFLECTED_WORK_ITEM_ID_FIELD.to_string(),
        }
    }
}

impl std::fmt::Debug for MigrationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationContext")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("field_maps", &self.field_maps)
            .field("type_definitions", &self.type_definitions)
            .field("processor_actions", &self.processor_actions.len())
            .field(
                "reflected_work_item_id_field",
                &self.reflected_work_item_id_field,
            )
            .finish()
    }
}

impl MigrationContext {
    /// The source context, if set.
    #[must_use]
    pub fn source(&self) -> Option<&Arc<dyn ProjectContext>> {
        self.source.as_ref()
    }

    /// The target context, if set.
    #[must_use]
    pub fn target(&self) -> Option<&Arc<dyn ProjectContext>> {
        self.target.as_ref()
    }

    /// The source context, or a stage error if it was never set.
    pub fn require_source(&self) -> Result<&Arc<dyn ProjectContext>, StageError> {
        self.source
            .as_ref()
            .ok_or_else(|| StageError::Context("source context is not set".to_string()))
    }

    /// The target context, or a stage error if it was never set.
    pub fn require_target(&self) -> Result<&Arc<dyn ProjectContext>, StageError> {
        self.target
            .as_ref()
            .ok_or_else(|| StageError::Context("target context is not set".to_string()))
    }

    /// Registered field maps.
    #[must_use]
    pub fn field_maps(&self) -> &FieldMapRegistry {
        &self.field_maps
    }

    /// Registered type definitions.
    #[must_use]
    pub fn type_definitions(&self) -> &TypeDefinitionRegistry {
        &self.type_definitions
    }

    /// Name of the field that tags a target item with its source id.
    #[must_use]
    pub fn reflected_work_item_id_field_name(&self) -> &str {
        &self.reflected_work_item_id_field
    }

    /// Number of registered processor actions.
    #[must_use]
    pub fn processor_action_count(&self) -> usize {
        self.processor_actions.len()
    }

    /// Apply wildcard then source-type rules from `source` onto `target`.
    pub fn apply_field_mappings(
        &self,
        source: &WorkItem,
        target: &mut WorkItem,
    ) -> Result<(), FieldMapError> {
        self.field_maps.apply(source, target)
    }

    /// Apply wildcard then own-type rules with `item` as source and target.
    pub fn apply_field_mappings_in_place(&self, item: &mut WorkItem) -> Result<(), FieldMapError> {
        self.field_maps.apply_in_place(item)
    }

    /// Run every processor action, in registration order.
    pub fn apply_processor_actions(&self, source: &WorkItem, target: &mut WorkItem) {
        for action in &self.processor_actions {
            action(source, target);
        }
    }

    fn measurements(&self, processors: usize) -> RunMeasurements {
        RunMeasurements {
            processors: processors as u64,
            actions: self.processor_actions.len() as u64,
            mappings: self.field_maps.type_count() as u64,
        }
    }
}

// =============================================================================
// MIGRATION ENGINE
// =============================================================================

/// Ordered pipeline of processing stages plus the registries they use.
pub struct MigrationEngine {
    stages: Vec<Box<dyn ProcessingStage>>,
    context: MigrationContext,
    telemetry: Box<dyn TelemetrySink>,
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<_> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("MigrationEngine")
            .field("stages", &stages)
            .field("context", &self.context)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

impl MigrationEngine {
    /// Create an engine that reports telemetry through `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_telemetry(TracingTelemetry)
    }

    /// Create an engine with a custom telemetry sink.
    #[must_use]
    pub fn with_telemetry(sink: impl TelemetrySink + 'static) -> Self {
        Self {
            stages: Vec::new(),
            context: MigrationContext::default(),
            telemetry: Box::new(sink),
        }
    }

    // -------------------------------------------------------------------------
    // Setup
    // -------------------------------------------------------------------------

    /// Set the source context. May be called once.
    pub fn set_source(&mut self, source: Arc<dyn ProjectContext>) -> Result<(), MigrationError> {
        if self.context.source.is_some() {
            return Err(MigrationError::ContextAlreadySet("source"));
        }
        self.context.source = Some(source);
        Ok(())
    }

    /// Set the target context. May be called once.
    pub fn set_target(&mut self, target: Arc<dyn ProjectContext>) -> Result<(), MigrationError> {
        if self.context.target.is_some() {
            return Err(MigrationError::ContextAlreadySet("target"));
        }
        self.context.target = Some(target);
        Ok(())
    }

    /// Override the origin-identity field name.
    pub fn set_reflected_work_item_id_field_name(&mut self, field: impl Into<String>) {
        self.context.reflected_work_item_id_field = field.into();
    }

    /// Append an already-constructed stage.
    pub fn add_processor(&mut self, stage: Box<dyn ProcessingStage>) {
        self.stages.push(stage);
    }

    /// Construct a stage from this engine's context and append it.
    ///
    /// `name` labels the stage in a construction error. A factory error is
    /// returned immediately; nothing is appended.
    pub fn add_processor_with<S, F>(&mut self, name: &str, factory: F) -> Result<(), MigrationError>
    where
        S: ProcessingStage + 'static,
        F: FnOnce(&MigrationContext) -> Result<S, StageError>,
    {
        let stage = factory(&self.context).map_err(|e| MigrationError::StageConstruction {
            stage: name.to_string(),
            reason: e.to_string(),
        })?;
        self.add_processor(Box::new(stage));
        Ok(())
    }

    /// Construct the stage registered under `name` and append it.
    pub fn add_registered_processor(
        &mut self,
        registry: &StageRegistry,
        name: &str,
    ) -> Result<(), MigrationError> {
        let stage = registry.build(name, &self.context)?;
        self.add_processor(stage);
        Ok(())
    }

    /// Append a field-mapping rule for `type_name` (or `"*"`).
    pub fn add_field_map(&mut self, type_name: impl Into<String>, rule: Arc<dyn FieldMap>) {
        self.context.field_maps.add(type_name, rule);
    }

    /// Register a type definition unless one exists for `type_name`.
    ///
    /// Returns `true` if it was inserted. A duplicate is ignored, not an error.
    pub fn add_work_item_type_definition(
        &mut self,
        type_name: impl Into<String>,
        mapper: Option<Arc<dyn TypeDefinitionMapper>>,
    ) -> bool {
        self.context.type_definitions.insert_if_absent(type_name, mapper)
    }

    /// Register a processor action.
    pub fn add_processor_action<F>(&mut self, action: F)
    where
        F: Fn(&WorkItem, &mut WorkItem) + Send + Sync + 'static,
    {
        self.context.processor_actions.push(Arc::new(action));
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Shared state handed to stages.
    #[must_use]
    pub fn context(&self) -> &MigrationContext {
        &self.context
    }

    /// The source context, if set.
    #[must_use]
    pub fn source(&self) -> Option<&Arc<dyn ProjectContext>> {
        self.context.source()
    }

    /// The target context, if set.
    #[must_use]
    pub fn target(&self) -> Option<&Arc<dyn ProjectContext>> {
        self.context.target()
    }

    /// Origin-identity field name.
    #[must_use]
    pub fn reflected_work_item_id_field_name(&self) -> &str {
        self.context.reflected_work_item_id_field_name()
    }

    /// Registered type definitions.
    #[must_use]
    pub fn work_item_type_definitions(&self) -> &TypeDefinitionRegistry {
        self.context.type_definitions()
    }

    /// Number of registered stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Name and status of every stage, in execution order.
    pub fn stage_statuses(&self) -> impl Iterator<Item = (&str, ProcessingStatus)> {
        self.stages.iter().map(|s| (s.name(), s.status()))
    }

    // -------------------------------------------------------------------------
    // Run
    // -------------------------------------------------------------------------

    /// Execute every stage in order, stopping at the first `Failed` status.
    ///
    /// Emits a `MigrationEngine:Run` event before the first stage and a
    /// `RunTime` metric after the last one, whatever the outcome. Sink
    /// errors and sink panics are logged and dropped. A stage
    /// that returns `Err` aborts the run with
    /// [`MigrationError::StageAborted`].
    pub fn run(&mut self, identity: &RunIdentity) -> Result<RunResult, MigrationError> {
        let started = Instant::now();
        let measurements = self.context.measurements(self.stages.len());

        tracing::info!(
            user = %identity.user,
            session = %identity.session_id,
            processors = measurements.processors,
            actions = measurements.actions,
            mappings = measurements.mappings,
            "migration run started"
        );
        let sent = catch_unwind(AssertUnwindSafe(|| {
            self.telemetry.track_event(RUN_EVENT, identity, &measurements)
        }));
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "dropping run telemetry event"),
            Err(_) => tracing::warn!("telemetry sink panicked on run event"),
        }

        let outcome = self.run_stages();

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let sent = catch_unwind(AssertUnwindSafe(|| {
            self.telemetry.track_metric(RUN_TIME_METRIC, identity, elapsed_ms)
        }));
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "dropping run time metric"),
            Err(_) => tracing::warn!("telemetry sink panicked on run time metric"),
        }

        match &outcome {
            Ok(result) => tracing::info!(?result, elapsed_ms, "migration run finished"),
            Err(e) => tracing::error!(error = %e, elapsed_ms, "migration run aborted"),
        }
        outcome
    }

    fn run_stages(&mut self) -> Result<RunResult, MigrationError> {
        let context = &self.context;
        for stage in &mut self.stages {
            tracing::debug!(stage = stage.name(), "executing stage");

            if let Err(source) = stage.execute(context) {
                return Err(MigrationError::StageAborted {
                    stage: stage.name().to_string(),
                    source,
                });
            }

            if stage.status() == ProcessingStatus::Failed {
                tracing::error!(
                    stage = stage.name(),
                    "processor {} entered the failed state, stopping run",
                    stage.name()
                );
                return Ok(RunResult::Failed);
            }
        }
        Ok(RunResult::Complete)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{NullTelemetry, RecordingTelemetry, TelemetryRecord};
    use crate::{TelemetryError, WorkItemId};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Scripted {
        name: String,
        outcome: ProcessingStatus,
        status: ProcessingStatus,
        log: Log,
    }

    impl Scripted {
        fn boxed(name: &str, outcome: ProcessingStatus, log: &Log) -> Box<dyn ProcessingStage> {
            Box::new(Self {
                name: name.to_string(),
                outcome,
                status: ProcessingStatus::NotRun,
                log: Arc::clone(log),
            })
        }
    }

    impl ProcessingStage for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn status(&self) -> ProcessingStatus {
            self.status
        }

        fn execute(&mut self, _ctx: &MigrationContext) -> Result<(), StageError> {
            self.log.lock().expect("lock").push(self.name.clone());
            self.status = self.outcome;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenSink;

    impl TelemetrySink for BrokenSink {
        fn track_event(
            &self,
            _: &str,
            _: &RunIdentity,
            _: &RunMeasurements,
        ) -> Result<(), TelemetryError> {
            Err(TelemetryError("offline".to_string()))
        }

        fn track_metric(&self, _: &str, _: &RunIdentity, _: u64) -> Result<(), TelemetryError> {
            Err(TelemetryError("offline".to_string()))
        }
    }

    #[derive(Debug)]
    struct PanickingSink;

    #[allow(clippy::panic)]
    impl TelemetrySink for PanickingSink {
        fn track_event(
            &self,
            _: &str,
            _: &RunIdentity,
            _: &RunMeasurements,
        ) -> Result<(), TelemetryError> {
            panic!("sink exploded")
        }

        fn track_metric(&self, _: &str, _: &RunIdentity, _: u64) -> Result<(), TelemetryError> {
            panic!("sink exploded")
        }
    }

    struct Aborting;

    impl ProcessingStage for Aborting {
        fn name(&self) -> &str {
            "aborting"
        }

        fn status(&self) -> ProcessingStatus {
            ProcessingStatus::Running
        }

        fn execute(&mut self, _ctx: &MigrationContext) -> Result<(), StageError> {
            Err(StageError::Other("store went away".to_string()))
        }
    }

    fn identity() -> RunIdentity {
        RunIdentity::new("tester", "session-1")
    }

    fn assert_event_then_metric(recorder: &RecordingTelemetry) {
        let records = recorder.records().expect("records");
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], TelemetryRecord::Event { name, .. } if name == RUN_EVENT));
        assert!(matches!(
            &records[1],
            TelemetryRecord::Metric { name, .. } if name == RUN_TIME_METRIC
        ));
    }

    #[test]
    fn empty_pipeline_completes() {
        let mut engine = MigrationEngine::with_telemetry(NullTelemetry);
        assert_eq!(engine.run(&identity()).expect("run"), RunResult::Complete);
    }

    #[test]
    fn failed_stage_stops_the_run() {
        let log = Log::default();
        let mut engine = MigrationEngine::with_telemetry(NullTelemetry);
        engine.add_processor(Scripted::boxed("a", ProcessingStatus::Complete, &log));
        engine.add_processor(Scripted::boxed("b", ProcessingStatus::Failed, &log));
        engine.add_processor(Scripted::boxed("c", ProcessingStatus::Complete, &log));

        assert_eq!(engine.run(&identity()).expect("run"), RunResult::Failed);
        assert_eq!(*log.lock().expect("lock"), vec!["a", "b"]);

        let statuses: Vec<_> = engine.stage_statuses().collect();
        assert_eq!(
            statuses,
            vec![
                ("a", ProcessingStatus::Complete),
                ("b", ProcessingStatus::Failed),
                ("c", ProcessingStatus::NotRun),
            ]
        );
    }

    #[test]
    fn telemetry_failures_do_not_change_the_outcome() {
        let log = Log::default();
        let mut engine = MigrationEngine::with_telemetry(BrokenSink);
        engine.add_processor(Scripted::boxed("a", ProcessingStatus::Complete, &log));

        assert_eq!(engine.run(&identity()).expect("run"), RunResult::Complete);
    }

    #[test]
    fn panicking_sink_does_not_unwind_out_of_run() {
        let log = Log::default();
        let mut engine = MigrationEngine::with_telemetry(PanickingSink);
        engine.add_processor(Scripted::boxed("a", ProcessingStatus::Complete, &log));

        assert_eq!(engine.run(&identity()).expect("run"), RunResult::Complete);
        assert_eq!(*log.lock().expect("lock"), vec!["a"]);
    }

    #[test]
    fn failed_run_still_reports_event_and_metric() {
        let log = Log::default();
        let recorder = Arc::new(RecordingTelemetry::new());
        let mut engine = MigrationEngine::with_telemetry(Arc::clone(&recorder));
        engine.add_processor(Scripted::boxed("a", ProcessingStatus::Failed, &log));

        assert_eq!(engine.run(&identity()).expect("run"), RunResult::Failed);
        assert_event_then_metric(&recorder);
    }

    #[test]
    fn aborted_run_still_reports_event_and_metric() {
        let recorder = Arc::new(RecordingTelemetry::new());
        let mut engine = MigrationEngine::with_telemetry(Arc::clone(&recorder));
        engine.add_processor(Box::new(Aborting));

        let err = engine.run(&identity()).expect_err("stage error aborts the run");
        assert!(matches!(
            err,
            MigrationError::StageAborted { ref stage, .. } if stage == "aborting"
        ));
        assert_event_then_metric(&recorder);
    }

    #[test]
    fn run_reports_setup_counts() {
        #[derive(Debug)]
        struct Noop;
        impl FieldMap for Noop {
            fn name(&self) -> &str {
                "noop"
            }
            fn execute(&self, _: &WorkItem, _: &mut WorkItem) -> Result<(), FieldMapError> {
                Ok(())
            }
        }

        let sink = Arc::new(RecordingTelemetry::new());
        let log = Log::default();
        let mut engine = MigrationEngine::with_telemetry(Arc::clone(&sink));
        engine.add_field_map("*", Arc::new(Noop));
        engine.add_field_map("Bug", Arc::new(Noop));
        engine.add_field_map("Bug", Arc::new(Noop));
        engine.add_processor_action(|_, _| {});
        engine.add_processor(Scripted::boxed("a", ProcessingStatus::Complete, &log));

        engine.run(&identity()).expect("run");

        let records = sink.records().expect("records");
        assert_eq!(records.len(), 2);
        let expected = RunMeasurements {
            processors: 1,
            actions: 1,
            mappings: 2,
        };
        assert!(matches!(
            &records[0],
            TelemetryRecord::Event { name, identity: who, measurements }
                if name == RUN_EVENT && who.session_id == "session-1" && *measurements == expected
        ));
        assert!(matches!(
            &records[1],
            TelemetryRecord::Metric { name, .. } if name == RUN_TIME_METRIC
        ));
    }

    #[test]
    fn contexts_can_only_be_set_once() {
        #[derive(Debug)]
        struct Empty;
        impl ProjectContext for Empty {
            fn name(&self) -> &str {
                "empty"
            }
            fn work_items(&self) -> Result<Vec<WorkItem>, StageError> {
                Ok(Vec::new())
            }
            fn save(&self, item: WorkItem) -> Result<WorkItemId, StageError> {
                Ok(item.id)
            }
        }

        let mut engine = MigrationEngine::new();
        engine.set_source(Arc::new(Empty)).expect("source");
        engine.set_target(Arc::new(Empty)).expect("target");

        assert!(matches!(
            engine.set_source(Arc::new(Empty)),
            Err(MigrationError::ContextAlreadySet("source"))
        ));
        assert!(matches!(
            engine.set_target(Arc::new(Empty)),
            Err(MigrationError::ContextAlreadySet("target"))
        ));
        assert_eq!(engine.source().map(|s| s.name()), Some("empty"));
    }

    #[test]
    fn reflected_field_name_defaults_and_overrides() {
        let mut engine = MigrationEngine::new();
        assert_eq!(
            engine.reflected_work_item_id_field_name(),
            "TfsMigrationTool.ReflectedWorkItemId"
        );
        engine.set_reflected_work_item_id_field_name("Custom.OriginId");
        assert_eq!(engine.reflected_work_item_id_field_name(), "Custom.OriginId");
    }

    #[test]
    fn processor_actions_run_in_order() {
        let mut engine = MigrationEngine::new();
        engine.add_processor_action(|_, target| target.set_field("order", "1"));
        engine.add_processor_action(|source, target| {
            let prev = target.field("order").map(|v| v.as_str().to_string()).unwrap_or_default();
            target.set_field("order", format!("{prev}2{}", source.id));
        });

        let source = WorkItem::new(WorkItemId(9), "Bug");
        let mut target = WorkItem::new(WorkItemId(1), "Bug");
        engine.context().apply_processor_actions(&source, &mut target);

        assert_eq!(target.field("order").map(|v| v.as_str()), Some("129"));
    }
}
