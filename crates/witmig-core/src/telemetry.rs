//! # Telemetry
//!
//! Side-channel observer for engine runs.
//!
//! The engine emits one event when a run starts and one duration metric when
//! it ends. Sink errors are logged and dropped: telemetry never changes the
//! outcome of a run.

use crate::TelemetryError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Mutex;

/// Event emitted at the start of every run.
pub const RUN_EVENT: &str = "MigrationEngine:Run";

/// Metric emitted at the end of every run, in milliseconds.
pub const RUN_TIME_METRIC: &str = "RunTime";

/// Who started a run, and under which correlation id.
///
/// Passed explicitly into [`crate::MigrationEngine::run`] so the run loop
/// never reads ambient process state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Invoking principal.
    pub user: String,
    /// Fresh correlation id for this run.
    pub session_id: String,
}

impl RunIdentity {
    /// Create a new run identity.
    #[must_use]
    pub fn new(user: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            session_id: session_id.into(),
        }
    }
}

/// Setup counts captured at run start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunMeasurements {
    /// Registered stages.
    pub processors: u64,
    /// Registered processor actions.
    pub actions: u64,
    /// Distinct field-map keys (wildcard included).
    pub mappings: u64,
}

/// Receives run events and metrics.
///
/// Delivery is best effort. The engine logs and drops a returned error, and
/// a sink that panics is caught at the call site and logged the same way;
/// neither changes the run outcome.
pub trait TelemetrySink: Send + Sync + Debug {
    /// Record a named event.
    fn track_event(
        &self,
        name: &str,
        identity: &RunIdentity,
        measurements: &RunMeasurements,
    ) -> Result<(), TelemetryError>;

    /// Record a named metric value.
    fn track_metric(
        &self,
        name: &str,
        identity: &RunIdentity,
        value_ms: u64,
    ) -> Result<(), TelemetryError>;
}

// =============================================================================
// SINKS
// =============================================================================

/// Sink that writes events to `tracing`. The engine default.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn track_event(
        &self,
        name: &str,
        identity: &RunIdentity,
        measurements: &RunMeasurements,
    ) -> Result<(), TelemetryError> {
        tracing::info!(
            event = name,
            user = %identity.user,
            session = %identity.session_id,
            processors = measurements.processors,
            actions = measurements.actions,
            mappings = measurements.mappings,
            "telemetry event"
        );
        Ok(())
    }

    fn track_metric(
        &self,
        name: &str,
        identity: &RunIdentity,
        value_ms: u64,
    ) -> Result<(), TelemetryError> {
        tracing::info!(
            metric = name,
            session = %identity.session_id,
            value_ms,
            "telemetry metric"
        );
        Ok(())
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn track_event(
        &self,
        _: &str,
        _: &RunIdentity,
        _: &RunMeasurements,
    ) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn track_metric(&self, _: &str, _: &RunIdentity, _: u64) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// One recorded emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryRecord {
    /// A `track_event` call.
    Event {
        name: String,
        identity: RunIdentity,
        measurements: RunMeasurements,
    },
    /// A `track_metric` call.
    Metric {
        name: String,
        identity: RunIdentity,
        value_ms: u64,
    },
}

/// Sink that keeps every emission in memory.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl RecordingTelemetry {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn records(&self) -> Result<Vec<TelemetryRecord>, TelemetryError> {
        self.records
            .lock()
            .map(|records| records.clone())
            .map_err(|e| TelemetryError(e.to_string()))
    }

    fn push(&self, record: TelemetryRecord) -> Result<(), TelemetryError> {
        self.records
            .lock()
            .map(|mut records| records.push(record))
            .map_err(|e| TelemetryError(e.to_string()))
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn track_event(
        &self,
        name: &str,
        identity: &RunIdentity,
        measurements: &RunMeasurements,
    ) -> Result<(), TelemetryError> {
        self.push(TelemetryRecord::Event {
            name: name.to_string(),
            identity: identity.clone(),
            measurements: *measurements,
        })
    }

    fn track_metric(
        &self,
        name: &str,
        identity: &RunIdentity,
        value_ms: u64,
    ) -> Result<(), TelemetryError> {
        self.push(TelemetryRecord::Metric {
            name: name.to_string(),
            identity: identity.clone(),
            value_ms,
        })
    }
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for std::sync::Arc<T> {
    fn track_event(
        &self,
        name: &str,
        identity: &RunIdentity,
        measurements: &RunMeasurements,
    ) -> Result<(), TelemetryError> {
        (**self).track_event(name, identity, measurements)
    }

    fn track_metric(
        &self,
        name: &str,
        identity: &RunIdentity,
        value_ms: u64,
    ) -> Result<(), TelemetryError> {
        (**self).track_metric(name, identity, value_ms)
    }
}

// =============================================================================
// TESTS
// =============================================================================
