//! End-to-end tests: configuration file to persisted target store.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use std::path::Path;
use std::sync::Arc;
use witmig::stages::{WORK_ITEM_MIGRATION, WORK_ITEM_UPDATE};
use witmig::{JsonFileStore, MigrationConfig, assemble};
use witmig_core::{
    MigrationError, NullTelemetry, ProcessingStatus, ProjectContext, RUN_EVENT, RUN_TIME_METRIC,
    RecordingTelemetry, RunIdentity, RunResult, TelemetryRecord, WorkItem, WorkItemId,
};

// =============================================================================
// FIXTURES
// =============================================================================

const CONFIG: &str = r#"
stages = ["work_item_migration", "work_item_update"]

[source]
name = "legacy"
path = "source.json"

[target]
name = "modern"
path = "target.json"

[[type_definitions]]
name = "Bug"
target = "Defect"

[[type_definitions]]
name = "Task"

[[type_definitions]]
name = "Bug"
target = "Issue"

[[field_maps]]
work_item_type = "*"
kind = "field_to_field"
source_field = "System.Title"
target_field = "System.Title"

[[field_maps]]
work_item_type = "Bug"
kind = "field_value"
source_field = "System.State"
target_field = "System.State"
default = "New"

[field_maps.values]
Active = "Committed"

[[field_maps]]
work_item_type = "*"
kind = "field_to_tag"
source_field = "Custom.Area"
"#;

fn write_source(dir: &Path) {
    let items = vec![
        WorkItem::new(WorkItemId(10), "Bug")
            .with_field("System.Title", "Crash on save")
            .with_field("System.State", "Active")
            .with_field("Custom.Area", "Storage"),
        WorkItem::new(WorkItemId(11), "Task").with_field("System.Title", "Write release notes"),
        WorkItem::new(WorkItemId(12), "Epic").with_field("System.Title", "Platform"),
    ];
    std::fs::write(
        dir.join("source.json"),
        serde_json::to_string(&items).unwrap(),
    )
    .unwrap();
}

fn identity() -> RunIdentity {
    RunIdentity::new("tester", "11111111-2222-3333-4444-555555555555")
}

fn field<'a>(item: &'a WorkItem, name: &str) -> Option<&'a str> {
    item.field(name).map(|v| v.as_str())
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn migration_writes_mapped_items_to_target_file() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path());
    let config = MigrationConfig::from_toml_str(CONFIG).unwrap();

    let mut assembly = assemble(&config, dir.path(), NullTelemetry).unwrap();
    let result = assembly.engine.run(&identity()).unwrap();
    assembly.target.persist().unwrap();

    assert_eq!(result, RunResult::Complete);
    let statuses: Vec<_> = assembly.engine.stage_statuses().collect();
    assert_eq!(
        statuses,
        vec![
            (WORK_ITEM_MIGRATION, ProcessingStatus::Complete),
            (WORK_ITEM_UPDATE, ProcessingStatus::Complete),
        ]
    );

    let target = JsonFileStore::open("modern", dir.path().join("target.json")).unwrap();
    let items = target.work_items().unwrap();
    assert_eq!(items.len(), 2);

    let bug = &items[0];
    assert_eq!(bug.work_item_type, "Defect");
    assert_eq!(field(bug, "System.Title"), Some("Crash on save"));
    assert_eq!(field(bug, "System.State"), Some("Committed"));
    assert_eq!(field(bug, "System.Tags"), Some("Custom.Area: Storage"));
    assert_eq!(
        field(bug, "TfsMigrationTool.ReflectedWorkItemId"),
        Some("legacy/10")
    );

    let task = &items[1];
    assert_eq!(task.work_item_type, "Task");
    assert_eq!(
        field(task, "TfsMigrationTool.ReflectedWorkItemId"),
        Some("legacy/11")
    );
}

#[test]
fn second_run_does_not_duplicate_items() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path());
    let config = MigrationConfig::from_toml_str(CONFIG).unwrap();

    for _ in 0..2 {
        let mut assembly = assemble(&config, dir.path(), NullTelemetry).unwrap();
        assembly.engine.run(&identity()).unwrap();
        assembly.target.persist().unwrap();
    }

    let target = JsonFileStore::open("modern", dir.path().join("target.json")).unwrap();
    assert_eq!(target.len().unwrap(), 2);
}

#[test]
fn custom_reflected_field_is_used() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path());
    let text = format!("reflected_work_item_id_field = \"Custom.Origin\"\n{CONFIG}");
    let config = MigrationConfig::from_toml_str(&text).unwrap();

    let mut assembly = assemble(&config, dir.path(), NullTelemetry).unwrap();
    assembly.engine.run(&identity()).unwrap();

    let items = assembly.target.work_items().unwrap();
    assert!(items.iter().all(|i| i.field("Custom.Origin").is_some()));
    assert!(
        items
            .iter()
            .all(|i| i.field("TfsMigrationTool.ReflectedWorkItemId").is_none())
    );
}

#[test]
fn failing_rule_stops_before_update_stage() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path());
    let text = format!(
        "{CONFIG}\n{}",
        r#"
[[field_maps]]
work_item_type = "Task"
kind = "field_to_field"
source_field = "Custom.Estimate"
target_field = "Custom.Estimate"
required = true
"#
    );
    let config = MigrationConfig::from_toml_str(&text).unwrap();

    let mut assembly = assemble(&config, dir.path(), NullTelemetry).unwrap();
    let result = assembly.engine.run(&identity()).unwrap();

    assert_eq!(result, RunResult::Failed);
    let statuses: Vec<_> = assembly.engine.stage_statuses().collect();
    assert_eq!(
        statuses,
        vec![
            (WORK_ITEM_MIGRATION, ProcessingStatus::Failed),
            (WORK_ITEM_UPDATE, ProcessingStatus::NotRun),
        ]
    );
    // The bug was written before the task failed.
    assert_eq!(assembly.target.len().unwrap(), 1);
}

#[test]
fn unknown_stage_fails_assembly() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path());
    let text = CONFIG.replace("\"work_item_update\"", "\"work_item_teleport\"");
    let config = MigrationConfig::from_toml_str(&text).unwrap();

    let err = assemble(&config, dir.path(), NullTelemetry).unwrap_err();
    assert!(matches!(err, MigrationError::UnknownStage(ref name) if name == "work_item_teleport"));
}

#[test]
fn run_emits_event_and_duration_metric() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path());
    let config = MigrationConfig::from_toml_str(CONFIG).unwrap();
    let recorder = Arc::new(RecordingTelemetry::new());

    let mut assembly = assemble(&config, dir.path(), Arc::clone(&recorder)).unwrap();
    assembly.engine.run(&identity()).unwrap();

    let records = recorder.records().unwrap();
    assert_eq!(records.len(), 2);
    assert!(matches!(
        &records[0],
        TelemetryRecord::Event { name, identity, measurements }
            if name == RUN_EVENT
                && identity.user == "tester"
                && measurements.processors == 2
                && measurements.mappings == 2
    ));
    assert!(matches!(&records[1], TelemetryRecord::Metric { name, .. } if name == RUN_TIME_METRIC));
}
