//! # Engine Assembly
//!
//! Turns a [`MigrationConfig`] into a ready-to-run [`MigrationEngine`].
//!
//! Order matters: contexts and registries are populated before any stage
//! is constructed, so stage factories can validate what they depend on.

use crate::config::MigrationConfig;
use crate::rules::RenameTypeMapper;
use crate::stages::builtin_stages;
use crate::store::JsonFileStore;
use std::path::Path;
use std::sync::Arc;
use witmig_core::{
    MigrationEngine, MigrationError, StageRegistry, TelemetrySink, TypeDefinitionMapper,
};

/// A wired engine plus handles on its stores.
#[derive(Debug)]
pub struct Assembly {
    /// The engine, ready for `run`.
    pub engine: MigrationEngine,
    /// Source store.
    pub source: Arc<JsonFileStore>,
    /// Target store; persist it after the run.
    pub target: Arc<JsonFileStore>,
}

/// Build an engine from `config` using the built-in stages.
///
/// Store paths are resolved relative to `base_dir`.
pub fn assemble(
    config: &MigrationConfig,
    base_dir: &Path,
    telemetry: impl TelemetrySink + 'static,
) -> Result<Assembly, MigrationError> {
    assemble_with(config, base_dir, telemetry, &builtin_stages())
}

/// Build an engine from `config`, resolving stage names in `stages`.
pub fn assemble_with(
    config: &MigrationConfig,
    base_dir: &Path,
    telemetry: impl TelemetrySink + 'static,
    stages: &StageRegistry,
) -> Result<Assembly, MigrationError> {
    let source = Arc::new(JsonFileStore::open(
        config.source.name.clone(),
        base_dir.join(&config.source.path),
    )?);
    let target = Arc::new(JsonFileStore::open(
        config.target.name.clone(),
        base_dir.join(&config.target.path),
    )?);

    let mut engine = MigrationEngine::with_telemetry(telemetry);
    if let Some(field) = &config.reflected_work_item_id_field {
        engine.set_reflected_work_item_id_field_name(field.clone());
    }
    engine.set_source(source.clone())?;
    engine.set_target(target.clone())?;

    for definition in &config.type_definitions {
        let mapper = definition
            .target
            .as_ref()
            .map(|t| Arc::new(RenameTypeMapper::new(t.clone())) as Arc<dyn TypeDefinitionMapper>);
        if !engine.add_work_item_type_definition(definition.name.clone(), mapper) {
            tracing::warn!(
                "Type definition for '{}' already registered, keeping the first one",
                definition.name
            );
        }
    }

    for field_map in &config.field_maps {
        engine.add_field_map(field_map.work_item_type.clone(), field_map.build_rule()?);
    }

    for name in &config.stages {
        engine.add_registered_processor(stages, name)?;
    }

    tracing::info!(
        "Assembled engine: {} stages, {} type definitions, {} field maps",
        engine.stage_count(),
        engine.work_item_type_definitions().len(),
        engine.context().field_maps().rule_count()
    );

    Ok(Assembly {
        engine,
        source,
        target,
    })
}
