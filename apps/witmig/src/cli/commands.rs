//! # CLI Command Implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use witmig::{MigrationConfig, assemble, builtin_stages};
use witmig_core::{
    MigrationError, RecordingTelemetry, RunIdentity, RunResult, TelemetryRecord, TracingTelemetry,
};

/// Validate the configuration path and return it with its directory.
fn resolve_config(path: &Path) -> Result<(PathBuf, PathBuf), MigrationError> {
    let canonical = path.canonicalize().map_err(|e| {
        MigrationError::Io(format!("Invalid config path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(MigrationError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    let base_dir = canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((canonical, base_dir))
}

/// Principal for run telemetry: explicit flag, then the login name.
fn resolve_user(user: Option<String>) -> String {
    user.or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("USERNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Run the configured migration and persist the target store.
///
/// The target is persisted whatever the outcome, so items written before a
/// failing stage are kept.
pub fn cmd_run(
    config_path: &Path,
    user: Option<String>,
    json_mode: bool,
) -> Result<RunResult, MigrationError> {
    let (config_path, base_dir) = resolve_config(config_path)?;
    let config = MigrationConfig::load(&config_path)?;
    let identity = RunIdentity::new(resolve_user(user), uuid::Uuid::new_v4().to_string());

    tracing::info!("Running migration from {:?}", config_path);

    let recorder = Arc::new(RecordingTelemetry::new());
    let mut assembly = if json_mode {
        assemble(&config, &base_dir, Arc::clone(&recorder))?
    } else {
        assemble(&config, &base_dir, TracingTelemetry)?
    };

    let outcome = assembly.engine.run(&identity);
    assembly.target.persist()?;
    let result = outcome?;

    let stages: Vec<_> = assembly
        .engine
        .stage_statuses()
        .map(|(name, status)| (name.to_string(), status.to_string()))
        .collect();

    if json_mode {
        let run_time_ms = recorder
            .records()
            .unwrap_or_default()
            .into_iter()
            .find_map(|record| match record {
                TelemetryRecord::Metric { value_ms, .. } => Some(value_ms),
                TelemetryRecord::Event { .. } => None,
            });
        let output = serde_json::json!({
            "result": format!("{:?}", result),
            "session_id": identity.session_id,
            "user": identity.user,
            "run_time_ms": run_time_ms,
            "stages": stages
                .iter()
                .map(|(name, status)| serde_json::json!({ "name": name, "status": status }))
                .collect::<Vec<_>>(),
            "target": assembly.target.path().to_string_lossy(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(result);
    }

    println!("Migration Run");
    println!("=============");
    println!("Session: {}", identity.session_id);
    println!("User:    {}", identity.user);
    println!();
    for (name, status) in &stages {
        println!("  {:<24} {}", name, status);
    }
    println!();
    println!("Result:  {:?}", result);
    println!("Target:  {:?}", assembly.target.path());

    Ok(result)
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Load the configuration and assemble the engine without running it.
pub fn cmd_validate(
    config_path: &Path,
    json_mode: bool,
    verbose: bool,
) -> Result<RunResult, MigrationError> {
    let (config_path, base_dir) = resolve_config(config_path)?;
    let config = MigrationConfig::load(&config_path)?;
    let assembly = assemble(&config, &base_dir, TracingTelemetry)?;

    let source_items = assembly.source.len()?;
    let target_items = assembly.target.len()?;
    let types: Vec<String> = assembly
        .engine
        .work_item_type_definitions()
        .type_names()
        .map(String::from)
        .collect();

    if json_mode {
        let output = serde_json::json!({
            "valid": true,
            "stages": config.stages,
            "type_definitions": types,
            "field_maps": assembly.engine.context().field_maps().rule_count(),
            "reflected_work_item_id_field": assembly.engine.reflected_work_item_id_field_name(),
            "source_items": source_items,
            "target_items": target_items,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(RunResult::Complete);
    }

    println!("Configuration OK: {:?}", config_path);
    println!("Stages:       {}", config.stages.join(" -> "));
    println!("Types:        {}", types.join(", "));
    println!(
        "Field maps:   {}",
        assembly.engine.context().field_maps().rule_count()
    );
    println!("Source items: {}", source_items);
    println!("Target items: {}", target_items);
    if verbose {
        println!(
            "Reflected id: {}",
            assembly.engine.reflected_work_item_id_field_name()
        );
    }

    Ok(RunResult::Complete)
}

// =============================================================================
// STAGES COMMAND
// =============================================================================

/// List the built-in stage names.
pub fn cmd_stages(json_mode: bool) -> Result<RunResult, MigrationError> {
    let registry = builtin_stages();
    let names: Vec<&str> = registry.names().collect();

    if json_mode {
        println!("{}", serde_json::json!({ "stages": names }));
    } else {
        println!("Built-in stages:");
        for name in names {
            println!("  {}", name);
        }
    }
    Ok(RunResult::Complete)
}
