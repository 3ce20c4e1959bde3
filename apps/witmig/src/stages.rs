//! # Built-in Stages
//!
//! - `work_item_migration` - copies source items of registered types to the
//!   target, applying field maps and tagging each copy with its origin
//! - `work_item_update` - re-applies field maps in place to every migrated
//!   target item
//!
//! Both stages convert internal errors into a `Failed` status.

use std::collections::BTreeSet;
use witmig_core::{
    MigrationContext, ProcessingStage, ProcessingStatus, StageError, StageRegistry, WorkItem,
    WorkItemId, run_guarded,
};

/// Name of the migration stage.
pub const WORK_ITEM_MIGRATION: &str = "work_item_migration";

/// Name of the in-place update stage.
pub const WORK_ITEM_UPDATE: &str = "work_item_update";

/// Registry of every stage this binary can build.
#[must_use]
pub fn builtin_stages() -> StageRegistry {
    StageRegistry::new()
        .with(WORK_ITEM_MIGRATION, WorkItemMigrationStage::build)
        .with(WORK_ITEM_UPDATE, WorkItemUpdateStage::build)
}

/// Reference from a target item back to its source item.
#[must_use]
pub fn reflected_id(project: &str, id: WorkItemId) -> String {
    format!("{project}/{id}")
}

// =============================================================================
// MIGRATION STAGE
// =============================================================================

/// Per-run counters of the migration stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationCounts {
    /// Items written to the target.
    pub migrated: usize,
    /// Items whose origin is already present in the target.
    pub already_migrated: usize,
    /// Items of a type without a type definition.
    pub unmapped_type: usize,
}

/// Copies source work items into the target store.
#[derive(Debug, Default)]
pub struct WorkItemMigrationStage {
    status: ProcessingStatus,
    counts: MigrationCounts,
}

impl WorkItemMigrationStage {
    /// Factory for [`StageRegistry`]. Fails if either context is missing.
    pub fn build(ctx: &MigrationContext) -> Result<Box<dyn ProcessingStage>, StageError> {
        ctx.require_source()?;
        ctx.require_target()?;
        Ok(Box::new(Self::default()))
    }

    /// Counters of the last execution.
    #[must_use]
    pub fn counts(&self) -> MigrationCounts {
        self.counts
    }

    fn migrate(ctx: &MigrationContext, counts: &mut MigrationCounts) -> Result<(), StageError> {
        let source = ctx.require_source()?;
        let target = ctx.require_target()?;
        let reflected_field = ctx.reflected_work_item_id_field_name();

        // Origins already in the target, read once and extended as items are saved.
        let mut migrated_origins: BTreeSet<String> = target
            .work_items()?
            .into_iter()
            .filter_map(|item| item.field(reflected_field).map(|v| v.as_str().to_string()))
            .collect();

        for item in source.work_items()? {
            let Some(target_type) = ctx.type_definitions().target_type_name(item.type_name())
            else {
                tracing::debug!(
                    id = %item.id,
                    work_item_type = item.type_name(),
                    "no type definition, skipping"
                );
                counts.unmapped_type += 1;
                continue;
            };

            let origin = reflected_id(source.name(), item.id);
            if migrated_origins.contains(&origin) {
                tracing::debug!(id = %item.id, "already migrated, skipping");
                counts.already_migrated += 1;
                continue;
            }

            let mut migrated = WorkItem::new(WorkItemId(0), target_type);
            ctx.apply_field_mappings(&item, &mut migrated)?;
            ctx.apply_processor_actions(&item, &mut migrated);
            migrated.set_field(reflected_field, origin.clone());

            let new_id = target.save(migrated)?;
            tracing::debug!(source_id = %item.id, target_id = %new_id, "work item migrated");
            migrated_origins.insert(origin);
            counts.migrated += 1;
        }
        Ok(())
    }
}

impl ProcessingStage for WorkItemMigrationStage {
    fn name(&self) -> &str {
        WORK_ITEM_MIGRATION
    }

    fn status(&self) -> ProcessingStatus {
        self.status
    }

    fn execute(&mut self, ctx: &MigrationContext) -> Result<(), StageError> {
        self.status = ProcessingStatus::Running;
        let mut counts = MigrationCounts::default();
        self.status = run_guarded(WORK_ITEM_MIGRATION, || Self::migrate(ctx, &mut counts));
        self.counts = counts;

        tracing::info!(
            status = %self.status,
            migrated = counts.migrated,
            already_migrated = counts.already_migrated,
            unmapped_type = counts.unmapped_type,
            "work item migration finished"
        );
        Ok(())
    }
}

// =============================================================================
// UPDATE STAGE
// =============================================================================

/// Re-applies field maps in place to migrated target items.
#[derive(Debug, Default)]
pub struct WorkItemUpdateStage {
    status: ProcessingStatus,
    updated: usize,
}

impl WorkItemUpdateStage {
    /// Factory for [`StageRegistry`]. Fails if the target is missing.
    pub fn build(ctx: &MigrationContext) -> Result<Box<dyn ProcessingStage>, StageError> {
        ctx.require_target()?;
        Ok(Box::new(Self::default()))
    }

    /// Items updated by the last execution.
    #[must_use]
    pub fn updated(&self) -> usize {
        self.updated
    }

    fn update(ctx: &MigrationContext, updated: &mut usize) -> Result<(), StageError> {
        let target = ctx.require_target()?;
        let reflected_field = ctx.reflected_work_item_id_field_name();

        for mut item in target.work_items()? {
            if item.field(reflected_field).is_none() {
                continue;
            }
            ctx.apply_field_mappings_in_place(&mut item)?;
            target.save(item)?;
            *updated += 1;
        }
        Ok(())
    }
}

impl ProcessingStage for WorkItemUpdateStage {
    fn name(&self) -> &str {
        WORK_ITEM_UPDATE
    }

    fn status(&self) -> ProcessingStatus {
        self.status
    }

    fn execute(&mut self, ctx: &MigrationContext) -> Result<(), StageError> {
        self.status = ProcessingStatus::Running;
        let mut updated = 0;
        self.status = run_guarded(WORK_ITEM_UPDATE, || Self::update(ctx, &mut updated));
        self.updated = updated;

        tracing::info!(status = %self.status, updated, "work item update finished");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
