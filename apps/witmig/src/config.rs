//! # Migration Configuration
//!
//! TOML description of one migration: the two stores, the stage list, type
//! definitions and field maps.
//!
//! ```toml
//! stages = ["work_item_migration"]
//!
//! [source]
//! name = "legacy"
//! path = "source.json"
//!
//! [target]
//! name = "modern"
//! path = "target.json"
//!
//! [[type_definitions]]
//! name = "Bug"
//! target = "Defect"
//!
//! [[field_maps]]
//! work_item_type = "*"
//! kind = "field_to_field"
//! source_field = "System.Title"
//! target_field = "System.Title"
//! ```

use crate::rules::{FieldBlankMap, FieldToFieldMap, FieldToTagMap, FieldValueMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use witmig_core::{FieldMap, MigrationError};

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// A whole migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    /// Override for the origin-identity field name.
    #[serde(default)]
    pub reflected_work_item_id_field: Option<String>,
    /// Stage names, in execution order.
    pub stages: Vec<String>,
    /// Store items are read from.
    pub source: StoreConfig,
    /// Store items are written to.
    pub target: StoreConfig,
    /// Types to migrate.
    #[serde(default)]
    pub type_definitions: Vec<TypeDefinitionConfig>,
    /// Field-mapping rules, in registration order.
    #[serde(default)]
    pub field_maps: Vec<FieldMapConfig>,
}

/// A JSON file store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Project name used in diagnostics and reflected ids.
    pub name: String,
    /// JSON file, relative to the configuration file.
    pub path: PathBuf,
}

/// One migrated work item type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDefinitionConfig {
    /// Source type name.
    pub name: String,
    /// Target type name; defaults to the source name.
    #[serde(default)]
    pub target: Option<String>,
}

/// Built-in field map kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMapKind {
    /// Copy one field to another.
    FieldToField,
    /// Translate values through a lookup table.
    FieldValue,
    /// Remove a field from the target.
    FieldBlank,
    /// Append a field's value to the target's tags.
    FieldToTag,
}

/// One field-mapping rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldMapConfig {
    /// Type name the rule is registered under, or `"*"`.
    pub work_item_type: String,
    /// Rule kind.
    pub kind: FieldMapKind,
    #[serde(default)]
    pub source_field: Option<String>,
    #[serde(default)]
    pub target_field: Option<String>,
    /// Fail when the source field is missing (`field_to_field` only).
    #[serde(default)]
    pub required: bool,
    /// Value table (`field_value` only).
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// Fallback for unmapped values (`field_value` only).
    #[serde(default)]
    pub default: Option<String>,
}

impl FieldMapConfig {
    fn require(&self, value: &Option<String>, key: &str) -> Result<String, MigrationError> {
        value.clone().filter(|v| !v.is_empty()).ok_or_else(|| {
            MigrationError::Config(format!(
                "field map {:?} for '{}' requires '{}'",
                self.kind, self.work_item_type, key
            ))
        })
    }

    /// Build the rule this entry describes.
    pub fn build_rule(&self) -> Result<Arc<dyn FieldMap>, MigrationError> {
        let rule: Arc<dyn FieldMap> = match self.kind {
            FieldMapKind::FieldToField => Arc::new(FieldToFieldMap::new(
                self.require(&self.source_field, "source_field")?,
                self.require(&self.target_field, "target_field")?,
                self.required,
            )),
            FieldMapKind::FieldValue => Arc::new(FieldValueMap::new(
                self.require(&self.source_field, "source_field")?,
                self.require(&self.target_field, "target_field")?,
                self.values.clone(),
                self.default.clone(),
            )),
            FieldMapKind::FieldBlank => Arc::new(FieldBlankMap::new(
                self.require(&self.target_field, "target_field")?,
            )),
            FieldMapKind::FieldToTag => Arc::new(FieldToTagMap::new(
                self.require(&self.source_field, "source_field")?,
            )),
        };
        Ok(rule)
    }
}

impl MigrationConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, MigrationError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            MigrationError::Io(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(MigrationError::Config(format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::Io(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, MigrationError> {
        let config: Self = toml::from_str(text).map_err(|e| MigrationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything serde cannot.
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.stages.is_empty() {
            return Err(MigrationError::Config("no stages configured".to_string()));
        }
        for (role, store) in [("source", &self.source), ("target", &self.target)] {
            if store.name.trim().is_empty() {
                return Err(MigrationError::Config(format!("{role} store has no name")));
            }
        }
        if self
            .reflected_work_item_id_field
            .as_deref()
            .is_some_and(|f| f.trim().is_empty())
        {
            return Err(MigrationError::Config(
                "reflected_work_item_id_field is empty".to_string(),
            ));
        }
        for definition in &self.type_definitions {
            if definition.name.trim().is_empty() {
                return Err(MigrationError::Config(
                    "type definition has no name".to_string(),
                ));
            }
        }
        for field_map in &self.field_maps {
            if field_map.work_item_type.trim().is_empty() {
                return Err(MigrationError::Config(
                    "field map has no work_item_type".to_string(),
                ));
            }
            field_map.build_rule()?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
