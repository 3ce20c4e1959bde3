//! # Built-in Field Maps
//!
//! Concrete field-mapping rules and the type renaming mapper configured
//! from TOML.

use std::collections::BTreeMap;
use witmig_core::{FieldMap, FieldMapError, TypeDefinitionMapper, WorkItem};

/// Field holding `;`-separated tags.
pub const TAGS_FIELD: &str = "System.Tags";

// =============================================================================
// FIELD TO FIELD
// =============================================================================

/// Copies `source_field` onto `target_field`.
///
/// A missing source field is skipped, unless the rule is `required`.
#[derive(Debug, Clone)]
pub struct FieldToFieldMap {
    name: String,
    source_field: String,
    target_field: String,
    required: bool,
}

impl FieldToFieldMap {
    /// Create a copy rule.
    #[must_use]
    pub fn new(source_field: String, target_field: String, required: bool) -> Self {
        Self {
            name: format!("field_to_field:{source_field}->{target_field}"),
            source_field,
            target_field,
            required,
        }
    }
}

impl FieldMap for FieldToFieldMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, source: &WorkItem, target: &mut WorkItem) -> Result<(), FieldMapError> {
        match source.field(&self.source_field) {
            Some(value) => {
                target.set_field(self.target_field.clone(), value.as_str());
                Ok(())
            }
            None if self.required => Err(FieldMapError::MissingField {
                rule: self.name.clone(),
                field: self.source_field.clone(),
            }),
            None => Ok(()),
        }
    }
}

// =============================================================================
// FIELD VALUE
// =============================================================================

/// Translates the value of `source_field` through a lookup table.
///
/// Unmapped values fall back to `default`; without a default the target is
/// left untouched.
#[derive(Debug, Clone)]
pub struct FieldValueMap {
    name: String,
    source_field: String,
    target_field: String,
    values: BTreeMap<String, String>,
    default: Option<String>,
}

impl FieldValueMap {
    /// Create a value translation rule.
    #[must_use]
    pub fn new(
        source_field: String,
        target_field: String,
        values: BTreeMap<String, String>,
        default: Option<String>,
    ) -> Self {
        Self {
            name: format!("field_value:{source_field}->{target_field}"),
            source_field,
            target_field,
            values,
            default,
        }
    }
}

impl FieldMap for FieldValueMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, source: &WorkItem, target: &mut WorkItem) -> Result<(), FieldMapError> {
        let Some(value) = source.field(&self.source_field) else {
            return Ok(());
        };
        let mapped = self.values.get(value.as_str()).or(self.default.as_ref());
        if let Some(mapped) = mapped {
            target.set_field(self.target_field.clone(), mapped.clone());
        }
        Ok(())
    }
}

// =============================================================================
// FIELD BLANK
// =============================================================================

/// Removes `target_field` from the target.
#[derive(Debug, Clone)]
pub struct FieldBlankMap {
    name: String,
    target_field: String,
}

impl FieldBlankMap {
    /// Create a blanking rule.
    #[must_use]
    pub fn new(target_field: String) -> Self {
        Self {
            name: format!("field_blank:{target_field}"),
            target_field,
        }
    }
}

impl FieldMap for FieldBlankMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, _source: &WorkItem, target: &mut WorkItem) -> Result<(), FieldMapError> {
        target.remove_field(&self.target_field);
        Ok(())
    }
}

// =============================================================================
// FIELD TO TAG
// =============================================================================

/// Appends `"<field>: <value>"` to the target's tags.
///
/// Empty values and tags already present are skipped.
#[derive(Debug, Clone)]
pub struct FieldToTagMap {
    name: String,
    source_field: String,
}

impl FieldToTagMap {
    /// Create a tagging rule.
    #[must_use]
    pub fn new(source_field: String) -> Self {
        Self {
            name: format!("field_to_tag:{source_field}"),
            source_field,
        }
    }
}

impl FieldMap for FieldToTagMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, source: &WorkItem, target: &mut WorkItem) -> Result<(), FieldMapError> {
        let Some(value) = source
            .field(&self.source_field)
            .filter(|v| !v.as_str().trim().is_empty())
        else {
            return Ok(());
        };

        let tag = format!("{}: {}", self.source_field, value.as_str());
        let mut tags: Vec<String> = target
            .field(TAGS_FIELD)
            .map(|v| {
                v.as_str()
                    .split(';')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        if !tags.contains(&tag) {
            tags.push(tag);
            target.set_field(TAGS_FIELD, tags.join("; "));
        }
        Ok(())
    }
}

// =============================================================================
// TYPE MAPPER
// =============================================================================

/// Materializes a source type under a different name.
#[derive(Debug, Clone)]
pub struct RenameTypeMapper {
    target: String,
}

impl RenameTypeMapper {
    /// Map every item of the registered type to `target`.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl TypeDefinitionMapper for RenameTypeMapper {
    fn target_type_name(&self, _source_type: &str) -> String {
        self.target.clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================
