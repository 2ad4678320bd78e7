//! Pure schema transforms
//!
//! One function per [`PatchOperation`] variant. Every transform takes the
//! schema by reference and returns a new value; the input is never
//! mutated, which lets the executor keep the schema that preceded each op.

use std::collections::BTreeSet;
use strata_core::{FieldDefinitionInput, PatchOperation, RecordTypeSchema};

/// Why a single op cannot be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("field `{field}` already exists on `{record_type}`")]
    DuplicateField { record_type: String, field: String },

    #[error("field `{field}` does not exist on `{record_type}`")]
    FieldNotFound { record_type: String, field: String },

    /// Field is required by the immediate baseType
    #[error("field `{field}` on `{record_type}` is protected by base type `{base_type}`")]
    ProtectedField {
        record_type: String,
        field: String,
        base_type: String,
    },
}

/// Fields a record type may not drop or relax
///
/// Holds the names of required fields on the record type's immediate
/// baseType only; grandparents are not consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedFields {
    pub record_type: String,
    pub base_type: Option<String>,
    pub names: BTreeSet<String>,
}

impl ProtectedFields {
    /// No protection (record type without a resolvable baseType)
    #[must_use]
    pub fn none(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_base(
        record_type: impl Into<String>,
        base_type: impl Into<String>,
        names: BTreeSet<String>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            base_type: Some(base_type.into()),
            names,
        }
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.names.contains(field)
    }

    fn guard(&self, field: &str) -> Result<(), TransformError> {
        if self.contains(field) {
            return Err(TransformError::ProtectedField {
                record_type: self.record_type.clone(),
                field: field.to_string(),
                base_type: self.base_type.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn not_found(&self, field: &str) -> TransformError {
        TransformError::FieldNotFound {
            record_type: self.record_type.clone(),
            field: field.to_string(),
        }
    }

    fn duplicate(&self, field: &str) -> TransformError {
        TransformError::DuplicateField {
            record_type: self.record_type.clone(),
            field: field.to_string(),
        }
    }
}

/// Apply one operation
///
/// # Errors
/// Returns [`TransformError`] when the operation conflicts with the schema
/// or with the protected fields.
pub fn apply(
    schema: &RecordTypeSchema,
    operation: &PatchOperation,
    protected: &ProtectedFields,
) -> Result<RecordTypeSchema, TransformError> {
    match operation {
        PatchOperation::SetField { field, definition } => {
            set_field(schema, field, definition, protected)
        }
        PatchOperation::AddField { field, definition } => {
            add_field(schema, field, definition, protected)
        }
        PatchOperation::RemoveField { field } => remove_field(schema, field, protected),
        PatchOperation::RenameField { old_name, new_name } => {
            rename_field(schema, old_name, new_name, protected)
        }
    }
}

/// Upsert by name, keeping the position of an existing field
///
/// # Errors
/// Rejects relaxing a protected field to `required: false`.
pub fn set_field(
    schema: &RecordTypeSchema,
    field: &str,
    definition: &FieldDefinitionInput,
    protected: &ProtectedFields,
) -> Result<RecordTypeSchema, TransformError> {
    if definition.required == Some(false) {
        protected.guard(field)?;
    }

    let mut next = schema.clone();
    match next.fields.iter_mut().find(|f| f.name == field) {
        Some(existing) => *existing = definition.merge_into(existing),
        None => next.fields.push(definition.to_definition(field)),
    }
    Ok(next)
}

/// Append a new field
///
/// # Errors
/// Rejects a name that already exists.
pub fn add_field(
    schema: &RecordTypeSchema,
    field: &str,
    definition: &FieldDefinitionInput,
    protected: &ProtectedFields,
) -> Result<RecordTypeSchema, TransformError> {
    if schema.has_field(field) {
        return Err(protected.duplicate(field));
    }
    let mut next = schema.clone();
    next.fields.push(definition.to_definition(field));
    Ok(next)
}

/// # Errors
/// Rejects an absent or protected field.
pub fn remove_field(
    schema: &RecordTypeSchema,
    field: &str,
    protected: &ProtectedFields,
) -> Result<RecordTypeSchema, TransformError> {
    if !schema.has_field(field) {
        return Err(protected.not_found(field));
    }
    protected.guard(field)?;

    let mut next = schema.clone();
    next.fields.retain(|f| f.name != field);
    Ok(next)
}

/// # Errors
/// Rejects an absent or protected old name and an existing new name.
pub fn rename_field(
    schema: &RecordTypeSchema,
    old_name: &str,
    new_name: &str,
    protected: &ProtectedFields,
) -> Result<RecordTypeSchema, TransformError> {
    if !schema.has_field(old_name) {
        return Err(protected.not_found(old_name));
    }
    if schema.has_field(new_name) {
        return Err(protected.duplicate(new_name));
    }
    protected.guard(old_name)?;

    let mut next = schema.clone();
    if let Some(f) = next.fields.iter_mut().find(|f| f.name == old_name) {
        f.name = new_name.to_string();
    }
    Ok(next)
}
