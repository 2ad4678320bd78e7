//! Structured graph validation errors
//!
//! Validators never stop at the first problem: a projected graph can break
//! several invariants at once, so every check returns a list of
//! [`GraphValidationError`] values that callers concatenate.

use serde::{Deserialize, Serialize};

/// Machine-readable validation error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// baseType names a key that does not exist
    OrphanBaseType,
    /// baseType chain loops back on itself
    BaseTypeCycle,
    /// Two fields with the same name on one record type
    DuplicateField,
    /// A binding targets a record type key that does not exist
    BindingTargetMissing,
    /// baseType resolves to a record type of another project
    BaseTypeCrossProject,
}

impl ValidationCode {
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationCode::OrphanBaseType => "ORPHAN_BASE_TYPE",
            ValidationCode::BaseTypeCycle => "BASE_TYPE_CYCLE",
            ValidationCode::DuplicateField => "DUPLICATE_FIELD",
            ValidationCode::BindingTargetMissing => "BINDING_TARGET_MISSING",
            ValidationCode::BaseTypeCrossProject => "BASE_TYPE_CROSS_PROJECT",
        }
    }
}

impl std::fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One violated graph invariant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct GraphValidationError {
    pub code: ValidationCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl GraphValidationError {
    /// Create error with code and message only
    #[must_use]
    pub fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            node_key: None,
            base_type_key: None,
            record_type_id: None,
            field: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_node(mut self, key: impl Into<String>) -> Self {
        self.node_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_base_type(mut self, key: impl Into<String>) -> Self {
        self.base_type_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_record_type_id(mut self, id: impl Into<String>) -> Self {
        self.record_type_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
