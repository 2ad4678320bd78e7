//! Record type schemas
//!
//! Persisted record types keep their schema as a free-form JSON document.
//! Before anything reads or mutates fields the document is normalized into
//! a [`RecordTypeSchema`], which guarantees a `fields` list and carries any
//! other top-level keys through untouched.

use crate::ids::{ChangeId, ProjectId, RecordTypeId, SnapshotId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use strata_graph::{FieldDefinitionNode, RecordTypeNode};

/// Field type used when a definition omits one
pub const DEFAULT_FIELD_TYPE: &str = "string";

fn default_field_type() -> String {
    DEFAULT_FIELD_TYPE.to_string()
}

/// Errors raised while normalizing a stored schema document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Schema is neither null nor an object
    #[error("schema must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// `fields` is present but not an array
    #[error("schema `fields` must be an array")]
    FieldsNotArray,

    /// A field entry failed to parse
    #[error("invalid field at index {index}: {reason}")]
    InvalidField { index: usize, reason: String },
}

/// One field of a record type schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    /// Any additional attributes (label, choices, default, ...)
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl FieldDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            required: false,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// Field definition as supplied by a `set_field` / `add_field` payload
///
/// Every property is optional: on insert missing ones fall back to defaults,
/// on upsert they leave the existing value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinitionInput {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl FieldDefinitionInput {
    #[must_use]
    pub fn typed(field_type: impl Into<String>) -> Self {
        Self {
            field_type: Some(field_type.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// Build a fresh definition named `name`
    #[must_use]
    pub fn to_definition(&self, name: &str) -> FieldDefinition {
        FieldDefinition {
            name: name.to_string(),
            field_type: self.field_type.clone().unwrap_or_else(default_field_type),
            required: self.required.unwrap_or(false),
            attributes: self.attributes.clone(),
        }
    }

    /// Overlay this input on an existing definition
    #[must_use]
    pub fn merge_into(&self, existing: &FieldDefinition) -> FieldDefinition {
        let mut merged = existing.clone();
        if let Some(ty) = &self.field_type {
            merged.field_type.clone_from(ty);
        }
        if let Some(required) = self.required {
            merged.required = required;
        }
        merged
            .attributes
            .extend(self.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Normalized record type schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordTypeSchema {
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Other top-level schema keys, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RecordTypeSchema {
    /// Schema with the given fields and nothing else
    #[must_use]
    pub fn with_fields(fields: Vec<FieldDefinition>) -> Self {
        Self {
            fields,
            extra: BTreeMap::new(),
        }
    }

    /// Normalize a stored schema document
    ///
    /// `null`, a missing `fields` key and `"fields": null` all produce an
    /// empty field list.
    ///
    /// # Errors
    /// Returns [`SchemaError`] when the document or one of its fields has
    /// the wrong shape.
    pub fn normalize(value: &Value) -> Result<Self, SchemaError> {
        let object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(object) => object,
            Value::Bool(_) => return Err(SchemaError::NotAnObject("boolean")),
            Value::Number(_) => return Err(SchemaError::NotAnObject("number")),
            Value::String(_) => return Err(SchemaError::NotAnObject("string")),
            Value::Array(_) => return Err(SchemaError::NotAnObject("array")),
        };

        let fields = match object.get("fields") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    serde_json::from_value::<FieldDefinition>(item.clone()).map_err(|e| {
                        SchemaError::InvalidField {
                            index,
                            reason: e.to_string(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(SchemaError::FieldsNotArray),
        };

        let extra = object
            .iter()
            .filter(|(key, _)| key.as_str() != "fields")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self { fields, extra })
    }

    /// Render back into a JSON document
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object: Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let fields = self
            .fields
            .iter()
            .map(|f| serde_json::to_value(f).unwrap_or(Value::Null))
            .collect();
        object.insert("fields".to_string(), Value::Array(fields));
        Value::Object(object)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Field names in schema order
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Names of required fields
    #[must_use]
    pub fn required_field_names(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Flatten into graph field nodes for `record_type_key`
    #[must_use]
    pub fn to_field_nodes(&self, record_type_key: &str) -> Vec<FieldDefinitionNode> {
        self.fields
            .iter()
            .map(|f| FieldDefinitionNode {
                record_type_key: record_type_key.to_string(),
                name: f.name.clone(),
                field_type: f.field_type.clone(),
                required: f.required,
            })
            .collect()
    }
}

/// A persisted record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordType {
    pub id: RecordTypeId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub key: String,
    pub version: u32,
    #[serde(default)]
    pub base_type: Option<String>,
    pub status: String,
    /// Raw stored schema document
    #[serde(default)]
    pub schema: Value,
    pub updated_at: DateTime<Utc>,
}

impl RecordType {
    /// Normalize the stored schema
    ///
    /// # Errors
    /// See [`RecordTypeSchema::normalize`].
    pub fn normalized_schema(&self) -> Result<RecordTypeSchema, SchemaError> {
        RecordTypeSchema::normalize(&self.schema)
    }

    /// Graph-layer view of this record type
    #[must_use]
    pub fn to_graph_node(&self) -> RecordTypeNode {
        RecordTypeNode {
            id: self.id.to_string(),
            tenant_id: self.tenant_id.to_string(),
            key: self.key.clone(),
            version: self.version,
            base_type: self.base_type.clone(),
            status: self.status.clone(),
            project_id: self.project_id.to_string(),
        }
    }
}

/// First-touch copy of a record type schema within one change
///
/// At most one exists per (change, record type key) and it is never
/// updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTypeSnapshot {
    pub id: SnapshotId,
    pub tenant_id: TenantId,
    pub change_id: ChangeId,
    pub record_type_key: String,
    pub schema: RecordTypeSchema,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_null_and_missing_fields() {
        assert!(RecordTypeSchema::normalize(&Value::Null).unwrap().fields.is_empty());
        let schema = RecordTypeSchema::normalize(&json!({ "label": "Task" })).unwrap();
        assert!(schema.fields.is_empty());
        assert_eq!(schema.extra["label"], "Task");
    }

    #[test]
    fn normalize_rejects_bad_shapes() {
        assert_eq!(
            RecordTypeSchema::normalize(&json!([1, 2])),
            Err(SchemaError::NotAnObject("array"))
        );
        assert_eq!(
            RecordTypeSchema::normalize(&json!({ "fields": "nope" })),
            Err(SchemaError::FieldsNotArray)
        );
        assert!(matches!(
            RecordTypeSchema::normalize(&json!({ "fields": [{ "type": "string" }] })),
            Err(SchemaError::InvalidField { index: 0, .. })
        ));
    }

    #[test]
    fn schema_value_keeps_attributes_and_extra_keys() {
        let raw = json!({
            "label": "Task",
            "fields": [
                { "name": "title", "type": "string", "required": true, "maxLength": 80 },
                { "name": "status" }
            ]
        });
        let schema = RecordTypeSchema::normalize(&raw).unwrap();

        assert_eq!(schema.field_names(), vec!["title", "status"]);
        assert_eq!(schema.field("status").unwrap().field_type, DEFAULT_FIELD_TYPE);
        assert_eq!(schema.required_field_names().len(), 1);

        let rendered = schema.to_value();
        assert_eq!(rendered["label"], "Task");
        assert_eq!(rendered["fields"][0]["maxLength"], 80);
        assert_eq!(RecordTypeSchema::normalize(&rendered).unwrap(), schema);
    }

    #[test]
    fn input_merge_only_overrides_supplied_properties() {
        let existing = FieldDefinition::new("state", "choice").required(true);
        let merged = FieldDefinitionInput::default()
            .with_required(false)
            .merge_into(&existing);

        assert_eq!(merged.field_type, "choice");
        assert!(!merged.required);
    }
}
