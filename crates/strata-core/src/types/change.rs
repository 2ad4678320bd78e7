//! Change containers, targets and patch operations

use super::schema::{FieldDefinitionInput, RecordTypeSchema};
use crate::ids::{ChangeId, EnvironmentId, PatchOpId, ProjectId, TargetId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Change lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Draft,
    Implementing,
    WorkspaceRunning,
    Validating,
    ValidationFailed,
    Ready,
    Merged,
}

impl ChangeStatus {
    /// Every state, in lifecycle order
    pub const ALL: [ChangeStatus; 7] = [
        ChangeStatus::Draft,
        ChangeStatus::Implementing,
        ChangeStatus::WorkspaceRunning,
        ChangeStatus::Validating,
        ChangeStatus::ValidationFailed,
        ChangeStatus::Ready,
        ChangeStatus::Merged,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeStatus::Draft => "draft",
            ChangeStatus::Implementing => "implementing",
            ChangeStatus::WorkspaceRunning => "workspace_running",
            ChangeStatus::Validating => "validating",
            ChangeStatus::ValidationFailed => "validation_failed",
            ChangeStatus::Ready => "ready",
            ChangeStatus::Merged => "merged",
        }
    }

    /// Patch ops and targets may only be added in these states
    #[inline]
    #[must_use]
    pub fn accepts_patch_ops(self) -> bool {
        matches!(self, ChangeStatus::Draft | ChangeStatus::ValidationFailed)
    }

    /// The single state from which a batch may execute
    #[inline]
    #[must_use]
    pub fn permits_execution(self) -> bool {
        matches!(self, ChangeStatus::Ready)
    }

    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ChangeStatus::Merged)
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit-of-work container for proposed mutations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: ChangeId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub title: String,
    pub status: ChangeStatus,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub module_path: Option<String>,
    #[serde(default)]
    pub environment_id: Option<EnvironmentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// New draft change
    #[must_use]
    pub fn draft(tenant_id: TenantId, project_id: ProjectId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ChangeId::new(),
            tenant_id,
            project_id,
            title: title.into(),
            status: ChangeStatus::Draft,
            module_id: None,
            module_path: None,
            environment_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Kinds of artifact a change can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    RecordType,
    File,
    Form,
    Workflow,
    Rule,
    Script,
}

impl TargetType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::RecordType => "record_type",
            TargetType::File => "file",
            TargetType::Form => "form",
            TargetType::Workflow => "workflow",
            TargetType::Rule => "rule",
            TargetType::Script => "script",
        }
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selector key naming the record type of a `record_type` target
pub const RECORD_TYPE_KEY_SELECTOR: &str = "recordTypeKey";

/// Something a change intends to modify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTarget {
    pub id: TargetId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub change_id: ChangeId,
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub selector: Value,
}

impl ChangeTarget {
    /// Target for a record type schema
    #[must_use]
    pub fn record_type(change: &ChangeRecord, key: impl Into<String>) -> Self {
        Self {
            id: TargetId::new(),
            tenant_id: change.tenant_id,
            project_id: change.project_id,
            change_id: change.id,
            target_type: TargetType::RecordType,
            selector: Self::record_type_selector(key),
        }
    }

    /// Selector naming a record type key
    #[must_use]
    pub fn record_type_selector(key: impl Into<String>) -> Value {
        let mut selector = serde_json::Map::new();
        selector.insert(RECORD_TYPE_KEY_SELECTOR.to_string(), Value::String(key.into()));
        Value::Object(selector)
    }

    /// Record type key named by the selector, if any
    #[must_use]
    pub fn record_type_key(&self) -> Option<&str> {
        self.selector
            .get(RECORD_TYPE_KEY_SELECTOR)
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
    }
}

/// Schema mutation carried by a patch op, tagged by `opType`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "opType", content = "payload", rename_all = "snake_case")]
pub enum PatchOperation {
    /// Upsert a field by name
    SetField {
        field: String,
        #[serde(default)]
        definition: FieldDefinitionInput,
    },
    /// Insert a new field
    AddField {
        field: String,
        #[serde(default)]
        definition: FieldDefinitionInput,
    },
    /// Delete a field
    RemoveField { field: String },
    /// Rename a field in place
    #[serde(rename_all = "camelCase")]
    RenameField { old_name: String, new_name: String },
}

impl PatchOperation {
    #[must_use]
    pub fn op_type(&self) -> &'static str {
        match self {
            PatchOperation::SetField { .. } => "set_field",
            PatchOperation::AddField { .. } => "add_field",
            PatchOperation::RemoveField { .. } => "remove_field",
            PatchOperation::RenameField { .. } => "rename_field",
        }
    }

    /// Target type this operation must be applied to
    #[must_use]
    pub fn required_target_type(&self) -> TargetType {
        match self {
            PatchOperation::SetField { .. }
            | PatchOperation::AddField { .. }
            | PatchOperation::RemoveField { .. }
            | PatchOperation::RenameField { .. } => TargetType::RecordType,
        }
    }

    /// Whether the operation mutates a record type's field list
    #[must_use]
    pub fn is_field_mutation(&self) -> bool {
        self.required_target_type() == TargetType::RecordType
    }
}

/// One proposed mutation, scoped to a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePatchOp {
    pub id: PatchOpId,
    pub tenant_id: TenantId,
    pub change_id: ChangeId,
    pub target_id: TargetId,
    pub operation: PatchOperation,
    /// Schema immediately before this op ran
    #[serde(default)]
    pub previous_snapshot: Option<RecordTypeSchema>,
    /// Set exactly once, when the op is applied
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ChangePatchOp {
    #[must_use]
    pub fn new(target: &ChangeTarget, operation: PatchOperation) -> Self {
        Self {
            id: PatchOpId::new(),
            tenant_id: target.tenant_id,
            change_id: target.change_id,
            target_id: target.id,
            operation,
            previous_snapshot: None,
            executed_at: None,
            created_at: Utc::now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.executed_at.is_some()
    }
}
