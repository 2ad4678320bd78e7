//! Graph diff service
//!
//! Compares two snapshots by record type key. All set differences are
//! computed over ordered maps so the result is deterministic and
//! independent of the ordering of nodes, fields or bindings in the input.

use crate::model::GraphSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Record type present only in `after`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedRecordType {
    pub key: String,
    pub field_count: usize,
}

/// Field whose type differs between snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTypeChange {
    pub field: String,
    pub before: String,
    pub after: String,
}

/// Field-level changes of a record type present in both snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedRecordType {
    pub key: String,
    pub field_adds: Vec<String>,
    pub field_removals: Vec<String>,
    pub field_type_changes: Vec<FieldTypeChange>,
}

impl ModifiedRecordType {
    fn is_empty(&self) -> bool {
        self.field_adds.is_empty()
            && self.field_removals.is_empty()
            && self.field_type_changes.is_empty()
    }
}

/// baseType moved (null ↔ value included)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseTypeChange {
    pub key: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Bindings keyed by `"<kind>:<bindingId>:<recordTypeKey>"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Full comparison of two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDiffResult {
    pub added_record_types: Vec<AddedRecordType>,
    pub removed_record_types: Vec<String>,
    pub modified_record_types: Vec<ModifiedRecordType>,
    pub base_type_changes: Vec<BaseTypeChange>,
    pub binding_changes: BindingChanges,
}

impl GraphDiffResult {
    /// True when the two snapshots are equivalent
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_record_types.is_empty()
            && self.removed_record_types.is_empty()
            && self.modified_record_types.is_empty()
            && self.base_type_changes.is_empty()
            && self.binding_changes.added.is_empty()
            && self.binding_changes.removed.is_empty()
    }

    /// Every record type key touched by the diff, sorted
    #[must_use]
    pub fn affected_record_keys(&self) -> Vec<String> {
        let keys: BTreeSet<&str> = self
            .added_record_types
            .iter()
            .map(|a| a.key.as_str())
            .chain(self.removed_record_types.iter().map(String::as_str))
            .chain(self.modified_record_types.iter().map(|m| m.key.as_str()))
            .chain(self.base_type_changes.iter().map(|c| c.key.as_str()))
            .collect();
        keys.into_iter().map(str::to_string).collect()
    }
}

/// Stateless snapshot comparator
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphDiffService;

impl GraphDiffService {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn diff(&self, before: &GraphSnapshot, after: &GraphSnapshot) -> GraphDiffResult {
        let before_types = field_types_by_key(before);
        let after_types = field_types_by_key(after);
        let before_bases = base_types_by_key(before);
        let after_bases = base_types_by_key(after);

        let added_record_types = after_types
            .iter()
            .filter(|(key, _)| !before_types.contains_key(*key))
            .map(|(key, fields)| AddedRecordType {
                key: (*key).to_string(),
                field_count: fields.len(),
            })
            .collect();

        let removed_record_types = before_types
            .keys()
            .filter(|key| !after_types.contains_key(*key))
            .map(|key| (*key).to_string())
            .collect();

        let modified_record_types = before_types
            .iter()
            .filter_map(|(key, old)| {
                let new = after_types.get(key)?;
                let modified = diff_fields(key, old, new);
                (!modified.is_empty()).then_some(modified)
            })
            .collect();

        let base_type_changes = before_bases
            .iter()
            .filter_map(|(key, old)| {
                let new = after_bases.get(key)?;
                (old != new).then(|| BaseTypeChange {
                    key: (*key).to_string(),
                    before: old.map(str::to_string),
                    after: new.map(str::to_string),
                })
            })
            .collect();

        let before_bindings = binding_identities(before);
        let after_bindings = binding_identities(after);

        GraphDiffResult {
            added_record_types,
            removed_record_types,
            modified_record_types,
            base_type_changes,
            binding_changes: BindingChanges {
                added: after_bindings.difference(&before_bindings).cloned().collect(),
                removed: before_bindings.difference(&after_bindings).cloned().collect(),
            },
        }
    }
}

/// Compare two snapshots
#[must_use]
pub fn diff_graph_snapshots(before: &GraphSnapshot, after: &GraphSnapshot) -> GraphDiffResult {
    GraphDiffService::new().diff(before, after)
}

type FieldTypes<'a> = BTreeMap<&'a str, &'a str>;

fn field_types_by_key(snapshot: &GraphSnapshot) -> BTreeMap<&str, FieldTypes<'_>> {
    let mut out: BTreeMap<&str, FieldTypes<'_>> = snapshot
        .nodes
        .iter()
        .map(|n| (n.key.as_str(), BTreeMap::new()))
        .collect();
    for field in &snapshot.fields {
        if let Some(fields) = out.get_mut(field.record_type_key.as_str()) {
            fields.insert(field.name.as_str(), field.field_type.as_str());
        }
    }
    out
}

fn base_types_by_key(snapshot: &GraphSnapshot) -> BTreeMap<&str, Option<&str>> {
    snapshot
        .nodes
        .iter()
        .map(|n| (n.key.as_str(), n.base_type.as_deref()))
        .collect()
}

fn binding_identities(snapshot: &GraphSnapshot) -> BTreeSet<String> {
    snapshot
        .bindings
        .iter()
        .map(|(kind, b)| format!("{}:{}:{}", kind.as_str(), b.id, b.record_type_key))
        .collect()
}

fn diff_fields(key: &str, old: &FieldTypes<'_>, new: &FieldTypes<'_>) -> ModifiedRecordType {
    let field_adds = new
        .keys()
        .filter(|name| !old.contains_key(*name))
        .map(|name| (*name).to_string())
        .collect();
    let field_removals = old
        .keys()
        .filter(|name| !new.contains_key(*name))
        .map(|name| (*name).to_string())
        .collect();
    let field_type_changes = old
        .iter()
        .filter_map(|(name, before)| {
            let after = new.get(name)?;
            (before != after).then(|| FieldTypeChange {
                field: (*name).to_string(),
                before: (*before).to_string(),
                after: (*after).to_string(),
            })
        })
        .collect();

    ModifiedRecordType {
        key: key.to_string(),
        field_adds,
        field_removals,
        field_type_changes,
    }
}
