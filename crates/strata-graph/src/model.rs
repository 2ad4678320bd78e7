//! Graph snapshot model
//!
//! A [`GraphSnapshot`] is an immutable, point-in-time view of every record
//! type of one tenant: nodes, their flattened field definitions, the
//! `inherits` edges between them and the bindings that point at them.
//!
//! Snapshots are pure data. They are built either from persisted record
//! types (see [`SnapshotBuilder`]) or deserialized from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Relationship label carried by every baseType edge
pub const INHERITS: &str = "inherits";

/// A record type as seen by the graph layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTypeNode {
    /// Persistent record type id
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Tenant-unique key
    pub key: String,
    /// Schema version
    #[serde(default)]
    pub version: u32,
    /// Key of the parent record type, if any
    #[serde(default)]
    pub base_type: Option<String>,
    /// Lifecycle status label
    #[serde(default)]
    pub status: String,
    /// Owning project
    pub project_id: String,
}

/// One field of one record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinitionNode {
    pub record_type_key: String,
    pub name: String,
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
}

/// `from_type` inherits from `to_type`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDefinition {
    pub from_type: String,
    pub to_type: String,
    pub relationship: String,
}

impl EdgeDefinition {
    /// Create an `inherits` edge
    #[inline]
    #[must_use]
    pub fn inherits(from_type: impl Into<String>, to_type: impl Into<String>) -> Self {
        Self {
            from_type: from_type.into(),
            to_type: to_type.into(),
            relationship: INHERITS.to_string(),
        }
    }
}

/// Something (workflow, SLA, ...) bound to a record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub id: String,
    pub record_type_key: String,
}

impl Binding {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, record_type_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record_type_key: record_type_key.into(),
        }
    }
}

/// Binding categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingKind {
    Workflow,
    Sla,
    Assignment,
    ChangePolicy,
}

impl BindingKind {
    /// Stable label used in binding identities
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BindingKind::Workflow => "workflow",
            BindingKind::Sla => "sla",
            BindingKind::Assignment => "assignment",
            BindingKind::ChangePolicy => "change_policy",
        }
    }
}

impl std::fmt::Display for BindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All bindings of a tenant, grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphBindings {
    #[serde(default)]
    pub workflows: Vec<Binding>,
    #[serde(default)]
    pub slas: Vec<Binding>,
    #[serde(default)]
    pub assignments: Vec<Binding>,
    #[serde(default)]
    pub change_policies: Vec<Binding>,
}

impl GraphBindings {
    /// Iterate every binding together with its kind
    pub fn iter(&self) -> impl Iterator<Item = (BindingKind, &Binding)> {
        tagged(BindingKind::Workflow, &self.workflows)
            .chain(tagged(BindingKind::Sla, &self.slas))
            .chain(tagged(BindingKind::Assignment, &self.assignments))
            .chain(tagged(BindingKind::ChangePolicy, &self.change_policies))
    }

    /// Total binding count
    #[must_use]
    pub fn len(&self) -> usize {
        self.workflows.len() + self.slas.len() + self.assignments.len() + self.change_policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append all bindings of `other`
    pub fn extend(&mut self, other: GraphBindings) {
        self.workflows.extend(other.workflows);
        self.slas.extend(other.slas);
        self.assignments.extend(other.assignments);
        self.change_policies.extend(other.change_policies);
    }
}

fn tagged(kind: BindingKind, list: &[Binding]) -> impl Iterator<Item = (BindingKind, &Binding)> {
    list.iter().map(move |b| (kind, b))
}

/// Point-in-time view of a tenant's record-type graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub tenant_id: String,
    pub built_at: DateTime<Utc>,
    #[serde(default)]
    pub nodes: Vec<RecordTypeNode>,
    #[serde(default)]
    pub fields: Vec<FieldDefinitionNode>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    #[serde(default)]
    pub bindings: GraphBindings,
}

impl GraphSnapshot {
    /// Empty snapshot for a tenant
    #[must_use]
    pub fn empty(tenant_id: impl Into<String>) -> Self {
        SnapshotBuilder::new(tenant_id).build()
    }

    /// Look up a node by key
    #[must_use]
    pub fn node(&self, key: &str) -> Option<&RecordTypeNode> {
        self.nodes.iter().find(|n| n.key == key)
    }

    /// Fields belonging to one record type, in snapshot order
    pub fn fields_of<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a FieldDefinitionNode> {
        self.fields.iter().filter(move |f| f.record_type_key == key)
    }

    /// Key → node index
    #[must_use]
    pub fn node_index(&self) -> HashMap<&str, &RecordTypeNode> {
        let mut index = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            index.entry(node.key.as_str()).or_insert(node);
        }
        index
    }
}

/// Assembles a [`GraphSnapshot`] and derives its edges
///
/// Edges are recomputed within project scope: a node whose baseType
/// resolves to a record type of another project keeps its `base_type`
/// reference (so validation can flag it) but gets no edge.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    tenant_id: String,
    built_at: DateTime<Utc>,
    nodes: Vec<RecordTypeNode>,
    fields: Vec<FieldDefinitionNode>,
    bindings: GraphBindings,
}

impl SnapshotBuilder {
    #[must_use]
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            built_at: Utc::now(),
            nodes: Vec::new(),
            fields: Vec::new(),
            bindings: GraphBindings::default(),
        }
    }

    /// Pin the build timestamp
    #[must_use]
    pub fn built_at(mut self, at: DateTime<Utc>) -> Self {
        self.built_at = at;
        self
    }

    /// Add a node with its fields
    #[must_use]
    pub fn record_type(
        mut self,
        node: RecordTypeNode,
        fields: impl IntoIterator<Item = FieldDefinitionNode>,
    ) -> Self {
        self.push_record_type(node, fields);
        self
    }

    /// Non-consuming variant of [`Self::record_type`]
    pub fn push_record_type(
        &mut self,
        node: RecordTypeNode,
        fields: impl IntoIterator<Item = FieldDefinitionNode>,
    ) {
        self.nodes.push(node);
        self.fields.extend(fields);
    }

    #[must_use]
    pub fn bindings(mut self, bindings: GraphBindings) -> Self {
        self.bindings = bindings;
        self
    }

    #[must_use]
    pub fn build(self) -> GraphSnapshot {
        let edges = project_scoped_edges(&self.nodes);
        GraphSnapshot {
            tenant_id: self.tenant_id,
            built_at: self.built_at,
            nodes: self.nodes,
            fields: self.fields,
            edges,
            bindings: self.bindings,
        }
    }
}

fn project_scoped_edges(nodes: &[RecordTypeNode]) -> Vec<EdgeDefinition> {
    let mut by_key: HashMap<&str, &RecordTypeNode> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        by_key.entry(node.key.as_str()).or_insert(node);
    }

    nodes
        .iter()
        .filter_map(|node| {
            let base = node.base_type.as_deref()?;
            let parent = by_key.get(base)?;
            (parent.project_id == node.project_id)
                .then(|| EdgeDefinition::inherits(&node.key, &parent.key))
        })
        .collect()
}
