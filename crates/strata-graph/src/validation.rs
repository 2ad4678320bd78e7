//! Graph validation service
//!
//! Pure, stateless checks over a [`GraphSnapshot`]. Every check returns all
//! of the problems it finds; [`GraphValidationService::validate`] runs them
//! in a fixed order and concatenates the results:
//!
//! 1. orphan baseType
//! 2. baseType cycle
//! 3. field uniqueness
//! 4. binding targets
//! 5. cross-project baseType
//!
//! Nodes are visited in key order so the output is deterministic for a
//! given snapshot regardless of how its vectors were ordered.

use crate::error::{GraphValidationError, ValidationCode};
use crate::model::GraphSnapshot;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Stateless validator over graph snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphValidationService;

impl GraphValidationService {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run every check, no early exit
    #[must_use]
    pub fn validate(&self, snapshot: &GraphSnapshot) -> Vec<GraphValidationError> {
        let mut errors = Self::check_orphan_base_types(snapshot);
        errors.extend(Self::check_base_type_cycles(snapshot));
        errors.extend(Self::check_field_uniqueness(snapshot));
        errors.extend(Self::check_binding_targets(snapshot));
        errors.extend(Self::check_cross_project_base_types(snapshot));
        errors
    }

    /// baseType must name an existing record type
    #[must_use]
    pub fn check_orphan_base_types(snapshot: &GraphSnapshot) -> Vec<GraphValidationError> {
        let index = snapshot.node_index();
        sorted_nodes(snapshot)
            .into_iter()
            .filter_map(|node| {
                let base = node.base_type.as_deref()?;
                if index.contains_key(base) {
                    return None;
                }
                Some(
                    GraphValidationError::new(
                        ValidationCode::OrphanBaseType,
                        format!(
                            "Record type '{}' references missing baseType '{}'",
                            node.key, base
                        ),
                    )
                    .with_node(&node.key)
                    .with_base_type(base)
                    .with_record_type_id(&node.id),
                )
            })
            .collect()
    }

    /// Coloring DFS over the key → parent-key map
    ///
    /// Every record type that sits on a loop is reported once. Nodes that
    /// merely lead into a loop, or share an ancestor with other nodes, are
    /// not reported.
    #[must_use]
    pub fn check_base_type_cycles(snapshot: &GraphSnapshot) -> Vec<GraphValidationError> {
        let index = snapshot.node_index();
        let parents: BTreeMap<&str, &str> = index
            .iter()
            .filter_map(|(key, node)| {
                let base = node.base_type.as_deref()?;
                index.contains_key(base).then_some((*key, base))
            })
            .collect();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut errors = Vec::new();

        let mut keys: Vec<&str> = index.keys().copied().collect();
        keys.sort_unstable();

        for start in keys {
            if visited.contains(start) {
                continue;
            }

            // Active recursion stack; single inheritance makes it a path.
            let mut stack: Vec<&str> = Vec::new();
            let mut on_stack: HashSet<&str> = HashSet::new();
            let mut cursor = Some(start);

            while let Some(key) = cursor {
                if visited.contains(key) {
                    break;
                }
                if on_stack.contains(key) {
                    let entry = stack.iter().position(|k| *k == key).unwrap_or(0);
                    errors.extend(cycle_errors(&stack[entry..], &parents, &index));
                    break;
                }
                on_stack.insert(key);
                stack.push(key);
                cursor = parents.get(key).copied();
            }

            visited.extend(stack);
        }

        errors
    }

    /// Field names must be unique per record type
    #[must_use]
    pub fn check_field_uniqueness(snapshot: &GraphSnapshot) -> Vec<GraphValidationError> {
        let index = snapshot.node_index();
        let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        for field in &snapshot.fields {
            *counts
                .entry((field.record_type_key.as_str(), field.name.as_str()))
                .or_default() += 1;
        }

        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|((key, name), count)| {
                let mut err = GraphValidationError::new(
                    ValidationCode::DuplicateField,
                    format!("Record type '{key}' defines field '{name}' {count} times"),
                )
                .with_node(key)
                .with_field(name)
                .with_details(json!({ "occurrences": count }));
                if let Some(node) = index.get(key) {
                    err = err.with_record_type_id(&node.id);
                }
                err
            })
            .collect()
    }

    /// Every binding must target an existing record type key
    #[must_use]
    pub fn check_binding_targets(snapshot: &GraphSnapshot) -> Vec<GraphValidationError> {
        let index = snapshot.node_index();
        snapshot
            .bindings
            .iter()
            .filter(|(_, binding)| !index.contains_key(binding.record_type_key.as_str()))
            .map(|(kind, binding)| {
                GraphValidationError::new(
                    ValidationCode::BindingTargetMissing,
                    format!(
                        "{} binding '{}' targets missing record type '{}'",
                        kind, binding.id, binding.record_type_key
                    ),
                )
                .with_node(&binding.record_type_key)
                .with_details(json!({ "bindingKind": kind.as_str(), "bindingId": binding.id }))
            })
            .collect()
    }

    /// A resolvable baseType must live in the same project
    ///
    /// Unresolved baseTypes are left to the orphan check.
    #[must_use]
    pub fn check_cross_project_base_types(snapshot: &GraphSnapshot) -> Vec<GraphValidationError> {
        let index = snapshot.node_index();
        sorted_nodes(snapshot)
            .into_iter()
            .filter_map(|node| {
                let base_key = node.base_type.as_deref()?;
                let base = index.get(base_key)?;
                if base.project_id == node.project_id {
                    return None;
                }
                Some(
                    GraphValidationError::new(
                        ValidationCode::BaseTypeCrossProject,
                        format!(
                            "Record type '{}' (project {}) inherits from '{}' in project {}",
                            node.key, node.project_id, base.key, base.project_id
                        ),
                    )
                    .with_node(&node.key)
                    .with_base_type(base_key)
                    .with_record_type_id(&node.id)
                    .with_details(json!({
                        "projectId": node.project_id,
                        "baseTypeProjectId": base.project_id,
                    })),
                )
            })
            .collect()
    }
}

/// Validate a snapshot with every check
#[must_use]
pub fn validate_graph_snapshot(snapshot: &GraphSnapshot) -> Vec<GraphValidationError> {
    GraphValidationService::new().validate(snapshot)
}

fn sorted_nodes(snapshot: &GraphSnapshot) -> Vec<&crate::model::RecordTypeNode> {
    let mut nodes: Vec<_> = snapshot.nodes.iter().collect();
    nodes.sort_by(|a, b| a.key.cmp(&b.key));
    nodes
}

fn cycle_errors(
    members: &[&str],
    parents: &BTreeMap<&str, &str>,
    index: &HashMap<&str, &crate::model::RecordTypeNode>,
) -> Vec<GraphValidationError> {
    let mut path: Vec<&str> = members.to_vec();
    if let Some(first) = members.first() {
        path.push(first);
    }
    let rendered = path.join(" -> ");

    members
        .iter()
        .map(|key| {
            let mut err = GraphValidationError::new(
                ValidationCode::BaseTypeCycle,
                format!("Record type '{key}' is part of a baseType cycle: {rendered}"),
            )
            .with_node(*key)
            .with_details(json!({ "cycle": members }));
            if let Some(base) = parents.get(key) {
                err = err.with_base_type(*base);
            }
            if let Some(node) = index.get(key) {
                err = err.with_record_type_id(&node.id);
            }
            err
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Binding, FieldDefinitionNode, GraphBindings, RecordTypeNode, SnapshotBuilder,
    };

    fn node(key: &str, base: Option<&str>) -> RecordTypeNode {
        node_in(key, base, "p1")
    }

    fn node_in(key: &str, base: Option<&str>, project: &str) -> RecordTypeNode {
        RecordTypeNode {
            id: format!("id-{key}"),
            tenant_id: "t1".to_string(),
            key: key.to_string(),
            version: 1,
            base_type: base.map(str::to_string),
            status: "active".to_string(),
            project_id: project.to_string(),
        }
    }

    fn field(key: &str, name: &str) -> FieldDefinitionNode {
        FieldDefinitionNode {
            record_type_key: key.to_string(),
            name: name.to_string(),
            field_type: "string".to_string(),
            required: false,
        }
    }

    fn codes(errors: &[GraphValidationError]) -> Vec<ValidationCode> {
        errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn clean_graph_has_no_errors() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node("task", None), [field("task", "title")])
            .record_type(node("incident", Some("task")), [field("incident", "severity")])
            .build();

        assert!(validate_graph_snapshot(&snapshot).is_empty());
    }

    #[test]
    fn two_node_cycle_detected() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node("a", Some("b")), [])
            .record_type(node("b", Some("a")), [])
            .build();

        let errors = GraphValidationService::check_base_type_cycles(&snapshot);
        assert_eq!(codes(&errors), vec![ValidationCode::BaseTypeCycle; 2]);
        assert_eq!(errors[0].node_key.as_deref(), Some("a"));
        assert_eq!(errors[0].base_type_key.as_deref(), Some("b"));
    }

    #[test]
    fn three_node_cycle_detected() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node("a", Some("b")), [])
            .record_type(node("b", Some("c")), [])
            .record_type(node("c", Some("a")), [])
            .build();

        let errors = validate_graph_snapshot(&snapshot);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.code == ValidationCode::BaseTypeCycle));
        assert!(errors[0].message.contains("a -> b -> c -> a"));
    }

    #[test]
    fn self_loop_detected() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node("a", Some("a")), [])
            .build();

        let errors = validate_graph_snapshot(&snapshot);
        assert_eq!(codes(&errors), vec![ValidationCode::BaseTypeCycle]);
    }

    #[test]
    fn tail_into_cycle_reports_only_members() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node("a", Some("b")), [])
            .record_type(node("b", Some("a")), [])
            .record_type(node("tail", Some("a")), [])
            .build();

        let errors = GraphValidationService::check_base_type_cycles(&snapshot);
        let keys: Vec<_> = errors.iter().filter_map(|e| e.node_key.as_deref()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn shared_ancestor_is_not_a_cycle() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node("root", None), [])
            .record_type(node("mid", Some("root")), [])
            .record_type(node("left", Some("mid")), [])
            .record_type(node("right", Some("mid")), [])
            .record_type(node("other", Some("root")), [])
            .build();

        assert!(GraphValidationService::check_base_type_cycles(&snapshot).is_empty());
    }

    #[test]
    fn orphan_reported_and_cross_project_skipped() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node_in("incident", Some("ghost"), "p1"), [])
            .build();

        let errors = validate_graph_snapshot(&snapshot);
        assert_eq!(codes(&errors), vec![ValidationCode::OrphanBaseType]);
        assert_eq!(errors[0].base_type_key.as_deref(), Some("ghost"));
    }

    #[test]
    fn cross_project_base_type_reported() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node_in("task", None, "p1"), [])
            .record_type(node_in("incident", Some("task"), "p2"), [])
            .build();

        let errors = validate_graph_snapshot(&snapshot);
        assert_eq!(codes(&errors), vec![ValidationCode::BaseTypeCrossProject]);
        assert_eq!(errors[0].node_key.as_deref(), Some("incident"));
    }

    #[test]
    fn duplicate_field_reported_once_per_name() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(
                node("task", None),
                [field("task", "title"), field("task", "title"), field("task", "status")],
            )
            .build();

        let errors = validate_graph_snapshot(&snapshot);
        assert_eq!(codes(&errors), vec![ValidationCode::DuplicateField]);
        assert_eq!(errors[0].field.as_deref(), Some("title"));
        assert_eq!(errors[0].record_type_id.as_deref(), Some("id-task"));
    }

    #[test]
    fn missing_binding_target_reported() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node("task", None), [])
            .bindings(GraphBindings {
                workflows: vec![Binding::new("wf1", "task"), Binding::new("wf2", "gone")],
                ..GraphBindings::default()
            })
            .build();

        let errors = validate_graph_snapshot(&snapshot);
        assert_eq!(codes(&errors), vec![ValidationCode::BindingTargetMissing]);
        assert_eq!(errors[0].details.as_ref().unwrap()["bindingId"], "wf2");
    }

    #[test]
    fn composite_reports_every_problem_in_order() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node_in("a", Some("b"), "p1"), [field("a", "x"), field("a", "x")])
            .record_type(node_in("b", Some("a"), "p1"), [])
            .record_type(node_in("c", Some("missing"), "p1"), [])
            .record_type(node_in("d", Some("a"), "p2"), [])
            .bindings(GraphBindings {
                slas: vec![Binding::new("sla1", "nope")],
                ..GraphBindings::default()
            })
            .build();

        let errors = validate_graph_snapshot(&snapshot);
        assert_eq!(
            codes(&errors),
            vec![
                ValidationCode::OrphanBaseType,
                ValidationCode::BaseTypeCycle,
                ValidationCode::BaseTypeCycle,
                ValidationCode::DuplicateField,
                ValidationCode::BindingTargetMissing,
                ValidationCode::BaseTypeCrossProject,
            ]
        );
    }
}
