//! Environment drift
//!
//! Installed packages are compared by key: present only in the source is
//! `added`, present in both with a different version or checksum is
//! `changed`, identical is `in_sync`. Packages only in the target are
//! left alone by a promotion and are not reported.
//!
//! The manifests of each side are also projected into graph snapshots and
//! diffed (target → source), which shows the schema-level effect a
//! promotion would have.

use std::collections::BTreeMap;
use strata_core::{EnvironmentDiff, PackageDrift, PackageInstall};
use strata_graph::{
    diff_graph_snapshots, FieldDefinitionNode, GraphSnapshot, RecordTypeNode, SnapshotBuilder,
};

/// Tenant and project label given to projected manifest nodes
pub const MANIFEST_SCOPE: &str = "packages";

/// Compare two sets of installed packages
#[must_use]
pub fn diff_environments(source: &[PackageInstall], target: &[PackageInstall]) -> EnvironmentDiff {
    let targets: BTreeMap<&str, &PackageInstall> =
        target.iter().map(|i| (i.package_key.as_str(), i)).collect();
    let sources: BTreeMap<&str, &PackageInstall> =
        source.iter().map(|i| (i.package_key.as_str(), i)).collect();

    let mut diff = EnvironmentDiff::default();
    for (key, install) in sources {
        let existing = targets.get(key).copied();
        let drift = PackageDrift {
            package_key: key.to_string(),
            source_version: install.version.clone(),
            source_checksum: install.checksum.clone(),
            target_version: existing.map(|t| t.version.clone()),
            target_checksum: existing.map(|t| t.checksum.clone()),
        };
        match existing {
            None => diff.added.push(drift),
            Some(t) if t.matches(install) => diff.in_sync.push(drift),
            Some(_) => diff.changed.push(drift),
        }
    }

    diff.graph_diff = diff_graph_snapshots(
        &project_manifests(MANIFEST_SCOPE, target),
        &project_manifests(MANIFEST_SCOPE, source),
    );
    diff
}

/// Graph snapshot of the record types contributed by `installs`
///
/// Every node is labelled with `scope` as both tenant and project, so
/// baseType edges between packages are kept. When two packages contribute
/// the same key, the package whose key sorts first wins.
#[must_use]
pub fn project_manifests(scope: &str, installs: &[PackageInstall]) -> GraphSnapshot {
    let mut ordered: Vec<&PackageInstall> = installs.iter().collect();
    ordered.sort_by(|a, b| a.package_key.cmp(&b.package_key));

    let mut builder = SnapshotBuilder::new(scope);
    let mut seen = std::collections::BTreeSet::new();
    let mut bindings = strata_graph::GraphBindings::default();

    for install in ordered {
        for record_type in &install.manifest.record_types {
            if !seen.insert(record_type.key.clone()) {
                continue;
            }
            let node = RecordTypeNode {
                id: format!("{}/{}", install.package_key, record_type.key),
                tenant_id: scope.to_string(),
                key: record_type.key.clone(),
                version: 1,
                base_type: record_type.base_type.clone(),
                status: "active".to_string(),
                project_id: scope.to_string(),
            };
            let fields = record_type.fields.iter().map(|f| FieldDefinitionNode {
                record_type_key: record_type.key.clone(),
                name: f.name.clone(),
                field_type: f.field_type.clone(),
                required: f.required,
            });
            builder.push_record_type(node, fields);
        }
        bindings.extend(install.manifest.bindings.clone());
    }

    builder.bindings(bindings).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_core::{EnvironmentId, FieldDefinition, ManifestRecordType, PackageManifest};

    fn install(key: &str, version: &str, checksum: &str, fields: &[&str]) -> PackageInstall {
        PackageInstall {
            environment_id: EnvironmentId::new(),
            package_key: key.to_string(),
            version: version.to_string(),
            checksum: checksum.to_string(),
            manifest: PackageManifest {
                record_types: vec![ManifestRecordType {
                    key: format!("{key}_record"),
                    base_type: None,
                    fields: fields.iter().map(|f| FieldDefinition::new(*f, "string")).collect(),
                }],
                bindings: strata_graph::GraphBindings::default(),
            },
            installed_at: Utc::now(),
        }
    }

    #[test]
    fn classifies_by_version_and_checksum() {
        let source = vec![
            install("itsm", "2.0.0", "a", &["title", "impact"]),
            install("hr", "1.0.0", "b", &[]),
            install("csm", "1.0.0", "c2", &[]),
            install("core", "1.0.0", "d", &[]),
        ];
        let target = vec![
            install("itsm", "1.0.0", "a0", &["title"]),
            install("csm", "1.0.0", "c1", &[]),
            install("core", "1.0.0", "d", &[]),
            install("legacy", "0.1.0", "z", &[]),
        ];

        let diff = diff_environments(&source, &target);

        let keys = |list: &[PackageDrift]| {
            list.iter().map(|d| d.package_key.clone()).collect::<Vec<_>>()
        };
        assert_eq!(keys(&diff.added), vec!["hr"]);
        assert_eq!(keys(&diff.changed), vec!["csm", "itsm"]);
        assert_eq!(keys(&diff.in_sync), vec!["core"]);
        assert_eq!(diff.promotable_keys(), vec!["hr", "csm", "itsm"]);
        assert_eq!(diff.changed[1].target_version.as_deref(), Some("1.0.0"));

        assert_eq!(diff.graph_diff.added_record_types.len(), 1);
        assert_eq!(diff.graph_diff.removed_record_types, vec!["legacy_record".to_string()]);
        assert_eq!(diff.graph_diff.modified_record_types[0].field_adds, vec!["impact".to_string()]);
    }

    #[test]
    fn identical_environments_have_no_drift() {
        let installs = vec![install("itsm", "1.0.0", "a", &["title"])];
        let diff = diff_environments(&installs, &installs);

        assert!(!diff.has_drift());
        assert!(diff.graph_diff.is_empty());
        assert_eq!(diff.in_sync.len(), 1);
    }
}
