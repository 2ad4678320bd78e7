//! Pre-merge graph validation
//!
//! Builds two tenant-wide snapshots: `current` from persisted record types,
//! and `projected` where the record types touched by a pending batch carry
//! their transformed fields. Every record type of the tenant is loaded, not
//! only those of the change's project, so cross-project baseType references
//! stay visible. Only the projected snapshot is validated.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::{
    RecordType, RecordTypeSchema, RequestContext, SchemaError, StrataResult, TenantRepository,
};
use strata_graph::{
    diff_graph_snapshots, GraphBindings, GraphDiffResult, GraphSnapshot, GraphValidationError,
    GraphValidationService, SnapshotBuilder,
};

/// Outcome of validating a projected merge
#[derive(Debug, Clone)]
pub struct MergeValidation {
    pub current: GraphSnapshot,
    pub projected: GraphSnapshot,
    pub errors: Vec<GraphValidationError>,
    /// current → projected
    pub diff: GraphDiffResult,
}

impl MergeValidation {
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Build `(current, projected)` snapshots
///
/// `overrides` maps record type keys to their post-batch schema. Keys with
/// no persisted record type are ignored.
///
/// # Errors
/// Returns [`SchemaError`] if a persisted schema cannot be normalized.
pub fn build_snapshots(
    tenant_id: &str,
    record_types: &[RecordType],
    bindings: &GraphBindings,
    overrides: &BTreeMap<String, RecordTypeSchema>,
) -> Result<(GraphSnapshot, GraphSnapshot), SchemaError> {
    let built_at = Utc::now();
    let mut current = SnapshotBuilder::new(tenant_id)
        .built_at(built_at)
        .bindings(bindings.clone());
    let mut projected = current.clone();

    for record_type in record_types {
        let node = record_type.to_graph_node();
        let persisted = record_type.normalized_schema()?;
        let pending = overrides.get(&record_type.key).unwrap_or(&persisted);

        projected.push_record_type(node.clone(), pending.to_field_nodes(&record_type.key));
        current.push_record_type(node, persisted.to_field_nodes(&record_type.key));
    }

    Ok((current.build(), projected.build()))
}

/// Runs [`GraphValidationService`] over the projected post-merge graph
pub struct MergeGraphValidator {
    repo: Arc<dyn TenantRepository>,
    validator: GraphValidationService,
}

impl MergeGraphValidator {
    #[must_use]
    pub fn new(repo: Arc<dyn TenantRepository>) -> Self {
        Self {
            repo,
            validator: GraphValidationService::new(),
        }
    }

    /// Validate the tenant graph with `overrides` applied
    ///
    /// # Errors
    /// Repository failures and unreadable persisted schemas.
    pub async fn validate(
        &self,
        ctx: &RequestContext,
        overrides: &BTreeMap<String, RecordTypeSchema>,
    ) -> StrataResult<MergeValidation> {
        let record_types = self.repo.list_record_types(ctx).await?;
        let bindings = self.repo.list_bindings(ctx).await?;

        let (current, projected) =
            build_snapshots(&ctx.tenant_id.to_string(), &record_types, &bindings, overrides)?;
        let errors = self.validator.validate(&projected);
        let diff = diff_graph_snapshots(&current, &projected);

        tracing::debug!(
            tenant = %ctx.tenant_id,
            record_types = record_types.len(),
            touched = overrides.len(),
            errors = errors.len(),
            "validated projected graph"
        );

        Ok(MergeValidation {
            current,
            projected,
            errors,
            diff,
        })
    }
}
