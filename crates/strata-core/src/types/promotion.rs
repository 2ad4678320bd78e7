//! Environments, installed packages and promotion intents

use super::schema::FieldDefinition;
use crate::ids::{EnvironmentId, ProjectId, PromotionIntentId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_graph::{GraphBindings, GraphDiffResult};

/// Deployment tier of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentTier {
    Dev,
    Staging,
    Prod,
}

/// A deployment environment of a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: EnvironmentId,
    pub tenant_id: TenantId,
    pub name: String,
    pub tier: EnvironmentTier,
}

/// Record type contributed by a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecordType {
    pub key: String,
    #[serde(default)]
    pub base_type: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// Contents of an installable package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub record_types: Vec<ManifestRecordType>,
    #[serde(default)]
    pub bindings: GraphBindings,
}

/// A package version installed into an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstall {
    pub environment_id: EnvironmentId,
    pub package_key: String,
    pub version: String,
    pub checksum: String,
    #[serde(default)]
    pub manifest: PackageManifest,
    pub installed_at: DateTime<Utc>,
}

impl PackageInstall {
    /// Same version and checksum
    #[must_use]
    pub fn matches(&self, other: &PackageInstall) -> bool {
        self.version == other.version && self.checksum == other.checksum
    }
}

/// Drift state of one package between two environments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDrift {
    pub package_key: String,
    pub source_version: String,
    pub source_checksum: String,
    #[serde(default)]
    pub target_version: Option<String>,
    #[serde(default)]
    pub target_checksum: Option<String>,
}

/// Installed-package comparison between a source and a target environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDiff {
    /// In source, missing from target
    pub added: Vec<PackageDrift>,
    /// In both, version or checksum differs
    pub changed: Vec<PackageDrift>,
    /// In both, identical
    pub in_sync: Vec<PackageDrift>,
    /// Schema-level drift of the projected package manifests
    #[serde(default)]
    pub graph_diff: GraphDiffResult,
}

impl EnvironmentDiff {
    /// Package keys a promotion would transfer
    #[must_use]
    pub fn promotable_keys(&self) -> Vec<String> {
        self.added
            .iter()
            .chain(self.changed.iter())
            .map(|d| d.package_key.clone())
            .collect()
    }

    #[must_use]
    pub fn has_drift(&self) -> bool {
        !self.added.is_empty() || !self.changed.is_empty()
    }
}

/// One package moved by a promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotedPackage {
    pub package_key: String,
    pub version: String,
}

/// Outcome of a promotion action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionResult {
    pub promoted: Vec<PromotedPackage>,
    pub completed_at: DateTime<Utc>,
}

/// Promotion intent lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    Draft,
    Previewed,
    Approved,
    Executed,
    Rejected,
}

impl PromotionStatus {
    pub const ALL: [PromotionStatus; 5] = [
        PromotionStatus::Draft,
        PromotionStatus::Previewed,
        PromotionStatus::Approved,
        PromotionStatus::Executed,
        PromotionStatus::Rejected,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PromotionStatus::Draft => "draft",
            PromotionStatus::Previewed => "previewed",
            PromotionStatus::Approved => "approved",
            PromotionStatus::Executed => "executed",
            PromotionStatus::Rejected => "rejected",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, PromotionStatus::Executed | PromotionStatus::Rejected)
    }
}

impl std::fmt::Display for PromotionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval-gated transfer of packages between two environments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionIntent {
    pub id: PromotionIntentId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub from_environment_id: EnvironmentId,
    pub to_environment_id: EnvironmentId,
    pub status: PromotionStatus,
    #[serde(default)]
    pub diff: Option<EnvironmentDiff>,
    #[serde(default)]
    pub result: Option<PromotionResult>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromotionIntent {
    /// New draft intent
    #[must_use]
    pub fn draft(
        tenant_id: TenantId,
        project_id: ProjectId,
        from_environment_id: EnvironmentId,
        to_environment_id: EnvironmentId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PromotionIntentId::new(),
            tenant_id,
            project_id,
            from_environment_id,
            to_environment_id,
            status: PromotionStatus::Draft,
            diff: None,
            result: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}
