//! Testing utilities for the Strata workspace
//!
//! Shared fixtures: a tenant with an in-memory repository and a recording
//! event bus, plus builders for record types, changes and packages.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use chrono::Utc;
use std::sync::Arc;
use strata_core::{
    ChangePatchOp, ChangeRecord, ChangeStatus, ChangeStore, ChangeTarget, Environment,
    EnvironmentId, EnvironmentTier, EventBus, FieldDefinition, InMemoryRepository,
    ManifestRecordType, PackageInstall, PackageManifest, PatchOperation, ProjectId, RecordType,
    RecordTypeId, RecordTypeSchema, RecordTypeStore, RecordingSubscriber, RequestContext,
    TenantId, TenantRepository,
};

pub fn field(name: &str, field_type: &str) -> FieldDefinition {
    FieldDefinition::new(name, field_type)
}

pub fn required_field(name: &str, field_type: &str) -> FieldDefinition {
    FieldDefinition::new(name, field_type).required(true)
}

/// One tenant with its own repository and event bus
pub struct Fixture {
    pub repo: Arc<InMemoryRepository>,
    pub events: Arc<EventBus>,
    pub recorder: Arc<RecordingSubscriber>,
    pub ctx: RequestContext,
    pub project_id: ProjectId,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        let events = Arc::new(EventBus::default());
        let recorder = Arc::new(RecordingSubscriber::new());
        events.subscribe(recorder.clone());
        Self {
            repo: Arc::new(InMemoryRepository::new()),
            events,
            recorder,
            ctx: RequestContext::new(TenantId::new()).with_actor("tester"),
            project_id: ProjectId::new(),
        }
    }

    /// The repository as the services take it
    pub fn tenant_repo(&self) -> Arc<dyn TenantRepository> {
        self.repo.clone()
    }

    /// Context of an unrelated tenant
    pub fn other_tenant(&self) -> RequestContext {
        RequestContext::new(TenantId::new())
    }

    pub fn add_record_type(
        &self,
        key: &str,
        base_type: Option<&str>,
        fields: Vec<FieldDefinition>,
    ) -> RecordType {
        self.add_record_type_in(self.project_id, key, base_type, fields)
    }

    pub fn add_record_type_in(
        &self,
        project_id: ProjectId,
        key: &str,
        base_type: Option<&str>,
        fields: Vec<FieldDefinition>,
    ) -> RecordType {
        let record_type = RecordType {
            id: RecordTypeId::new(),
            tenant_id: self.ctx.tenant_id,
            project_id,
            key: key.to_string(),
            version: 1,
            base_type: base_type.map(str::to_string),
            status: "active".to_string(),
            schema: RecordTypeSchema::with_fields(fields).to_value(),
            updated_at: Utc::now(),
        };
        self.repo.insert_record_type(record_type.clone());
        record_type
    }

    /// `task { title: string (required), status: choice (required) }`
    pub fn seed_task(&self) -> RecordType {
        self.add_record_type(
            "task",
            None,
            vec![required_field("title", "string"), required_field("status", "choice")],
        )
    }

    /// `task { state (required) }` and `incident: task { severity }`
    pub fn seed_task_and_incident(&self) -> (RecordType, RecordType) {
        let task = self.add_record_type(
            "task",
            None,
            vec![required_field("state", "choice"), field("notes", "text")],
        );
        let incident = self.add_record_type(
            "incident",
            Some("task"),
            vec![field("state", "choice"), field("severity", "number")],
        );
        (task, incident)
    }

    /// Current persisted schema of `key`
    pub async fn schema_of(&self, key: &str) -> RecordTypeSchema {
        self.repo
            .get_record_type_by_key(&self.ctx, key)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("record type {key} missing"))
            .normalized_schema()
            .unwrap()
    }

    pub async fn field_names_of(&self, key: &str) -> Vec<String> {
        self.schema_of(key)
            .await
            .fields
            .into_iter()
            .map(|f| f.name)
            .collect()
    }

    /// Change in `status` with one record type target per distinct key and
    /// the given ops, created straight through the repository
    pub async fn seed_change(
        &self,
        status: ChangeStatus,
        ops: Vec<(&str, PatchOperation)>,
    ) -> (ChangeRecord, Vec<ChangePatchOp>) {
        let mut change = ChangeRecord::draft(self.ctx.tenant_id, self.project_id, "fixture change");
        change.status = status;
        let change = self.repo.create_change(&self.ctx, change).await.unwrap();

        let mut targets: Vec<ChangeTarget> = Vec::new();
        let mut created = Vec::new();
        for (key, operation) in ops {
            let target = match targets.iter().find(|t| t.record_type_key() == Some(key)) {
                Some(target) => target.clone(),
                None => {
                    let target = self
                        .repo
                        .create_change_target(&self.ctx, ChangeTarget::record_type(&change, key))
                        .await
                        .unwrap();
                    targets.push(target.clone());
                    target
                }
            };
            let op = self
                .repo
                .create_change_patch_op(&self.ctx, ChangePatchOp::new(&target, operation))
                .await
                .unwrap();
            created.push(op);
        }
        (change, created)
    }

    /// Shorthand for [`Self::seed_change`] in `ready`
    pub async fn ready_change(
        &self,
        ops: Vec<(&str, PatchOperation)>) -> (ChangeRecord, Vec<ChangePatchOp>,
    ) {
        self.seed_change(ChangeStatus::Ready, ops).await
    }

    pub async fn ops_of(&self, change: &ChangeRecord) -> Vec<ChangePatchOp> {
        self.repo
            .get_change_patch_ops_by_change(&self.ctx, change.id)
            .await
            .unwrap()
    }

    pub async fn status_of(&self, change: &ChangeRecord) -> ChangeStatus {
        self.repo
            .get_change(&self.ctx, change.id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    pub fn add_environment(&self, name: &str, tier: EnvironmentTier) -> Environment {
        let environment = Environment {
            id: EnvironmentId::new(),
            tenant_id: self.ctx.tenant_id,
            name: name.to_string(),
            tier,
        };
        self.repo.insert_environment(environment.clone());
        environment
    }

    pub fn install(
        &self,
        environment: &Environment,
        package_key: &str,
        version: &str,
        manifest: PackageManifest,
    ) {
        let install = package_install(environment.id, package_key, version, manifest);
        self.repo.install_package(self.ctx.tenant_id, install);
    }
}

/// Install with a checksum derived from key and version
pub fn package_install(
    environment_id: EnvironmentId,
    package_key: &str,
    version: &str,
    manifest: PackageManifest,
) -> PackageInstall {
    PackageInstall {
        environment_id,
        package_key: package_key.to_string(),
        version: version.to_string(),
        checksum: format!("sha256:{package_key}@{version}"),
        manifest,
        installed_at: Utc::now(),
    }
}

/// Manifest contributing one record type
pub fn manifest_with(
    key: &str,
    base_type: Option<&str>,
    fields: Vec<FieldDefinition>,
) -> PackageManifest {
    PackageManifest {
        record_types: vec![ManifestRecordType {
            key: key.to_string(),
            base_type: base_type.map(str::to_string),
            fields,
        }],
        bindings: strata_graph::GraphBindings::default(),
    }
}
