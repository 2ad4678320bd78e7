use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use strata_change::{ExecutionOutcome, PatchOpExecutor};
use strata_core::{
    ChangeStatus, ChangeStore, ChangeTarget, ErrorStatus, EventType, FieldDefinitionInput,
    PatchOperation, ProjectId, RecordTypeStore, SnapshotStore, StrataError, TargetId, TargetType,
};
use strata_graph::ValidationCode;
use strata_test_utils::{field, required_field, Fixture};

fn executor(fx: &Fixture) -> PatchOpExecutor {
    PatchOpExecutor::new(fx.tenant_repo(), fx.events.clone())
}

fn add(name: &str, ty: &str) -> PatchOperation {
    PatchOperation::AddField {
        field: name.to_string(),
        definition: FieldDefinitionInput::typed(ty),
    }
}

fn remove(name: &str) -> PatchOperation {
    PatchOperation::RemoveField { field: name.to_string() }
}

#[tokio::test]
async fn add_field_appends_in_order() {
    let fx = Fixture::new();
    fx.seed_task();
    let (change, _) = fx.ready_change(vec![("task", add("priority", "number"))]).await;

    let outcome = executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    assert_eq!(outcome, ExecutionOutcome::succeeded(1));
    assert_eq!(fx.field_names_of("task").await, vec!["title", "status", "priority"]);
    let schema = fx.schema_of("task").await;
    assert_eq!(schema.field("priority").unwrap().field_type, "number");
}

#[tokio::test]
async fn net_zero_batch_stamps_every_op_without_writing_schema() {
    let fx = Fixture::new();
    fx.seed_task();
    let (change, _) = fx
        .ready_change(vec![("task", add("priority", "number")), ("task", remove("priority"))])
        .await;

    let outcome = executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.applied_count, 2);
    assert_eq!(fx.field_names_of("task").await, vec!["title", "status"]);

    let ops = fx.ops_of(&change).await;
    assert!(ops.iter().all(|op| op.is_executed()));
    let first = ops[0].previous_snapshot.as_ref().unwrap();
    let second = ops[1].previous_snapshot.as_ref().unwrap();
    assert_eq!(first.field_names(), vec!["title", "status"]);
    assert_eq!(second.field_names(), vec!["title", "status", "priority"]);
    assert_eq!(fx.repo.stats().op_stamps(), 2);
    assert_eq!(fx.repo.stats().schema_writes(), 0);
}

#[tokio::test]
async fn failing_op_aborts_batch_without_writes() {
    let fx = Fixture::new();
    fx.seed_task();
    let (change, _) = fx
        .ready_change(vec![
            ("task", add("priority", "number")),
            ("task", add("priority", "string")),
        ])
        .await;

    let outcome = executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.applied_count, 0);
    assert!(outcome.error.unwrap().contains("already exists"));
    assert_eq!(fx.repo.stats().total(), 0);
    assert!(fx.ops_of(&change).await.iter().all(|op| !op.is_executed()));
}

#[tokio::test]
async fn re_execution_is_rejected_with_zero_writes() {
    let fx = Fixture::new();
    fx.seed_task();
    let (change, _) = fx.ready_change(vec![("task", add("priority", "number"))]).await;
    let exec = executor(&fx);
    exec.execute_change(&fx.ctx, change.id).await.unwrap();
    let writes_after_first = fx.repo.stats().total();

    let err = exec.execute_change(&fx.ctx, change.id).await.unwrap_err();

    assert!(matches!(err, StrataError::InvalidState(ref m) if m.contains("already executed")));
    assert_eq!(fx.repo.stats().total(), writes_after_first);
}

#[tokio::test]
async fn base_type_required_fields_are_protected() {
    let fx = Fixture::new();
    fx.seed_task_and_incident();
    let exec = executor(&fx);

    let (removal, _) = fx.ready_change(vec![("incident", remove("state"))]).await;
    let outcome = exec.execute_change(&fx.ctx, removal.id).await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("protected by base type `task`"));

    let relax = PatchOperation::SetField {
        field: "state".into(),
        definition: FieldDefinitionInput::default().with_required(false),
    };
    let (relaxing, _) = fx.ready_change(vec![("incident", relax)]).await;
    let outcome = exec.execute_change(&fx.ctx, relaxing.id).await.unwrap();
    assert!(!outcome.success);

    let (adding, _) = fx.ready_change(vec![("incident", add("new_field", "string"))]).await;
    let outcome = exec.execute_change(&fx.ctx, adding.id).await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::succeeded(1));
    assert_eq!(fx.repo.stats().schema_writes(), 1);
}

#[tokio::test]
async fn protection_is_one_hop_only() {
    let fx = Fixture::new();
    fx.add_record_type("base", None, vec![required_field("id", "string")]);
    fx.add_record_type("task", Some("base"), vec![field("id", "string")]);
    fx.add_record_type("incident", Some("task"), vec![field("id", "string")]);

    let (change, _) = fx.ready_change(vec![("incident", remove("id"))]).await;
    let outcome = executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    assert!(outcome.success);
    assert!(fx.field_names_of("incident").await.is_empty());
}

#[tokio::test]
async fn missing_record_type_names_op_and_key() {
    let fx = Fixture::new();
    fx.seed_task();
    let (change, ops) = fx
        .ready_change(vec![("task", add("priority", "number")), ("ghost", add("x", "string"))])
        .await;

    let outcome = executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    let message = outcome.error.unwrap();
    assert!(!outcome.success);
    assert!(message.contains(&ops[1].id.to_string()));
    assert!(message.contains("`ghost`"));
    assert_eq!(fx.repo.stats().total(), 0);
}

#[tokio::test]
async fn guards_run_before_any_phase() {
    let fx = Fixture::new();
    fx.seed_task();
    let exec = executor(&fx);

    let err = exec
        .execute_change(&fx.ctx, strata_core::ChangeId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::NotFound { entity: "change", .. }));

    let (draft, _) = fx
        .seed_change(ChangeStatus::Draft, vec![("task", add("priority", "number"))])
        .await;
    let err = exec.execute_change(&fx.ctx, draft.id).await.unwrap_err();
    assert!(matches!(err, StrataError::InvalidState(_)));

    let (empty, _) = fx.ready_change(vec![]).await;
    let outcome = exec.execute_change(&fx.ctx, empty.id).await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::succeeded(0));

    // Other tenants cannot see the change
    let err = exec.execute_change(&fx.other_tenant(), draft.id).await.unwrap_err();
    assert!(matches!(err, StrataError::NotFound { .. }));
    assert_eq!(fx.repo.stats().total(), 0);
}

#[tokio::test]
async fn non_record_type_target_is_a_configuration_error() {
    let fx = Fixture::new();
    fx.seed_task();
    let (change, _) = fx.ready_change(vec![]).await;
    let target = fx
        .repo
        .create_change_target(
            &fx.ctx,
            ChangeTarget {
                id: TargetId::new(),
                tenant_id: fx.ctx.tenant_id,
                project_id: fx.project_id,
                change_id: change.id,
                target_type: TargetType::Form,
                selector: json!({ "recordTypeKey": "task" }),
            },
        )
        .await
        .unwrap();
    fx.repo
        .create_change_patch_op(&fx.ctx, strata_core::ChangePatchOp::new(&target, remove("title")))
        .await
        .unwrap();

    let err = executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap_err();
    assert!(matches!(err, StrataError::Configuration(_)));
}

#[tokio::test]
async fn snapshot_is_first_touch_and_immutable() {
    let fx = Fixture::new();
    fx.seed_task();
    let (change, _) = fx
        .ready_change(vec![
            ("task", add("priority", "number")),
            (
                "task",
                PatchOperation::RenameField { old_name: "status".into(), new_name: "stage".into() },
            ),
        ])
        .await;

    executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    let snapshot = fx
        .repo
        .get_snapshot_by_change_and_key(&fx.ctx, change.id, "task")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.schema.field_names(), vec!["title", "status"]);
    assert_eq!(fx.repo.stats().snapshot_creates(), 1);
    assert_eq!(fx.field_names_of("task").await, vec!["title", "stage", "priority"]);
}

#[tokio::test]
async fn ops_across_types_persist_each_type() {
    let fx = Fixture::new();
    fx.seed_task_and_incident();
    let (change, _) = fx
        .ready_change(vec![
            ("task", add("due", "date")),
            ("incident", add("impact", "choice")),
            ("task", remove("notes")),
        ])
        .await;

    let outcome = executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    assert_eq!(outcome.applied_count, 3);
    assert_eq!(fx.field_names_of("task").await, vec!["state", "due"]);
    assert_eq!(fx.field_names_of("incident").await, vec!["state", "severity", "impact"]);
    let snapshots = fx.repo.list_snapshots_by_change(&fx.ctx, change.id).await.unwrap();
    assert_eq!(snapshots.len(), 2);
}

#[tokio::test]
async fn invalid_projected_graph_rejects_merge() {
    let fx = Fixture::new();
    fx.seed_task();
    // A pre-existing orphan makes every projected graph invalid
    fx.add_record_type("problem", Some("missing"), vec![]);
    let (change, _) = fx.ready_change(vec![("task", add("priority", "number"))]).await;

    let outcome = executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.applied_count, 0);
    assert_eq!(outcome.validation_errors.len(), 1);
    assert_eq!(outcome.validation_errors[0].code, ValidationCode::OrphanBaseType);
    assert_eq!(fx.repo.stats().total(), 0);
    assert_eq!(fx.recorder.event_types(), vec![EventType::ValidationFailed]);
}

#[tokio::test]
async fn success_emits_validation_and_diff_events() {
    let fx = Fixture::new();
    fx.seed_task();
    let (change, _) = fx.ready_change(vec![("task", add("priority", "number"))]).await;

    executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    assert_eq!(
        fx.recorder.event_types(),
        vec![EventType::ValidationSucceeded, EventType::DiffComputed]
    );
    let diff_event = &fx.recorder.events()[1];
    assert_eq!(diff_event.entity_id, change.id.to_string());
    assert_eq!(diff_event.affected_records, vec!["task".to_string()]);
}

#[tokio::test]
async fn persist_failure_restores_written_schemas() {
    let fx = Fixture::new();
    fx.seed_task_and_incident();
    fx.repo.fail_schema_writes_for("task");
    // "incident" sorts before "task" and is written first
    let (change, _) = fx
        .ready_change(vec![("incident", add("impact", "choice")), ("task", add("due", "date"))])
        .await;

    let outcome = executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(fx.field_names_of("incident").await, vec!["state", "severity"]);
    assert!(fx.ops_of(&change).await.iter().all(|op| !op.is_executed()));
}

#[tokio::test]
async fn stamp_failure_undoes_batch_and_allows_retry() {
    let fx = Fixture::new();
    fx.seed_task();
    let exec = executor(&fx);
    let (change, ops) = fx
        .ready_change(vec![("task", add("priority", "number")), ("task", add("due", "date"))])
        .await;
    fx.repo.fail_op_stamps_for(ops[1].id);

    let outcome = exec.execute_change(&fx.ctx, change.id).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("failed to stamp patch op"));
    assert_eq!(fx.field_names_of("task").await, vec!["title", "status"]);
    assert!(fx.ops_of(&change).await.iter().all(|op| !op.is_executed()));

    fx.repo.clear_failures();
    let retry = exec.execute_change(&fx.ctx, change.id).await.unwrap();

    assert_eq!(retry, ExecutionOutcome::succeeded(2));
    assert_eq!(fx.field_names_of("task").await, vec!["title", "status", "priority", "due"]);
    assert!(fx.ops_of(&change).await.iter().all(|op| op.is_executed()));
}

#[tokio::test]
async fn preview_reports_diff_without_writing() {
    let fx = Fixture::new();
    fx.seed_task_and_incident();
    // Preview does not depend on the change being ready
    let (change, _) = fx
        .seed_change(
            ChangeStatus::Draft,
            vec![("incident", add("impact", "choice")), ("task", remove("notes"))],
        )
        .await;

    let diff = executor(&fx).preview_change(&fx.ctx, change.id).await.unwrap();

    assert_eq!(diff.affected_record_keys(), vec!["incident", "task"]);
    assert_eq!(diff.modified_record_types[0].field_adds, vec!["impact".to_string()]);
    assert_eq!(fx.repo.stats().total(), 0);
    assert!(fx.recorder.events().is_empty());
}

#[tokio::test]
async fn preview_of_invalid_graph_is_a_validation_failure() {
    let fx = Fixture::new();
    fx.seed_task();
    fx.add_record_type("problem", Some("missing"), vec![]);
    let (change, _) = fx.ready_change(vec![("task", add("priority", "number"))]).await;

    let err = executor(&fx).preview_change(&fx.ctx, change.id).await.unwrap_err();

    assert!(matches!(err, StrataError::ValidationFailure(_)));
    assert_eq!(err.status(), ErrorStatus::Unprocessable);
    assert_eq!(err.validation_errors()[0].code, ValidationCode::OrphanBaseType);
    assert_eq!(fx.repo.stats().total(), 0);
}

#[tokio::test]
async fn preview_of_inapplicable_op_is_a_bad_request() {
    let fx = Fixture::new();
    fx.seed_task();
    let (change, _) = fx.ready_change(vec![("task", remove("ghost"))]).await;

    let err = executor(&fx).preview_change(&fx.ctx, change.id).await.unwrap_err();

    assert_eq!(err.status(), ErrorStatus::BadRequest);
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn rollback_restores_pre_change_schemas() {
    let fx = Fixture::new();
    fx.seed_task_and_incident();
    let exec = executor(&fx);
    let (change, _) = fx
        .ready_change(vec![("task", add("due", "date")), ("incident", remove("severity"))])
        .await;
    exec.execute_change(&fx.ctx, change.id).await.unwrap();

    let err = exec.rollback_change(&fx.ctx, change.id).await.unwrap_err();
    assert!(matches!(err, StrataError::InvalidState(_)));

    fx.repo
        .update_change_status(&fx.ctx, change.id, ChangeStatus::Merged)
        .await
        .unwrap();
    let restored = exec.rollback_change(&fx.ctx, change.id).await.unwrap();

    assert_eq!(restored, vec!["incident".to_string(), "task".to_string()]);
    assert_eq!(fx.field_names_of("task").await, vec!["state", "notes"]);
    assert_eq!(fx.field_names_of("incident").await, vec!["state", "severity"]);
}

#[tokio::test]
async fn revert_patch_op_restores_previous_snapshot() {
    let fx = Fixture::new();
    fx.seed_task();
    let exec = executor(&fx);
    let (change, ops) = fx
        .ready_change(vec![("task", add("priority", "number")), ("task", add("due", "date"))])
        .await;

    let err = exec.revert_patch_op(&fx.ctx, ops[1].id).await.unwrap_err();
    assert!(matches!(err, StrataError::InvalidState(_)));

    exec.execute_change(&fx.ctx, change.id).await.unwrap();
    fx.repo
        .update_change_status(&fx.ctx, change.id, ChangeStatus::Merged)
        .await
        .unwrap();

    let reverted = exec.revert_patch_op(&fx.ctx, ops[1].id).await.unwrap();
    assert_eq!(reverted.key, "task");
    assert_eq!(fx.field_names_of("task").await, vec!["title", "status", "priority"]);
}

#[tokio::test]
async fn cross_project_types_are_visible_to_validation() {
    let fx = Fixture::new();
    fx.seed_task();
    fx.add_record_type_in(ProjectId::new(), "foreign", Some("task"), vec![]);
    let (change, _) = fx.ready_change(vec![("task", add("priority", "number"))]).await;

    let outcome = executor(&fx).execute_change(&fx.ctx, change.id).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.validation_errors[0].code, ValidationCode::BaseTypeCrossProject);
    assert!(fx
        .repo
        .get_record_type_by_key(&fx.ctx, "task")
        .await
        .unwrap()
        .is_some());
}
