use pretty_assertions::assert_eq;
use strata_core::{
    EnvironmentId, EnvironmentStore, EnvironmentTier, ErrorStatus, EventType, PromotionStatus,
    StrataError,
};
use strata_promotion::PromotionIntentService;
use strata_test_utils::{field, manifest_with, Fixture};

struct Setup {
    fx: Fixture,
    service: PromotionIntentService,
    dev: strata_core::Environment,
    prod: strata_core::Environment,
}

fn setup() -> Setup {
    let fx = Fixture::new();
    let dev = fx.add_environment("dev", EnvironmentTier::Dev);
    let prod = fx.add_environment("prod", EnvironmentTier::Prod);
    let itsm_fields = vec![field("title", "string"), field("impact", "choice")];
    fx.install(&dev, "itsm", "2.0.0", manifest_with("incident", None, itsm_fields));
    fx.install(&dev, "hr", "1.0.0", manifest_with("case", None, vec![]));
    fx.install(&dev, "core", "1.0.0", manifest_with("task", None, vec![]));
    let itsm_fields = vec![field("title", "string")];
    fx.install(&prod, "itsm", "1.0.0", manifest_with("incident", None, itsm_fields));
    fx.install(&prod, "core", "1.0.0", manifest_with("task", None, vec![]));
    let service = PromotionIntentService::new(fx.tenant_repo(), fx.events.clone());
    Setup { fx, service, dev, prod }
}

#[tokio::test]
async fn create_requires_distinct_environments() {
    let s = setup();

    let err = s
        .service
        .create(&s.fx.ctx, s.fx.project_id, s.dev.id, s.dev.id)
        .await
        .unwrap_err();
    assert_eq!(err.status(), ErrorStatus::BadRequest);
    assert!(err.to_string().contains("must differ"));

    let err = s
        .service
        .create(&s.fx.ctx, s.fx.project_id, s.dev.id, EnvironmentId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::NotFound { entity: "environment", .. }));
    assert!(s.fx.recorder.events().is_empty());
}

#[tokio::test]
async fn happy_path_promotes_added_and_changed_packages() {
    let s = setup();
    let ctx = s.fx.ctx.clone();

    let intent = s.service.create(&ctx, s.fx.project_id, s.dev.id, s.prod.id).await.unwrap();
    assert_eq!(intent.status, PromotionStatus::Draft);

    let intent = s.service.preview(&ctx, intent.id).await.unwrap();
    let diff = intent.diff.clone().unwrap();
    assert_eq!(diff.promotable_keys(), vec!["hr", "itsm"]);
    assert_eq!(diff.in_sync.len(), 1);
    assert_eq!(diff.graph_diff.affected_record_keys(), vec!["case", "incident"]);

    let intent = s.service.approve(&ctx, intent.id).await.unwrap();
    assert_eq!(intent.approved_by.as_deref(), Some("tester"));
    assert!(intent.approved_at.is_some());

    let intent = s.service.execute(&ctx, intent.id).await.unwrap();
    assert_eq!(intent.status, PromotionStatus::Executed);
    let result = intent.result.unwrap();
    let promoted: Vec<_> = result
        .promoted
        .iter()
        .map(|p| (p.package_key.as_str(), p.version.as_str()))
        .collect();
    assert_eq!(promoted, vec![("hr", "1.0.0"), ("itsm", "2.0.0")]);

    let prod_installs = s.fx.repo.list_environment_package_installs(&ctx, s.prod.id).await.unwrap();
    assert_eq!(prod_installs.len(), 3);
    let drift = s.service.drift(&ctx, s.dev.id, s.prod.id).await.unwrap();
    assert!(!drift.has_drift());

    assert_eq!(
        s.fx.recorder.event_types(),
        vec![
            EventType::PromotionIntentCreated,
            EventType::PromotionIntentPreviewed,
            EventType::PromotionIntentApproved,
            EventType::PromotionIntentExecuted,
        ]
    );
    let stored = s.service.get(&ctx, intent.id).await.unwrap();
    assert!(stored.result.is_some());
}

#[tokio::test]
async fn execute_from_draft_names_the_transition() {
    let s = setup();
    let intent = s
        .service
        .create(&s.fx.ctx, s.fx.project_id, s.dev.id, s.prod.id)
        .await
        .unwrap();

    let err = s.service.execute(&s.fx.ctx, intent.id).await.unwrap_err();

    assert_eq!(err.status(), ErrorStatus::Conflict);
    assert!(err.to_string().contains("draft -> executed"));
    assert_eq!(s.fx.recorder.count_of(EventType::PromotionIntentExecuted), 0);
}

#[tokio::test]
async fn approve_requires_preview() {
    let s = setup();
    let intent = s
        .service
        .create(&s.fx.ctx, s.fx.project_id, s.dev.id, s.prod.id)
        .await
        .unwrap();

    let err = s.service.approve(&s.fx.ctx, intent.id).await.unwrap_err();
    assert!(err.to_string().contains("draft -> approved"));
}

#[tokio::test]
async fn preview_can_be_repeated() {
    let s = setup();
    let intent = s
        .service
        .create(&s.fx.ctx, s.fx.project_id, s.dev.id, s.prod.id)
        .await
        .unwrap();
    s.service.preview(&s.fx.ctx, intent.id).await.unwrap();
    s.fx.install(&s.prod, "hr", "1.0.0", manifest_with("case", None, vec![]));

    let again = s.service.preview(&s.fx.ctx, intent.id).await.unwrap();

    assert_eq!(again.status, PromotionStatus::Previewed);
    assert_eq!(again.diff.unwrap().promotable_keys(), vec!["itsm"]);
}

#[tokio::test]
async fn reject_from_each_open_state_but_not_after_execution() {
    let s = setup();
    let ctx = &s.fx.ctx;

    let draft = s.service.create(ctx, s.fx.project_id, s.dev.id, s.prod.id).await.unwrap();
    let rejected = s
        .service
        .reject(ctx, draft.id, Some("not now".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.status, PromotionStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("not now"));

    let previewed = s.service.create(ctx, s.fx.project_id, s.dev.id, s.prod.id).await.unwrap();
    s.service.preview(ctx, previewed.id).await.unwrap();
    assert!(s.service.reject(ctx, previewed.id, None).await.is_ok());

    let approved = s.service.create(ctx, s.fx.project_id, s.dev.id, s.prod.id).await.unwrap();
    s.service.preview(ctx, approved.id).await.unwrap();
    s.service.approve(ctx, approved.id).await.unwrap();
    assert!(s.service.reject(ctx, approved.id, None).await.is_ok());

    let executed = s.service.create(ctx, s.fx.project_id, s.dev.id, s.prod.id).await.unwrap();
    s.service.preview(ctx, executed.id).await.unwrap();
    s.service.approve(ctx, executed.id).await.unwrap();
    s.service.execute(ctx, executed.id).await.unwrap();
    let err = s.service.reject(ctx, executed.id, None).await.unwrap_err();
    assert!(err.to_string().contains("executed -> rejected"));

    // Rejected is terminal too
    let err = s.service.preview(ctx, draft.id).await.unwrap_err();
    assert!(matches!(err, StrataError::InvalidState(_)));

    assert_eq!(s.fx.recorder.count_of(EventType::PromotionIntentRejected), 3);
    assert_eq!(s.service.list(ctx, s.fx.project_id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn intents_are_tenant_scoped() {
    let s = setup();
    let intent = s
        .service
        .create(&s.fx.ctx, s.fx.project_id, s.dev.id, s.prod.id)
        .await
        .unwrap();

    let err = s.service.get(&s.fx.other_tenant(), intent.id).await.unwrap_err();
    assert_eq!(err.status(), ErrorStatus::NotFound);
}
