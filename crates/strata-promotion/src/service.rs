//! Promotion intent service
//!
//! ```text
//! draft ─▶ previewed ─▶ approved ─▶ executed
//!   │        │  ↺          │
//!   └────────┴─────────────┴──▶ rejected
//! ```
//!
//! Every successful transition is persisted and then announced as a
//! `graph.promotion_intent_<transition>` event.

use crate::drift::diff_environments;
use crate::state::validate_transition;
use chrono::Utc;
use std::sync::Arc;
use strata_core::{
    DomainEvent, Environment, EnvironmentDiff, EnvironmentId, EventBus, EventType, ProjectId,
    PromotionIntent, PromotionIntentId, PromotionResult, PromotionStatus, RequestContext,
    StrataError, StrataResult, TenantRepository,
};

/// Drives promotion intents through their lifecycle
pub struct PromotionIntentService {
    repo: Arc<dyn TenantRepository>,
    events: Arc<EventBus>,
}

impl PromotionIntentService {
    #[must_use]
    pub fn new(repo: Arc<dyn TenantRepository>, events: Arc<EventBus>) -> Self {
        Self { repo, events }
    }

    /// Create a draft intent between two distinct environments
    ///
    /// # Errors
    /// [`StrataError::BadRequest`] when both ids are equal,
    /// [`StrataError::NotFound`] when either environment is missing.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        from_environment_id: EnvironmentId,
        to_environment_id: EnvironmentId,
    ) -> StrataResult<PromotionIntent> {
        if from_environment_id == to_environment_id {
            return Err(StrataError::bad_request(
                "source and target environments must differ",
            ));
        }
        let from = self.environment(ctx, from_environment_id).await?;
        let to = self.environment(ctx, to_environment_id).await?;

        let intent = self
            .repo
            .create_promotion_intent(
                ctx,
                PromotionIntent::draft(ctx.tenant_id, project_id, from.id, to.id),
            )
            .await?;
        tracing::info!(tenant = %ctx.tenant_id, intent = %intent.id, from = %from.name, to = %to.name, "promotion intent created");
        self.emit(ctx, EventType::PromotionIntentCreated, &intent, Vec::new());
        Ok(intent)
    }

    /// Compute the environment diff; may be repeated while previewed
    ///
    /// # Errors
    /// [`StrataError::InvalidState`] outside draft/previewed.
    pub async fn preview(
        &self,
        ctx: &RequestContext,
        id: PromotionIntentId,
    ) -> StrataResult<PromotionIntent> {
        let mut intent = self.get(ctx, id).await?;
        validate_transition(intent.status, PromotionStatus::Previewed)?;

        let diff = self.compute_diff(ctx, &intent).await?;
        let affected = diff.graph_diff.affected_record_keys();
        intent.diff = Some(diff);
        intent.status = PromotionStatus::Previewed;

        let intent = self.repo.update_promotion_intent(ctx, intent).await?;
        self.emit(ctx, EventType::PromotionIntentPreviewed, &intent, affected);
        Ok(intent)
    }

    /// Record the approver; the acting user comes from `ctx`
    ///
    /// # Errors
    /// [`StrataError::InvalidState`] unless previewed.
    pub async fn approve(
        &self,
        ctx: &RequestContext,
        id: PromotionIntentId,
    ) -> StrataResult<PromotionIntent> {
        let mut intent = self.get(ctx, id).await?;
        validate_transition(intent.status, PromotionStatus::Approved)?;

        intent.status = PromotionStatus::Approved;
        intent.approved_by = Some(ctx.actor_label().to_string());
        intent.approved_at = Some(Utc::now());

        let intent = self.repo.update_promotion_intent(ctx, intent).await?;
        tracing::info!(tenant = %ctx.tenant_id, intent = %intent.id, approver = ctx.actor_label(), "promotion intent approved");
        self.emit(ctx, EventType::PromotionIntentApproved, &intent, Vec::new());
        Ok(intent)
    }

    /// Promote the added and changed packages into the target environment
    ///
    /// # Errors
    /// [`StrataError::InvalidState`] unless approved, plus repository errors.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        id: PromotionIntentId,
    ) -> StrataResult<PromotionIntent> {
        let mut intent = self.get(ctx, id).await?;
        validate_transition(intent.status, PromotionStatus::Executed)?;

        let diff = match intent.diff.take() {
            Some(diff) => diff,
            None => self.compute_diff(ctx, &intent).await?,
        };
        let package_keys = diff.promotable_keys();
        let promoted = self
            .repo
            .promote_environment_packages(
                ctx,
                intent.from_environment_id,
                intent.to_environment_id,
                &package_keys,
            )
            .await?;

        intent.diff = Some(diff);
        intent.result = Some(PromotionResult {
            promoted,
            completed_at: Utc::now(),
        });
        intent.status = PromotionStatus::Executed;

        let intent = self.repo.update_promotion_intent(ctx, intent).await?;
        tracing::info!(tenant = %ctx.tenant_id, intent = %intent.id, packages = package_keys.len(), "promotion intent executed");
        self.emit(ctx, EventType::PromotionIntentExecuted, &intent, package_keys);
        Ok(intent)
    }

    /// # Errors
    /// [`StrataError::InvalidState`] once executed or rejected.
    pub async fn reject(
        &self,
        ctx: &RequestContext,
        id: PromotionIntentId,
        reason: Option<String>,
    ) -> StrataResult<PromotionIntent> {
        let mut intent = self.get(ctx, id).await?;
        validate_transition(intent.status, PromotionStatus::Rejected)?;

        intent.status = PromotionStatus::Rejected;
        intent.rejection_reason = reason;

        let intent = self.repo.update_promotion_intent(ctx, intent).await?;
        self.emit(ctx, EventType::PromotionIntentRejected, &intent, Vec::new());
        Ok(intent)
    }

    /// # Errors
    /// [`StrataError::NotFound`] for an unknown id.
    pub async fn get(
        &self,
        ctx: &RequestContext,
        id: PromotionIntentId,
    ) -> StrataResult<PromotionIntent> {
        self.repo
            .get_promotion_intent(ctx, id)
            .await?
            .ok_or_else(|| StrataError::not_found("promotion intent", id))
    }

    /// Intents of a project, newest first
    ///
    /// # Errors
    /// Repository errors.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
    ) -> StrataResult<Vec<PromotionIntent>> {
        self.repo.list_promotion_intents(ctx, project_id).await
    }

    /// Drift between two environments, without an intent
    ///
    /// # Errors
    /// [`StrataError::NotFound`] when either environment is missing.
    pub async fn drift(
        &self,
        ctx: &RequestContext,
        from_environment_id: EnvironmentId,
        to_environment_id: EnvironmentId,
    ) -> StrataResult<EnvironmentDiff> {
        self.environment(ctx, from_environment_id).await?;
        self.environment(ctx, to_environment_id).await?;
        let source = self
            .repo
            .list_environment_package_installs(ctx, from_environment_id)
            .await?;
        let target = self
            .repo
            .list_environment_package_installs(ctx, to_environment_id)
            .await?;
        Ok(diff_environments(&source, &target))
    }

    async fn compute_diff(
        &self,
        ctx: &RequestContext,
        intent: &PromotionIntent,
    ) -> StrataResult<EnvironmentDiff> {
        self.drift(ctx, intent.from_environment_id, intent.to_environment_id)
            .await
    }

    async fn environment(
        &self,
        ctx: &RequestContext,
        id: EnvironmentId,
    ) -> StrataResult<Environment> {
        self.repo
            .get_environment(ctx, id)
            .await?
            .ok_or_else(|| StrataError::not_found("environment", id))
    }

    fn emit(
        &self,
        ctx: &RequestContext,
        event_type: EventType,
        intent: &PromotionIntent,
        affected: Vec<String>,
    ) {
        let event = DomainEvent::success(event_type, ctx.tenant_id, intent.id);
        self.events.publish(event.with_affected_records(affected));
    }
}
