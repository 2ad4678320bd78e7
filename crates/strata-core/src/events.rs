//! Domain events
//!
//! Services publish tenant-scoped [`DomainEvent`]s to an explicitly
//! constructed [`EventBus`]. Delivery is fire-and-forget: a subscriber
//! returning an error is logged and skipped, and never fails the operation
//! that emitted the event.

use crate::config::EventsConfig;
use crate::ids::TenantId;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "graph.validation_failed")]
    ValidationFailed,
    #[serde(rename = "graph.validation_succeeded")]
    ValidationSucceeded,
    #[serde(rename = "graph.diff_computed")]
    DiffComputed,
    #[serde(rename = "graph.promotion_intent_created")]
    PromotionIntentCreated,
    #[serde(rename = "graph.promotion_intent_previewed")]
    PromotionIntentPreviewed,
    #[serde(rename = "graph.promotion_intent_approved")]
    PromotionIntentApproved,
    #[serde(rename = "graph.promotion_intent_executed")]
    PromotionIntentExecuted,
    #[serde(rename = "graph.promotion_intent_rejected")]
    PromotionIntentRejected,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ValidationFailed => "graph.validation_failed",
            EventType::ValidationSucceeded => "graph.validation_succeeded",
            EventType::DiffComputed => "graph.diff_computed",
            EventType::PromotionIntentCreated => "graph.promotion_intent_created",
            EventType::PromotionIntentPreviewed => "graph.promotion_intent_previewed",
            EventType::PromotionIntentApproved => "graph.promotion_intent_approved",
            EventType::PromotionIntentExecuted => "graph.promotion_intent_executed",
            EventType::PromotionIntentRejected => "graph.promotion_intent_rejected",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Failure,
}

/// One emitted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub status: EventStatus,
    pub tenant_id: TenantId,
    pub entity_id: String,
    #[serde(default)]
    pub affected_records: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Successful event for an entity
    #[must_use]
    pub fn success(event_type: EventType, tenant_id: TenantId, entity_id: impl ToString) -> Self {
        Self {
            event_type,
            status: EventStatus::Success,
            tenant_id,
            entity_id: entity_id.to_string(),
            affected_records: Vec::new(),
            error: None,
            emitted_at: Utc::now(),
        }
    }

    /// Failure event carrying an error message
    #[must_use]
    pub fn failure(
        event_type: EventType,
        tenant_id: TenantId,
        entity_id: impl ToString,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: EventStatus::Failure,
            error: Some(error.into()),
            ..Self::success(event_type, tenant_id, entity_id)
        }
    }

    #[must_use]
    pub fn with_affected_records(mut self, records: Vec<String>) -> Self {
        self.affected_records = records;
        self
    }
}

/// Subscriber delivery error
#[derive(Debug, Clone, thiserror::Error)]
#[error("event delivery failed: {0}")]
pub struct EventError(pub String);

/// Receives published events
#[cfg_attr(test, mockall::automock)]
pub trait EventSubscriber: Send + Sync {
    /// Handle one event
    ///
    /// # Errors
    /// Errors are logged by the bus and otherwise ignored.
    fn on_event(&self, event: &DomainEvent) -> Result<(), EventError>;
}

/// Fan-out of domain events to subscribers
pub struct EventBus {
    config: EventsConfig,
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
    history: Mutex<VecDeque<DomainEvent>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("subscribers", &self.subscribers.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventsConfig::default())
    }
}

impl EventBus {
    #[must_use]
    pub fn new(config: EventsConfig) -> Self {
        Self {
            config,
            subscribers: RwLock::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Deliver to every subscriber, in subscription order
    pub fn publish(&self, event: DomainEvent) {
        if !self.config.enabled {
            return;
        }
        tracing::debug!(
            event = %event.event_type,
            tenant = %event.tenant_id,
            entity = %event.entity_id,
            "publishing domain event"
        );

        // Snapshot so subscribers may subscribe from inside a callback
        let subscribers: Vec<_> = self.subscribers.read().iter().cloned().collect();
        for subscriber in subscribers {
            if let Err(err) = subscriber.on_event(&event) {
                tracing::warn!(event = %event.event_type, error = %err, "event subscriber failed");
            }
        }

        if self.config.history_limit > 0 {
            let mut history = self.history.lock();
            if history.len() == self.config.history_limit {
                history.pop_front();
            }
            history.push_back(event);
        }
    }

    /// Retained events, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<DomainEvent> {
        self.history.lock().iter().cloned().collect()
    }

    /// Drop all subscribers and retained events
    pub fn clear(&self) {
        self.subscribers.write().clear();
        self.history.lock().clear();
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Subscriber that stores every event it receives
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingSubscriber {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    /// Names of received events in order
    #[must_use]
    pub fn event_types(&self) -> Vec<EventType> {
        self.events.lock().iter().map(|e| e.event_type).collect()
    }

    #[must_use]
    pub fn count_of(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl EventSubscriber for RecordingSubscriber {
    fn on_event(&self, event: &DomainEvent) -> Result<(), EventError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
