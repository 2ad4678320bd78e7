//! Strata Core - shared domain layer
//!
//! Everything the schema-evolution services have in common:
//! - Identifier newtypes and the tenant [`RequestContext`]
//! - Persisted records (changes, patch ops, record types, environments,
//!   promotion intents)
//! - The [`StrataError`] taxonomy
//! - Tenant-scoped repository traits and an in-memory implementation
//! - The domain [`EventBus`]
//! - [`StrataConfig`] loaded from TOML
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_core::{InMemoryRepository, RequestContext, TenantId, RecordTypeStore};
//!
//! # async fn example() -> Result<(), strata_core::StrataError> {
//! let repo = InMemoryRepository::new();
//! let ctx = RequestContext::new(TenantId::new());
//! let types = repo.list_record_types(&ctx).await?;
//! assert!(types.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod ids;
pub mod memory;
pub mod repository;
pub mod types;

pub use config::{ConfigError, EventsConfig, LoggingConfig, StrataConfig};
pub use context::RequestContext;
pub use error::{ErrorStatus, StrataError, StrataResult};
pub use events::{
    DomainEvent, EventBus, EventError, EventStatus, EventSubscriber, EventType,
    RecordingSubscriber,
};
pub use ids::{
    ChangeId, EnvironmentId, PatchOpId, ProjectId, PromotionIntentId, RecordTypeId, SnapshotId,
    TargetId, TenantId,
};
pub use memory::{InMemoryRepository, WriteStats};
pub use repository::{
    ChangeStore, EnvironmentStore, PromotionStore, RecordTypeStore, SnapshotStore,
    TenantRepository,
};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Strata services
    pub use crate::{
        ChangeStore, EnvironmentStore, PromotionStore, RecordTypeStore, RequestContext,
        SnapshotStore, StrataError, StrataResult, TenantRepository,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
