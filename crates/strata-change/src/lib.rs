//! Strata Change - schema changes and their execution
//!
//! - [`ChangeLifecycle`]: the change state machine and patch-op intake
//! - [`PatchOpExecutor`]: all-or-nothing execution of a change's batch,
//!   plus rollback and single-op revert
//! - [`MergeGraphValidator`]: validation of the projected post-merge graph
//! - [`transform`]: the pure per-operation schema transforms
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_change::ChangeLifecycle;
//! use strata_core::{ChangeStatus, EventBus, InMemoryRepository, PatchOperation};
//!
//! # async fn example(ctx: strata_core::RequestContext, project: strata_core::ProjectId)
//! #     -> strata_core::StrataResult<()> {
//! let repo = Arc::new(InMemoryRepository::new());
//! let lifecycle = ChangeLifecycle::new(repo, Arc::new(EventBus::default()));
//! let change = lifecycle.open_change(&ctx, project, "Add priority").await?;
//! let target = lifecycle.add_record_type_target(&ctx, change.id, "task").await?;
//! let op = PatchOperation::RemoveField { field: "legacy".into() };
//! lifecycle.create_patch_op(&ctx, change.id, target.id, op).await?;
//! for status in [
//!     ChangeStatus::Implementing,
//!     ChangeStatus::Validating,
//!     ChangeStatus::Ready,
//!     ChangeStatus::Merged,
//! ] {
//!     lifecycle.transition(&ctx, change.id, status).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod executor;
pub mod lifecycle;
pub mod merge_validator;
pub mod transform;

pub use executor::{ExecutionOutcome, PatchOpExecutor};
pub use lifecycle::{allowed_transitions, validate_transition, ChangeLifecycle};
pub use merge_validator::{build_snapshots, MergeGraphValidator, MergeValidation};
pub use transform::{ProtectedFields, TransformError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
