//! Strata Promotion - moving packages between environments
//!
//! - [`diff_environments`]: installed-package drift plus the schema-level
//!   graph diff of the package manifests
//! - [`PromotionIntentService`]: the approval-gated promotion lifecycle

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod drift;
pub mod service;
pub mod state;

pub use drift::{diff_environments, project_manifests, MANIFEST_SCOPE};
pub use service::PromotionIntentService;
pub use state::{allowed_transitions, validate_transition};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
