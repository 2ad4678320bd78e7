//! Tenant-scoped request context

use crate::ids::TenantId;
use serde::{Deserialize, Serialize};

/// Carried through every repository call and service operation
///
/// All reads and writes are scoped to `tenant_id`; `actor` is recorded on
/// approvals and in log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub actor: Option<String>,
}

impl RequestContext {
    #[inline]
    #[must_use]
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            actor: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Actor label for logs, `"system"` when anonymous
    #[inline]
    #[must_use]
    pub fn actor_label(&self) -> &str {
        self.actor.as_deref().unwrap_or("system")
    }
}
