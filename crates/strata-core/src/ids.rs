//! Identifier newtypes
//!
//! Every persisted entity carries a UUID v4 wrapped in its own type so ids
//! of different entities cannot be mixed up.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh id
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Tenant identifier
    TenantId
);
entity_id!(
    /// Project identifier
    ProjectId
);
entity_id!(
    /// Change container identifier
    ChangeId
);
entity_id!(
    /// Change target identifier
    TargetId
);
entity_id!(
    /// Patch operation identifier
    PatchOpId
);
entity_id!(
    /// Persisted record type identifier
    RecordTypeId
);
entity_id!(
    /// Record type snapshot identifier
    SnapshotId
);
entity_id!(
    /// Environment identifier
    EnvironmentId
);
entity_id!(
    /// Promotion intent identifier
    PromotionIntentId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn ids_are_unique() {
        assert_ne!(ChangeId::new(), ChangeId::new());
    }

    #[test]
    fn id_round_trips_through_display() {
        let id = EnvironmentId::new();
        let parsed = EnvironmentId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn id_serializes_as_plain_uuid() {
        let id = TenantId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }
}
