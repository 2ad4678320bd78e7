//! Persisted domain records

pub mod change;
pub mod promotion;
pub mod schema;

pub use change::{
    ChangePatchOp, ChangeRecord, ChangeStatus, ChangeTarget, PatchOperation, TargetType,
    RECORD_TYPE_KEY_SELECTOR,
};
pub use promotion::{
    Environment, EnvironmentDiff, EnvironmentTier, ManifestRecordType, PackageDrift,
    PackageInstall, PackageManifest, PromotedPackage, PromotionIntent, PromotionResult,
    PromotionStatus,
};
pub use schema::{
    FieldDefinition, FieldDefinitionInput, RecordType, RecordTypeSchema, RecordTypeSnapshot,
    SchemaError, DEFAULT_FIELD_TYPE,
};
