//! Strata Graph - record-type graph snapshots
//!
//! Pure data and pure functions over a tenant's record-type graph:
//! - [`GraphSnapshot`] model and [`SnapshotBuilder`]
//! - [`GraphValidationService`] (orphan, cycle, field uniqueness, binding
//!   target and cross-project checks)
//! - [`GraphDiffService`] comparing two snapshots
//!
//! # Example
//!
//! ```rust
//! use strata_graph::{diff_graph_snapshots, validate_graph_snapshot, GraphSnapshot};
//!
//! let snapshot = GraphSnapshot::empty("tenant-1");
//! assert!(validate_graph_snapshot(&snapshot).is_empty());
//! assert!(diff_graph_snapshots(&snapshot, &snapshot).is_empty());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod diff;
pub mod error;
pub mod model;
pub mod validation;

pub use diff::{
    diff_graph_snapshots, AddedRecordType, BaseTypeChange, BindingChanges, FieldTypeChange,
    GraphDiffResult, GraphDiffService, ModifiedRecordType,
};
pub use error::{GraphValidationError, ValidationCode};
pub use model::{
    Binding, BindingKind, EdgeDefinition, FieldDefinitionNode, GraphBindings, GraphSnapshot,
    RecordTypeNode, SnapshotBuilder, INHERITS,
};
pub use validation::{validate_graph_snapshot, GraphValidationService};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
