// ============================================================================
// framedb Library
// ============================================================================

//! In-memory, dependency-tracked frame engine.
//!
//! A *frame* is a versioned table for one entity type whose columns are
//! partly stored and partly *computed* from other columns, possibly in
//! other frames reached through declared relationships. Computed columns
//! are evaluated lazily, cached row by row, and invalidated precisely when
//! one of their declared dependencies changes. Mutations are reversible
//! (undo/redo), and time-sliced projection views stay consistent with the
//! backing frame across mutations.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use framedb::{
//!     row_key, AttributeDecl, DataType, DependencyDecl, FrameSchema, FrameStore,
//!     IndexColumn, RowPatch, UpdateOptions, Value,
//! };
//!
//! # fn main() -> framedb::Result<()> {
//! let mut store = FrameStore::new();
//!
//! let segment = store.register(
//!     FrameSchema::new(
//!         "segment",
//!         [
//!             IndexColumn::new("segmentID", DataType::Int),
//!             IndexColumn::new("t", DataType::Int),
//!         ],
//!     )
//!     .stored("length", DataType::Float, Value::Float(0.0)),
//! )?;
//!
//! let spine = store.register(
//!     FrameSchema::new(
//!         "spine",
//!         [
//!             IndexColumn::new("spineID", DataType::Int),
//!             IndexColumn::new("t", DataType::Int),
//!         ],
//!     )
//!     .stored("segmentID", DataType::Int, Value::Null)
//!     .relationship("segment", ["segmentID", "t"])
//!     .computed(
//!         "segmentLength",
//!         AttributeDecl::new().title("Segment Length"),
//!         DependencyDecl::frames([("spine", ["segmentID"]), ("segment", ["length"])]),
//!         Arc::new(|view| Ok(view.joined("segment", "length")?.to_vec())),
//!     ),
//! )?;
//!
//! store.update(
//!     segment,
//!     &[row_key([1i64, 0i64])],
//!     &RowPatch::new().set("length", 12.5),
//!     UpdateOptions::default(),
//! )?;
//! store.update(
//!     spine,
//!     &[row_key([10i64, 0i64])],
//!     &RowPatch::new().set("segmentID", 1i64),
//!     UpdateOptions::default(),
//! )?;
//!
//! // Lazily computed through the relationship join, then cached.
//! let length = store.get_one(spine, "segmentLength", &row_key([10i64, 0i64]))?;
//! assert_eq!(length, Some(Value::Float(12.5)));
//!
//! // Mutating the dependency invalidates exactly the referencing rows.
//! store.update(
//!     segment,
//!     &[row_key([1i64, 0i64])],
//!     &RowPatch::new().set("length", 20.0),
//!     UpdateOptions::default(),
//! )?;
//! let length = store.get_one(spine, "segmentLength", &row_key([10i64, 0i64]))?;
//! assert_eq!(length, Some(Value::Float(20.0)));
//!
//! store.undo(segment)?;
//! let length = store.get_one(spine, "segmentLength", &row_key([10i64, 0i64]))?;
//! assert_eq!(length, Some(Value::Float(12.5)));
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod frame;
pub mod schema;
pub mod view;

// Re-export main types for convenience
pub use crate::core::{
    row_key, ColumnSlice, DataType, FrameError, Result, RowKey, RowPatch, RowSelector, StoredRow,
    Value,
};
pub use crate::frame::{
    ComputeView, ForeignInput, FrameEngine, FrameId, FrameStore, RawFrameSnapshot, UndoOutcome,
    UpdateOptions,
};
pub use crate::schema::{
    AttributeDecl, ColumnAttributes, ColumnDef, ColumnKind, ComputeFn, DependencyDecl, FrameSchema,
    IndexColumn,
};
pub use crate::view::TimePointFrame;
