pub mod attributes;
pub mod frame_schema;

pub use attributes::{
    AttributeDecl, ColumnAttributes, ColumnKind, ComputeFn, DependencyDecl,
};
pub use frame_schema::{ColumnDef, FrameSchema, IndexColumn};
