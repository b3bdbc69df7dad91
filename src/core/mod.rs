pub mod error;
pub mod types;
pub mod value;

pub use error::{FrameError, Result};
pub use types::{row_key, ColumnSlice, RowKey, RowPatch, RowSelector, StoredRow};
pub use value::{DataType, Value};
