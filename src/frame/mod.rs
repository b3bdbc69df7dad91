pub mod compute;
pub mod engine;
pub mod log;
pub mod store;

pub use compute::{ComputeView, ForeignInput};
pub use engine::{FrameEngine, RawFrameSnapshot};
pub use log::{Mutation, MutationLog, UndoOutcome};
pub use store::{FrameId, FrameStore, UpdateOptions};
