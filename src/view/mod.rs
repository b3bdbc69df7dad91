pub mod timepoint;

pub use timepoint::TimePointFrame;
