use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame '{0}' already registered")]
    DuplicateFrame(String),

    #[error("Frame '{0}' not found")]
    UnknownFrame(String),

    #[error("Column '{0}' not found in frame '{1}'")]
    UnknownColumn(String, String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Cyclic dependency detected while computing column '{0}' of frame '{1}'")]
    CyclicDependency(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Compute error in column '{0}': {1}")]
    Compute(String, String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
