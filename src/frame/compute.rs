// Read-only input view handed to compute callables.
//
// The engine assembles every declared dependency before invoking the
// callable: same-frame columns arrive aligned per target row, sibling
// frames arrive either joined through the declared relationship or whole
// when no relationship exists.

use crate::core::{FrameError, Result, RowKey, Value};
use std::collections::BTreeMap;

/// Dependency columns contributed by one sibling frame.
#[derive(Debug, Clone)]
pub enum ForeignInput {
    /// Index-aligned with the target rows via the declared relationship;
    /// `Null` where a target row has no join match.
    Joined(BTreeMap<String, Vec<Value>>),
    /// No relationship declared: the entire sibling frame, unfiltered.
    Unfiltered {
        keys: Vec<RowKey>,
        columns: BTreeMap<String, Vec<Value>>,
    },
}

/// Assembled inputs for one compute invocation.
#[derive(Debug, Clone)]
pub struct ComputeView {
    column: String,
    keys: Vec<RowKey>,
    local: BTreeMap<String, Vec<Value>>,
    foreign: BTreeMap<String, ForeignInput>,
}

impl ComputeView {
    pub(crate) fn new(
        column: String,
        keys: Vec<RowKey>,
        local: BTreeMap<String, Vec<Value>>,
        foreign: BTreeMap<String, ForeignInput>,
    ) -> Self {
        Self {
            column,
            keys,
            local,
            foreign,
        }
    }

    /// Index keys of the rows to compute, in index order. The callable must
    /// return exactly one value per key.
    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// A same-frame dependency column, aligned with `keys`.
    pub fn local(&self, column: &str) -> Result<&[Value]> {
        self.local
            .get(column)
            .map(Vec::as_slice)
            .ok_or_else(|| self.undeclared(column))
    }

    /// The input contributed by a sibling frame.
    pub fn foreign(&self, frame: &str) -> Result<&ForeignInput> {
        self.foreign.get(frame).ok_or_else(|| {
            FrameError::Compute(
                self.column.clone(),
                format!("frame '{}' is not a declared dependency", frame),
            )
        })
    }

    /// A sibling-frame column joined per target row. Errors when the
    /// sibling arrived unfiltered (no relationship declared).
    pub fn joined(&self, frame: &str, column: &str) -> Result<&[Value]> {
        match self.foreign(frame)? {
            ForeignInput::Joined(columns) => columns
                .get(column)
                .map(Vec::as_slice)
                .ok_or_else(|| self.undeclared(column)),
            ForeignInput::Unfiltered { .. } => Err(FrameError::Compute(
                self.column.clone(),
                format!(
                    "frame '{}' has no relationship declared; use foreign() for the unfiltered frame",
                    frame
                ),
            )),
        }
    }

    fn undeclared(&self, column: &str) -> FrameError {
        FrameError::Compute(
            self.column.clone(),
            format!("column '{}' is not a declared dependency", column),
        )
    }
}

impl ForeignInput {
    /// Column access regardless of join shape.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        match self {
            Self::Joined(columns) | Self::Unfiltered { columns, .. } => {
                columns.get(name).map(Vec::as_slice)
            }
        }
    }

    /// Keys of an unfiltered sibling frame; `None` for joined input.
    pub fn keys(&self) -> Option<&[RowKey]> {
        match self {
            Self::Joined(_) => None,
            Self::Unfiltered { keys, .. } => Some(keys),
        }
    }
}
