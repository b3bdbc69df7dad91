// Reversible mutation records and the per-frame undo/redo log.
//
// Each Mutation captures enough state to be applied forward (redo) or
// reversed (undo) without consulting anything beyond the backing table.

use crate::core::{RowKey, StoredRow};

/// One reversible mutation of a frame's backing table.
#[derive(Debug, Clone)]
pub enum Mutation {
    Update {
        keys: Vec<RowKey>,
        /// Prior row per key; `None` when the update created the row.
        old: Vec<Option<StoredRow>>,
        new: Vec<StoredRow>,
        /// Stored columns written, for dependent invalidation on replay.
        columns: Vec<String>,
    },
    Drop {
        keys: Vec<RowKey>,
        old: Vec<StoredRow>,
    },
}

impl Mutation {
    pub fn keys(&self) -> &[RowKey] {
        match self {
            Self::Update { keys, .. } | Self::Drop { keys, .. } => keys,
        }
    }
}

/// Outcome of an `undo`/`redo` call. An empty log is a safe no-op, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Applied,
    NothingToUndo,
    NothingToRedo,
}

/// Two-stack undo/redo log. Invariant: a fresh logged mutation clears the
/// redo stack.
#[derive(Debug, Default, Clone)]
pub struct MutationLog {
    undo: Vec<Mutation>,
    redo: Vec<Mutation>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mutation. With `replace`, the record coalesces into the
    /// most recent entry instead of extending the log (used to fold rapid
    /// successive edits of one logical action into a single undo step).
    pub fn push(&mut self, mutation: Mutation, replace: bool) {
        if replace {
            if let Some(last) = self.undo.last_mut() {
                *last = mutation;
            } else {
                self.undo.push(mutation);
            }
        } else {
            self.undo.push(mutation);
        }
        self.redo.clear();
    }

    /// Pops the most recent mutation for reversal, moving it to the redo
    /// stack.
    pub fn take_undo(&mut self) -> Option<Mutation> {
        let mutation = self.undo.pop()?;
        self.redo.push(mutation.clone());
        Some(mutation)
    }

    /// Pops the most recently undone mutation for replay, moving it back to
    /// the undo stack.
    pub fn take_redo(&mut self) -> Option<Mutation> {
        let mutation = self.redo.pop()?;
        self.undo.push(mutation.clone());
        Some(mutation)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
