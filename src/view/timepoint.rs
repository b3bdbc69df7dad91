use crate::core::{ColumnSlice, FrameError, Result, RowKey, RowPatch, Value};
use crate::frame::{FrameId, FrameStore, UndoOutcome, UpdateOptions};
use log::debug;

/// A view of one frame restricted to a fixed value of one index level (the
/// time axis). Callers address rows by the remaining index levels; the view
/// injects the time component on writes and strips it from reported keys.
///
/// The restriction index is cached and rebuilt only when the backing
/// frame's version counter has advanced, so any number of live views stay
/// consistent with mutations made through the frame or through each other.
#[derive(Debug, Clone)]
pub struct TimePointFrame {
    frame: FrameId,
    time_level: usize,
    time: Value,
    restriction: Vec<RowKey>,
    observed_version: Option<u64>,
}

impl TimePointFrame {
    /// Fixes `time_column` (which must be an index column of the frame) at
    /// `time`.
    pub fn new(
        store: &FrameStore,
        frame: FrameId,
        time_column: &str,
        time: impl Into<Value>,
    ) -> Result<Self> {
        let schema = store.schema(frame)?;
        let time_level = schema.index_position(time_column).ok_or_else(|| {
            FrameError::UnknownColumn(time_column.to_string(), schema.name().to_string())
        })?;
        Ok(Self {
            frame,
            time_level,
            time: time.into(),
            restriction: Vec::new(),
            observed_version: None,
        })
    }

    pub fn time(&self) -> &Value {
        &self.time
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Rebuilds the restriction index iff the backing frame has mutated
    /// since it was last built. Every public operation goes through this.
    pub fn refresh(&mut self, store: &FrameStore) -> Result<()> {
        let version = store.version(self.frame)?;
        if self.observed_version == Some(version) {
            return Ok(());
        }
        self.restriction = store
            .keys(self.frame)?
            .into_iter()
            .filter(|key| key.get(self.time_level) == Some(&self.time))
            .collect();
        self.observed_version = Some(version);
        debug!(
            "time-point view on frame '{}' refreshed: {} rows at {}",
            store.frame_name(self.frame)?,
            self.restriction.len(),
            self.time
        );
        Ok(())
    }

    fn full_key(&self, short: &RowKey) -> RowKey {
        let mut key = Vec::with_capacity(short.len() + 1);
        key.extend_from_slice(&short[..self.time_level.min(short.len())]);
        key.push(self.time.clone());
        if self.time_level < short.len() {
            key.extend_from_slice(&short[self.time_level..]);
        }
        key
    }

    fn short_key(&self, mut full: RowKey) -> RowKey {
        if self.time_level < full.len() {
            full.remove(self.time_level);
        }
        full
    }

    /// Reads one column over the rows at this time point. Reported keys
    /// have the time component removed.
    pub fn get(&mut self, store: &mut FrameStore, column: &str) -> Result<ColumnSlice> {
        self.refresh(store)?;
        let slice = store.get(
            self.frame,
            column,
            &self.restriction.clone().into(),
        )?;
        let level = self.time_level;
        Ok(slice.map_keys(|mut key| {
            if level < key.len() {
                key.remove(level);
            }
            key
        }))
    }

    /// Single-row read by short key, unwrapped to its value. `None` when
    /// the row does not exist at this time point.
    pub fn get_one(
        &mut self,
        store: &mut FrameStore,
        short_key: &RowKey,
        column: &str,
    ) -> Result<Option<Value>> {
        self.refresh(store)?;
        store.get_one(self.frame, column, &self.full_key(short_key))
    }

    /// Upserts through the view; every short identifier gains the fixed
    /// time component before delegation.
    pub fn update(
        &mut self,
        store: &mut FrameStore,
        short_ids: &[RowKey],
        patch: &RowPatch,
        opts: UpdateOptions,
    ) -> Result<()> {
        self.refresh(store)?;
        let ids: Vec<RowKey> = short_ids.iter().map(|k| self.full_key(k)).collect();
        store.update(self.frame, &ids, patch, opts)
    }

    /// Drops rows at this time point, addressed by short key.
    pub fn drop_rows(
        &mut self,
        store: &mut FrameStore,
        short_ids: &[RowKey],
        skip_log: bool,
    ) -> Result<()> {
        self.refresh(store)?;
        let ids: Vec<RowKey> = short_ids.iter().map(|k| self.full_key(k)).collect();
        store.drop_rows(self.frame, &ids, skip_log)
    }

    pub fn undo(&mut self, store: &mut FrameStore) -> Result<UndoOutcome> {
        store.undo(self.frame)
    }

    pub fn redo(&mut self, store: &mut FrameStore) -> Result<UndoOutcome> {
        store.redo(self.frame)
    }

    /// Rows visible at this time point.
    pub fn row_count(&mut self, store: &FrameStore) -> Result<usize> {
        self.refresh(store)?;
        Ok(self.restriction.len())
    }

    /// Keys at this time point with the time component removed.
    pub fn keys(&mut self, store: &FrameStore) -> Result<Vec<RowKey>> {
        self.refresh(store)?;
        Ok(self
            .restriction
            .iter()
            .map(|k| self.short_key(k.clone()))
            .collect())
    }

    pub fn columns(&self, store: &FrameStore) -> Result<Vec<String>> {
        store.columns(self.frame)
    }

    /// A projection of a related frame fixed at the same time value, so
    /// chained cross-frame access stays time-consistent. The sibling frame
    /// must index the same time column.
    pub fn sibling(&self, store: &FrameStore, frame_name: &str) -> Result<TimePointFrame> {
        let schema = store.schema(self.frame)?;
        let time_column = match schema.index().get(self.time_level) {
            Some(col) => col.name.clone(),
            None => {
                return Err(FrameError::Schema(format!(
                    "time level {} out of range for frame '{}'",
                    self.time_level,
                    schema.name()
                )));
            }
        };
        let sibling = store.frame_id(frame_name)?;
        TimePointFrame::new(store, sibling, &time_column, self.time.clone())
    }
}
