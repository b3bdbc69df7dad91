use super::log::MutationLog;
use crate::core::{ColumnSlice, FrameError, Result, RowKey, RowPatch, RowSelector, StoredRow, Value};
use crate::schema::{ColumnKind, FrameSchema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The versioned table of one entity type: raw stored rows keyed by index
/// tuple, a monotonic version counter, the row-granular computed-value
/// cache, and the reversible mutation log.
///
/// Engines are owned by a `FrameStore`; cross-frame resolution and
/// dependent invalidation happen there.
#[derive(Debug, Clone)]
pub struct FrameEngine {
    schema: FrameSchema,
    rows: BTreeMap<RowKey, StoredRow>,
    version: u64,
    /// `column -> key -> value`. A present entry is valid: every mutation
    /// path removes exactly the dependent rows before returning.
    cache: HashMap<String, BTreeMap<RowKey, Value>>,
    pub(crate) log: MutationLog,
}

/// Rows actually changed by an `apply_update` call.
#[derive(Debug)]
pub(crate) struct UpdateOutcome {
    pub keys: Vec<RowKey>,
    pub old: Vec<Option<StoredRow>>,
    pub new: Vec<StoredRow>,
    /// Stored columns whose cached dependents must be invalidated.
    pub columns: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct DropOutcome {
    pub keys: Vec<RowKey>,
    pub old: Vec<StoredRow>,
}

/// Stored columns of one frame in serializable form. Computed columns are
/// never part of a snapshot; they are recomputed on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFrameSnapshot {
    pub frame: String,
    pub index_columns: Vec<String>,
    pub stored_columns: Vec<String>,
    pub rows: Vec<(RowKey, StoredRow)>,
}

impl FrameEngine {
    pub(crate) fn new(schema: FrameSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            version: 0,
            cache: HashMap::new(),
            log: MutationLog::new(),
        }
    }

    pub fn schema(&self) -> &FrameSchema {
        &self.schema
    }

    pub(crate) fn schema_mut(&mut self) -> &mut FrameSchema {
        &mut self.schema
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn keys(&self) -> Vec<RowKey> {
        self.rows.keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &RowKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn modified_at(&self, key: &RowKey) -> Option<chrono::DateTime<chrono::Utc>> {
        self.rows.get(key).map(|r| r.modified)
    }

    /// Non-index column names, in declaration order.
    pub fn columns(&self) -> Vec<&str> {
        self.schema.columns().iter().map(|c| c.name.as_str()).collect()
    }

    pub(crate) fn resolve_selector(&self, selector: &RowSelector) -> Vec<RowKey> {
        match selector {
            RowSelector::All => self.keys(),
            RowSelector::One(key) => {
                if self.rows.contains_key(key) {
                    vec![key.clone()]
                } else {
                    Vec::new()
                }
            }
            RowSelector::Many(keys) => keys
                .iter()
                .filter(|k| self.rows.contains_key(*k))
                .cloned()
                .collect(),
        }
    }

    /// Value of an index or stored column at one row. `None` when the row
    /// is absent.
    pub(crate) fn raw_value(&self, key: &RowKey, column: &str) -> Option<Value> {
        if let Some(level) = self.schema.index_position(column) {
            return key.get(level).cloned();
        }
        let pos = self.schema.stored_position(column)?;
        self.rows.get(key).map(|row| row.values[pos].clone())
    }

    /// Reads an index or stored column for the given keys.
    pub(crate) fn stored_slice(&self, column: &str, keys: &[RowKey]) -> Result<ColumnSlice> {
        if self.schema.index_position(column).is_none()
            && self.schema.stored_position(column).is_none()
        {
            return Err(FrameError::UnknownColumn(
                column.to_string(),
                self.schema.name().to_string(),
            ));
        }
        let values = keys
            .iter()
            .map(|k| self.raw_value(k, column).unwrap_or(Value::Null))
            .collect();
        Ok(ColumnSlice::new(keys.to_vec(), values))
    }

    /// Validates, then upserts. Returns `None` when every targeted row
    /// already held the patched values (no version bump, no log entry).
    /// Validation completes before any state is touched, so a failing call
    /// leaves the table unchanged.
    pub(crate) fn apply_update(
        &mut self,
        keys: &[RowKey],
        patch: &RowPatch,
    ) -> Result<Option<UpdateOutcome>> {
        let mut positions = Vec::with_capacity(patch.len());
        for (column, value) in patch.iter() {
            let def = self.schema.column(column).ok_or_else(|| {
                if self.schema.index_position(column).is_some() {
                    FrameError::Schema(format!(
                        "index column '{}' of frame '{}' cannot be updated",
                        column,
                        self.schema.name()
                    ))
                } else {
                    FrameError::UnknownColumn(column.to_string(), self.schema.name().to_string())
                }
            })?;
            match &def.kind {
                ColumnKind::Computed { .. } => {
                    return Err(FrameError::Schema(format!(
                        "computed column '{}' of frame '{}' cannot be written",
                        column,
                        self.schema.name()
                    )));
                }
                ColumnKind::Stored { data_type, .. } => {
                    if !data_type.is_compatible(value) {
                        return Err(FrameError::TypeMismatch(format!(
                            "column '{}' of frame '{}' expects {}, got {}",
                            column,
                            self.schema.name(),
                            data_type,
                            value.type_name()
                        )));
                    }
                }
            }
            let pos = self
                .schema
                .stored_position(column)
                .ok_or_else(|| FrameError::UnknownColumn(column.to_string(), self.schema.name().to_string()))?;
            positions.push((pos, value.clone()));
        }
        for key in keys {
            self.schema.validate_key(key)?;
        }

        let mut outcome = UpdateOutcome {
            keys: Vec::new(),
            old: Vec::new(),
            new: Vec::new(),
            columns: patch.columns().map(str::to_string).collect(),
        };
        let mut created = false;

        for key in keys {
            match self.rows.get(key) {
                Some(existing) => {
                    let unchanged = positions
                        .iter()
                        .all(|(pos, value)| existing.values[*pos] == *value);
                    if unchanged {
                        continue;
                    }
                    let old = existing.clone();
                    let mut row = existing.clone();
                    for (pos, value) in &positions {
                        row.values[*pos] = value.clone();
                    }
                    row.touch();
                    self.rows.insert(key.clone(), row.clone());
                    outcome.keys.push(key.clone());
                    outcome.old.push(Some(old));
                    outcome.new.push(row);
                }
                None => {
                    let mut values = self.schema.default_row();
                    for (pos, value) in &positions {
                        values[*pos] = value.clone();
                    }
                    let row = StoredRow::new(values);
                    self.rows.insert(key.clone(), row.clone());
                    outcome.keys.push(key.clone());
                    outcome.old.push(None);
                    outcome.new.push(row);
                    created = true;
                }
            }
        }

        if outcome.keys.is_empty() {
            return Ok(None);
        }
        if created {
            // A new row changes every stored column as far as dependents
            // are concerned.
            outcome.columns = self
                .schema
                .stored_columns()
                .into_iter()
                .map(str::to_string)
                .collect();
        }
        Ok(Some(outcome))
    }

    /// Removes rows. Missing keys are skipped; `None` when nothing existed.
    pub(crate) fn apply_drop(&mut self, keys: &[RowKey]) -> Option<DropOutcome> {
        let mut outcome = DropOutcome {
            keys: Vec::new(),
            old: Vec::new(),
        };
        for key in keys {
            if let Some(row) = self.rows.remove(key) {
                outcome.keys.push(key.clone());
                outcome.old.push(row);
            }
        }
        if outcome.keys.is_empty() {
            None
        } else {
            Some(outcome)
        }
    }

    /// First row (in index order) whose key starts with `prefix`. Keys
    /// sharing a prefix are contiguous under the index's lexicographic
    /// order, so a range scan suffices.
    pub(crate) fn first_key_with_prefix(&self, prefix: &[Value]) -> Option<RowKey> {
        self.rows
            .range(prefix.to_vec()..)
            .next()
            .and_then(|(key, _)| {
                if key.len() >= prefix.len() && key[..prefix.len()] == *prefix {
                    Some(key.clone())
                } else {
                    None
                }
            })
    }

    /// Every row whose key starts with `prefix`.
    pub(crate) fn keys_with_prefix(&self, prefix: &[Value]) -> Vec<RowKey> {
        self.rows
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.len() >= prefix.len() && key[..prefix.len()] == *prefix)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn set_row(&mut self, key: RowKey, row: StoredRow) {
        self.rows.insert(key, row);
    }

    pub(crate) fn remove_row(&mut self, key: &RowKey) -> Option<StoredRow> {
        self.rows.remove(key)
    }

    // -- computed-value cache ------------------------------------------------

    pub(crate) fn cached_value(&self, column: &str, key: &RowKey) -> Option<&Value> {
        self.cache.get(column).and_then(|c| c.get(key))
    }

    pub(crate) fn missing_from_cache(&self, column: &str, keys: &[RowKey]) -> Vec<RowKey> {
        match self.cache.get(column) {
            None => keys.to_vec(),
            Some(cached) => keys
                .iter()
                .filter(|k| !cached.contains_key(*k))
                .cloned()
                .collect(),
        }
    }

    pub(crate) fn insert_cached(&mut self, column: &str, key: RowKey, value: Value) {
        self.cache.entry(column.to_string()).or_default().insert(key, value);
    }

    pub(crate) fn invalidate_rows(&mut self, column: &str, keys: &[RowKey]) {
        if let Some(cached) = self.cache.get_mut(column) {
            for key in keys {
                cached.remove(key);
            }
            if cached.is_empty() {
                self.cache.remove(column);
            }
        }
    }

    pub(crate) fn invalidate_column(&mut self, column: &str) {
        self.cache.remove(column);
    }

    pub(crate) fn invalidate_keys_everywhere(&mut self, keys: &[RowKey]) {
        self.cache.retain(|_, cached| {
            for key in keys {
                cached.remove(key);
            }
            !cached.is_empty()
        });
    }

    pub(crate) fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Cached row count of one computed column, for tests and diagnostics.
    pub fn cached_rows(&self, column: &str) -> usize {
        self.cache.get(column).map_or(0, BTreeMap::len)
    }

    // -- raw snapshots -------------------------------------------------------

    /// Serializable copy of the stored columns only.
    pub fn raw_snapshot(&self) -> RawFrameSnapshot {
        RawFrameSnapshot {
            frame: self.schema.name().to_string(),
            index_columns: self.schema.index().iter().map(|c| c.name.clone()).collect(),
            stored_columns: self
                .schema
                .stored_columns()
                .into_iter()
                .map(str::to_string)
                .collect(),
            rows: self
                .rows
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Replaces the backing table from a raw snapshot. Cache and log are
    /// cleared; computed columns will be re-derived on demand.
    pub(crate) fn load_raw(&mut self, snapshot: RawFrameSnapshot) -> Result<()> {
        let stored: Vec<String> = self
            .schema
            .stored_columns()
            .into_iter()
            .map(str::to_string)
            .collect();
        if snapshot.stored_columns != stored {
            return Err(FrameError::Schema(format!(
                "snapshot stored columns {:?} do not match frame '{}'",
                snapshot.stored_columns,
                self.schema.name()
            )));
        }
        for (key, row) in &snapshot.rows {
            self.schema.validate_key(key)?;
            if row.values.len() != stored.len() {
                return Err(FrameError::Schema(format!(
                    "snapshot row for key {:?} has {} values, frame '{}' stores {}",
                    key,
                    row.values.len(),
                    self.schema.name(),
                    stored.len()
                )));
            }
        }
        self.rows = snapshot.rows.into_iter().collect();
        self.clear_cache();
        self.log.clear();
        self.bump_version();
        Ok(())
    }
}
