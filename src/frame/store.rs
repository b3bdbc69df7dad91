use super::compute::{ComputeView, ForeignInput};
use super::engine::{FrameEngine, RawFrameSnapshot};
use super::log::{Mutation, UndoOutcome};
use crate::core::{ColumnSlice, FrameError, Result, RowKey, RowPatch, RowSelector, Value};
use crate::schema::{AttributeDecl, ColumnDef, ColumnKind, ComputeFn, DependencyDecl, FrameSchema};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Typed handle into a store's frame arena. Resolved from a name once, at
/// registration or via `frame_id`; all operations address frames by handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub(crate) usize);

/// Knobs for `update`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Coalesce into the most recent log entry instead of extending the log.
    pub replace_log: bool,
    /// Do not log at all (used internally by undo/redo replay).
    pub skip_log: bool,
}

impl UpdateOptions {
    pub fn replace_log() -> Self {
        Self {
            replace_log: true,
            skip_log: false,
        }
    }

    pub fn skip_log() -> Self {
        Self {
            replace_log: false,
            skip_log: true,
        }
    }
}

/// Owner of every registered frame. Holds the schema registry (name to
/// handle map plus per-frame declarations), the transitive dependents
/// closure used for invalidation, and the reentrancy stack guarding
/// computed-column evaluation.
///
/// The store is an explicit value: construct one at startup and pass it
/// (or a handle to it) wherever frames are consumed. It assumes a single
/// logical writer; wrap it in external synchronization when shared across
/// threads.
#[derive(Debug, Default)]
pub struct FrameStore {
    frames: Vec<FrameEngine>,
    names: HashMap<String, FrameId>,
    /// `(frame, column) -> every computed column that (transitively) reads
    /// it`, rebuilt on registration and `add_computed`.
    dependents: HashMap<(FrameId, String), BTreeSet<(FrameId, String)>>,
    /// Columns currently mid-computation, outermost first.
    computing: Vec<(FrameId, String)>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- registration --------------------------------------------------------

    /// Registers a frame. Cross-frame dependency targets must already be
    /// registered; same-frame references are checked against the schema
    /// being registered, so mutually-dependent columns within one frame
    /// register fine and fail at evaluation time instead.
    pub fn register(&mut self, schema: FrameSchema) -> Result<FrameId> {
        if self.names.contains_key(schema.name()) {
            return Err(FrameError::DuplicateFrame(schema.name().to_string()));
        }
        if schema.index().is_empty() {
            return Err(FrameError::Schema(format!(
                "frame '{}' must declare at least one index column",
                schema.name()
            )));
        }

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for col in schema.index() {
            if !seen.insert(col.name.as_str()) {
                return Err(FrameError::Schema(format!(
                    "frame '{}' declares column '{}' more than once",
                    schema.name(),
                    col.name
                )));
            }
        }
        for def in schema.columns() {
            if !seen.insert(def.name.as_str()) {
                return Err(FrameError::Schema(format!(
                    "frame '{}' declares column '{}' more than once",
                    schema.name(),
                    def.name
                )));
            }
        }

        for def in schema.computed_columns() {
            if let Some(dependencies) = def.kind.dependencies() {
                self.validate_dependencies(&schema, &def.name, dependencies)?;
            }
        }
        for (target, columns) in schema.relationships() {
            for col in columns {
                let stored = schema
                    .column(col)
                    .is_some_and(|def| !def.kind.is_computed());
                if schema.index_position(col).is_none() && !stored {
                    return Err(FrameError::Schema(format!(
                        "relationship '{}' -> '{}' names '{}', which is not an index or stored column",
                        schema.name(),
                        target,
                        col
                    )));
                }
            }
        }

        let fid = FrameId(self.frames.len());
        self.names.insert(schema.name().to_string(), fid);
        self.frames.push(FrameEngine::new(schema));
        self.rebuild_dependents();
        Ok(fid)
    }

    /// Registers a computed column at runtime, beyond what the schema
    /// declared. Unless `skip_update`, the column is evaluated eagerly over
    /// every current row.
    pub fn add_computed(
        &mut self,
        fid: FrameId,
        column: impl Into<String>,
        decl: AttributeDecl,
        dependencies: DependencyDecl,
        func: ComputeFn,
        skip_update: bool,
    ) -> Result<()> {
        let column = column.into();
        let (name, dependencies) = {
            let schema = self.engine(fid)?.schema();
            if schema.has_column(&column) {
                return Err(FrameError::Schema(format!(
                    "frame '{}' already declares column '{}'",
                    schema.name(),
                    column
                )));
            }
            let deps = dependencies.normalize(schema.name());
            (schema.name().to_string(), deps)
        };
        {
            // Same-frame references may target the new column itself; the
            // reentrancy guard catches that cycle at evaluation.
            let schema = self.engine(fid)?.schema().clone();
            self.validate_dependencies_with_extra(&schema, &column, &dependencies, &column)?;
        }

        let attributes = decl.normalize(&column);
        self.engine_mut(fid)?.schema_mut().push_column(ColumnDef {
            name: column.clone(),
            kind: ColumnKind::Computed {
                func,
                dependencies,
            },
            attributes,
        });
        self.rebuild_dependents();
        debug!("registered computed column '{}' on frame '{}'", column, name);

        if !skip_update {
            let keys = self.engine(fid)?.keys();
            self.ensure_computed(fid, &column, &keys)?;
        }
        Ok(())
    }

    fn validate_dependencies(
        &self,
        schema: &FrameSchema,
        column: &str,
        dependencies: &BTreeMap<String, Vec<String>>,
    ) -> Result<()> {
        self.validate_dependencies_with_extra(schema, column, dependencies, "")
    }

    /// `extra` names a column about to be added to `schema` (empty for
    /// none), so self-referencing declarations pass registration and fail
    /// lazily via the cycle guard.
    fn validate_dependencies_with_extra(
        &self,
        schema: &FrameSchema,
        column: &str,
        dependencies: &BTreeMap<String, Vec<String>>,
        extra: &str,
    ) -> Result<()> {
        for (dep_frame, dep_cols) in dependencies {
            if dep_frame == schema.name() {
                for col in dep_cols {
                    if !schema.has_column(col) && col != extra {
                        return Err(FrameError::Schema(format!(
                            "computed column '{}' of frame '{}' depends on undeclared column '{}'",
                            column,
                            schema.name(),
                            col
                        )));
                    }
                }
            } else {
                let did = self.names.get(dep_frame).copied().ok_or_else(|| {
                    FrameError::Schema(format!(
                        "computed column '{}' of frame '{}' depends on unregistered frame '{}'",
                        column,
                        schema.name(),
                        dep_frame
                    ))
                })?;
                let sibling = &self.frames[did.0];
                for col in dep_cols {
                    if !sibling.schema().has_column(col) {
                        return Err(FrameError::Schema(format!(
                            "computed column '{}' of frame '{}' depends on undeclared column '{}' of frame '{}'",
                            column,
                            schema.name(),
                            col,
                            dep_frame
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Recomputes the direct dependents map and closes it transitively, so
    /// a mutation of one column finds every downstream computed column in
    /// one lookup.
    fn rebuild_dependents(&mut self) {
        let mut map: HashMap<(FrameId, String), BTreeSet<(FrameId, String)>> = HashMap::new();
        for (i, frame) in self.frames.iter().enumerate() {
            let fid = FrameId(i);
            for def in frame.schema().computed_columns() {
                let Some(dependencies) = def.kind.dependencies() else {
                    continue;
                };
                for (dep_frame, dep_cols) in dependencies {
                    let Some(&did) = self.names.get(dep_frame) else {
                        continue;
                    };
                    for col in dep_cols {
                        map.entry((did, col.clone()))
                            .or_default()
                            .insert((fid, def.name.clone()));
                    }
                }
            }
        }

        loop {
            let mut changed = false;
            let entries: Vec<(FrameId, String)> = map.keys().cloned().collect();
            for key in entries {
                let direct: Vec<(FrameId, String)> = match map.get(&key) {
                    Some(set) => set.iter().cloned().collect(),
                    None => continue,
                };
                let mut additions: BTreeSet<(FrameId, String)> = BTreeSet::new();
                for dep in &direct {
                    if let Some(transitive) = map.get(dep) {
                        for entry in transitive {
                            if *entry == key {
                                continue;
                            }
                            additions.insert(entry.clone());
                        }
                    }
                }
                if let Some(set) = map.get_mut(&key) {
                    let before = set.len();
                    set.extend(additions);
                    changed = changed || set.len() != before;
                }
            }
            if !changed {
                break;
            }
        }
        self.dependents = map;
    }

    // -- lookups -------------------------------------------------------------

    pub fn frame_id(&self, name: &str) -> Result<FrameId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| FrameError::UnknownFrame(name.to_string()))
    }

    pub fn frame(&self, fid: FrameId) -> Result<&FrameEngine> {
        self.engine(fid)
    }

    pub fn schema(&self, fid: FrameId) -> Result<&FrameSchema> {
        Ok(self.engine(fid)?.schema())
    }

    pub fn frame_name(&self, fid: FrameId) -> Result<&str> {
        Ok(self.engine(fid)?.schema().name())
    }

    pub fn version(&self, fid: FrameId) -> Result<u64> {
        Ok(self.engine(fid)?.version())
    }

    pub fn row_count(&self, fid: FrameId) -> Result<usize> {
        Ok(self.engine(fid)?.row_count())
    }

    pub fn keys(&self, fid: FrameId) -> Result<Vec<RowKey>> {
        Ok(self.engine(fid)?.keys())
    }

    /// Non-index column names of the frame.
    pub fn columns(&self, fid: FrameId) -> Result<Vec<String>> {
        Ok(self
            .engine(fid)?
            .columns()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Declared join columns from one frame into another, or `None` when no
    /// relationship exists (callers degrade to the unfiltered frame).
    pub fn resolve_relationship(&self, from: FrameId, to: &str) -> Result<Option<&[String]>> {
        Ok(self.engine(from)?.schema().relationship_to(to))
    }

    /// Columns of this frame currently mid-computation (reentrancy stack
    /// exposure, outermost first).
    pub fn pending_columns(&self, fid: FrameId) -> Vec<String> {
        self.computing
            .iter()
            .filter(|(f, _)| *f == fid)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn undo_depth(&self, fid: FrameId) -> Result<usize> {
        Ok(self.engine(fid)?.log.undo_depth())
    }

    pub fn redo_depth(&self, fid: FrameId) -> Result<usize> {
        Ok(self.engine(fid)?.log.redo_depth())
    }

    fn engine(&self, fid: FrameId) -> Result<&FrameEngine> {
        self.frames
            .get(fid.0)
            .ok_or_else(|| FrameError::UnknownFrame(format!("#{}", fid.0)))
    }

    fn engine_mut(&mut self, fid: FrameId) -> Result<&mut FrameEngine> {
        self.frames
            .get_mut(fid.0)
            .ok_or_else(|| FrameError::UnknownFrame(format!("#{}", fid.0)))
    }

    // -- reads ---------------------------------------------------------------

    /// Reads one column for the selected rows. Stored and index columns
    /// come straight from the backing table; computed columns are derived
    /// on demand and cached row by row, so a second read without an
    /// intervening dependency mutation never re-invokes the callable.
    pub fn get(&mut self, fid: FrameId, column: &str, selector: &RowSelector) -> Result<ColumnSlice> {
        let keys = self.engine(fid)?.resolve_selector(selector);
        let is_computed = {
            let schema = self.engine(fid)?.schema();
            match schema.column(column) {
                Some(def) => def.kind.is_computed(),
                None if schema.index_position(column).is_some() => false,
                None => {
                    return Err(FrameError::UnknownColumn(
                        column.to_string(),
                        schema.name().to_string(),
                    ));
                }
            }
        };
        if !is_computed {
            return self.engine(fid)?.stored_slice(column, &keys);
        }

        self.ensure_computed(fid, column, &keys)?;
        let frame = self.engine(fid)?;
        let values = keys
            .iter()
            .map(|k| frame.cached_value(column, k).cloned().unwrap_or(Value::Null))
            .collect();
        Ok(ColumnSlice::new(keys, values))
    }

    /// Convenience: single-row read unwrapped to its value. `None` when the
    /// row is absent.
    pub fn get_one(&mut self, fid: FrameId, column: &str, key: &RowKey) -> Result<Option<Value>> {
        let slice = self.get(fid, column, &RowSelector::One(key.clone()))?;
        Ok(slice.scalar().cloned())
    }

    /// Guarantees the cache holds `column` for every one of `keys`,
    /// computing the missing subset. The reentrancy stack entry is released
    /// on every exit path, error paths included.
    fn ensure_computed(&mut self, fid: FrameId, column: &str, keys: &[RowKey]) -> Result<()> {
        if self.computing.iter().any(|(f, c)| *f == fid && c == column) {
            let name = self.frame_name(fid)?.to_string();
            return Err(FrameError::CyclicDependency(column.to_string(), name));
        }

        let missing = self.engine(fid)?.missing_from_cache(column, keys);
        if missing.is_empty() {
            return Ok(());
        }

        self.computing.push((fid, column.to_string()));
        let result = self.compute_missing(fid, column, &missing);
        self.computing.pop();
        result
    }

    fn compute_missing(&mut self, fid: FrameId, column: &str, missing: &[RowKey]) -> Result<()> {
        let (func, dependencies, own_name) = {
            let schema = self.engine(fid)?.schema();
            let def = schema.column(column).ok_or_else(|| {
                FrameError::UnknownColumn(column.to_string(), schema.name().to_string())
            })?;
            match &def.kind {
                ColumnKind::Computed { func, dependencies } => (
                    func.clone(),
                    dependencies.clone(),
                    schema.name().to_string(),
                ),
                ColumnKind::Stored { .. } => return Ok(()),
            }
        };

        // Resolve every declared dependency first, so the assembled view
        // only reads settled values.
        for (dep_frame, dep_cols) in &dependencies {
            if dep_frame == &own_name {
                for dep_col in dep_cols {
                    if self.is_computed_column(fid, dep_col) {
                        self.ensure_computed(fid, dep_col, missing)?;
                    }
                }
            } else {
                let did = self.frame_id(dep_frame)?;
                let relationship = self
                    .engine(fid)?
                    .schema()
                    .relationship_to(dep_frame)
                    .map(<[String]>::to_vec);
                let sibling_keys = match &relationship {
                    Some(rel_cols) => self.matched_sibling_keys(fid, did, rel_cols, missing)?,
                    None => self.engine(did)?.keys(),
                };
                for dep_col in dep_cols {
                    if self.is_computed_column(did, dep_col) {
                        self.ensure_computed(did, dep_col, &sibling_keys)?;
                    }
                }
            }
        }

        let view = self.assemble_view(fid, column, &dependencies, missing)?;
        debug!(
            "computing column '{}' of frame '{}' for {} rows",
            column,
            own_name,
            missing.len()
        );
        let values = func(&view)?;
        if values.len() != missing.len() {
            return Err(FrameError::Compute(
                column.to_string(),
                format!(
                    "callable returned {} values for {} rows",
                    values.len(),
                    missing.len()
                ),
            ));
        }

        let frame = self.engine_mut(fid)?;
        for (key, value) in missing.iter().zip(values) {
            frame.insert_cached(column, key.clone(), value);
        }
        Ok(())
    }

    fn is_computed_column(&self, fid: FrameId, column: &str) -> bool {
        self.frames
            .get(fid.0)
            .and_then(|f| f.schema().column(column))
            .is_some_and(|def| def.kind.is_computed())
    }

    /// Join tuple of one source row: values of the relationship's source
    /// columns, taken from the index or the stored row.
    fn join_tuple(&self, fid: FrameId, key: &RowKey, rel_cols: &[String]) -> Result<Vec<Value>> {
        let frame = self.engine(fid)?;
        Ok(rel_cols
            .iter()
            .map(|c| frame.raw_value(key, c).unwrap_or(Value::Null))
            .collect())
    }

    /// Sibling rows reached from `source_keys` through the declared
    /// relationship: every sibling key whose index starts with a source
    /// row's join tuple.
    fn matched_sibling_keys(
        &self,
        fid: FrameId,
        did: FrameId,
        rel_cols: &[String],
        source_keys: &[RowKey],
    ) -> Result<Vec<RowKey>> {
        let mut matched: BTreeSet<RowKey> = BTreeSet::new();
        for key in source_keys {
            let tuple = self.join_tuple(fid, key, rel_cols)?;
            for sibling_key in self.engine(did)?.keys_with_prefix(&tuple) {
                matched.insert(sibling_key);
            }
        }
        Ok(matched.into_iter().collect())
    }

    /// Values of one column (index, stored, or already-computed) for the
    /// given keys, aligned.
    fn column_values_for_keys(
        &self,
        fid: FrameId,
        column: &str,
        keys: &[RowKey],
    ) -> Result<Vec<Value>> {
        let frame = self.engine(fid)?;
        let schema = frame.schema();
        if schema.index_position(column).is_some() || schema.stored_position(column).is_some() {
            return Ok(keys
                .iter()
                .map(|k| frame.raw_value(k, column).unwrap_or(Value::Null))
                .collect());
        }
        match schema.column(column) {
            Some(def) if def.kind.is_computed() => Ok(keys
                .iter()
                .map(|k| frame.cached_value(column, k).cloned().unwrap_or(Value::Null))
                .collect()),
            _ => Err(FrameError::UnknownColumn(
                column.to_string(),
                schema.name().to_string(),
            )),
        }
    }

    fn assemble_view(
        &self,
        fid: FrameId,
        column: &str,
        dependencies: &BTreeMap<String, Vec<String>>,
        keys: &[RowKey],
    ) -> Result<ComputeView> {
        let own_name = self.frame_name(fid)?.to_string();
        let mut local: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        let mut foreign: BTreeMap<String, ForeignInput> = BTreeMap::new();

        for (dep_frame, dep_cols) in dependencies {
            if dep_frame == &own_name {
                for dep_col in dep_cols {
                    local.insert(
                        dep_col.clone(),
                        self.column_values_for_keys(fid, dep_col, keys)?,
                    );
                }
                continue;
            }

            let did = self.frame_id(dep_frame)?;
            let relationship = self.engine(fid)?.schema().relationship_to(dep_frame);
            let input = match relationship {
                Some(rel_cols) => {
                    let rel_cols = rel_cols.to_vec();
                    let mut matches: Vec<Option<RowKey>> = Vec::with_capacity(keys.len());
                    for key in keys {
                        let tuple = self.join_tuple(fid, key, &rel_cols)?;
                        matches.push(self.engine(did)?.first_key_with_prefix(&tuple));
                    }
                    let mut columns: BTreeMap<String, Vec<Value>> = BTreeMap::new();
                    let sibling = self.engine(did)?;
                    for dep_col in dep_cols {
                        let values = matches
                            .iter()
                            .map(|m| match m {
                                Some(k) => {
                                    if self.is_computed_column(did, dep_col) {
                                        sibling
                                            .cached_value(dep_col, k)
                                            .cloned()
                                            .unwrap_or(Value::Null)
                                    } else {
                                        sibling.raw_value(k, dep_col).unwrap_or(Value::Null)
                                    }
                                }
                                None => Value::Null,
                            })
                            .collect();
                        columns.insert(dep_col.clone(), values);
                    }
                    ForeignInput::Joined(columns)
                }
                None => {
                    // Permissive fallback: no relationship declared, the
                    // callable sees the whole sibling frame.
                    let sibling_keys = self.engine(did)?.keys();
                    let mut columns: BTreeMap<String, Vec<Value>> = BTreeMap::new();
                    for dep_col in dep_cols {
                        columns.insert(
                            dep_col.clone(),
                            self.column_values_for_keys(did, dep_col, &sibling_keys)?,
                        );
                    }
                    ForeignInput::Unfiltered {
                        keys: sibling_keys,
                        columns,
                    }
                }
            };
            foreign.insert(dep_frame.clone(), input);
        }

        Ok(ComputeView::new(
            column.to_string(),
            keys.to_vec(),
            local,
            foreign,
        ))
    }

    // -- mutations -----------------------------------------------------------

    /// Upserts `patch` into the rows identified by `ids`, creating rows that
    /// do not exist. Bumps the version by exactly one when anything
    /// effectively changed, invalidates every dependent cached row (here and
    /// in related frames), and logs for undo unless suppressed.
    pub fn update(
        &mut self,
        fid: FrameId,
        ids: &[RowKey],
        patch: &RowPatch,
        opts: UpdateOptions,
    ) -> Result<()> {
        let Some(outcome) = self.engine_mut(fid)?.apply_update(ids, patch)? else {
            return Ok(());
        };
        self.engine_mut(fid)?.bump_version();
        self.invalidate_dependents(fid, &outcome.columns, &outcome.keys)?;
        if !opts.skip_log {
            self.engine_mut(fid)?.log.push(
                Mutation::Update {
                    keys: outcome.keys,
                    old: outcome.old,
                    new: outcome.new,
                    columns: outcome.columns,
                },
                opts.replace_log,
            );
        }
        Ok(())
    }

    /// Removes the identified rows. Missing keys are skipped; removing
    /// nothing is a no-op without a version bump.
    pub fn drop_rows(&mut self, fid: FrameId, ids: &[RowKey], skip_log: bool) -> Result<()> {
        let Some(outcome) = self.engine_mut(fid)?.apply_drop(ids) else {
            return Ok(());
        };
        self.engine_mut(fid)?.bump_version();
        self.engine_mut(fid)?.invalidate_keys_everywhere(&outcome.keys);
        let columns = self.stored_column_names(fid)?;
        self.invalidate_dependents(fid, &columns, &outcome.keys)?;
        if !skip_log {
            self.engine_mut(fid)?.log.push(
                Mutation::Drop {
                    keys: outcome.keys,
                    old: outcome.old,
                },
                false,
            );
        }
        Ok(())
    }

    /// Reverses the most recent logged mutation. An empty log is a safe
    /// no-op.
    pub fn undo(&mut self, fid: FrameId) -> Result<UndoOutcome> {
        let Some(mutation) = self.engine_mut(fid)?.log.take_undo() else {
            return Ok(UndoOutcome::NothingToUndo);
        };
        match &mutation {
            Mutation::Update {
                keys,
                old,
                columns,
                ..
            } => {
                let mut removed: Vec<RowKey> = Vec::new();
                {
                    let frame = self.engine_mut(fid)?;
                    for (key, old_row) in keys.iter().zip(old) {
                        match old_row {
                            Some(row) => frame.set_row(key.clone(), row.clone()),
                            None => {
                                frame.remove_row(key);
                                removed.push(key.clone());
                            }
                        }
                    }
                    frame.bump_version();
                    frame.invalidate_keys_everywhere(&removed);
                }
                self.invalidate_dependents(fid, columns, keys)?;
            }
            Mutation::Drop { keys, old } => {
                {
                    let frame = self.engine_mut(fid)?;
                    for (key, row) in keys.iter().zip(old) {
                        frame.set_row(key.clone(), row.clone());
                    }
                    frame.bump_version();
                }
                let columns = self.stored_column_names(fid)?;
                self.invalidate_dependents(fid, &columns, keys)?;
            }
        }
        debug!("undo applied on frame '{}'", self.frame_name(fid)?);
        Ok(UndoOutcome::Applied)
    }

    /// Replays the most recently undone mutation. An empty redo tail is a
    /// safe no-op.
    pub fn redo(&mut self, fid: FrameId) -> Result<UndoOutcome> {
        let Some(mutation) = self.engine_mut(fid)?.log.take_redo() else {
            return Ok(UndoOutcome::NothingToRedo);
        };
        match &mutation {
            Mutation::Update {
                keys,
                new,
                columns,
                ..
            } => {
                {
                    let frame = self.engine_mut(fid)?;
                    for (key, row) in keys.iter().zip(new) {
                        frame.set_row(key.clone(), row.clone());
                    }
                    frame.bump_version();
                }
                self.invalidate_dependents(fid, columns, keys)?;
            }
            Mutation::Drop { keys, .. } => {
                {
                    let frame = self.engine_mut(fid)?;
                    for key in keys {
                        frame.remove_row(key);
                    }
                    frame.bump_version();
                    frame.invalidate_keys_everywhere(keys);
                }
                let columns = self.stored_column_names(fid)?;
                self.invalidate_dependents(fid, &columns, keys)?;
            }
        }
        debug!("redo applied on frame '{}'", self.frame_name(fid)?);
        Ok(UndoOutcome::Applied)
    }

    fn stored_column_names(&self, fid: FrameId) -> Result<Vec<String>> {
        Ok(self
            .engine(fid)?
            .schema()
            .stored_columns()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Removes every cached computed value that (transitively) depends on
    /// the given columns of the mutated frame. Same-frame dependents lose
    /// exactly the mutated rows; dependents in related frames lose the rows
    /// reverse-mapped through their declared relationship, or the whole
    /// column when no relationship exists.
    fn invalidate_dependents(
        &mut self,
        fid: FrameId,
        columns: &[String],
        keys: &[RowKey],
    ) -> Result<()> {
        let mut targets: BTreeSet<(FrameId, String)> = BTreeSet::new();
        for column in columns {
            if let Some(deps) = self.dependents.get(&(fid, column.clone())) {
                targets.extend(deps.iter().cloned());
            }
        }
        if targets.is_empty() {
            return Ok(());
        }

        let mutated_name = self.frame_name(fid)?.to_string();
        for (dep_fid, dep_col) in targets {
            if dep_fid == fid {
                self.engine_mut(dep_fid)?.invalidate_rows(&dep_col, keys);
                continue;
            }
            let relationship = self
                .engine(dep_fid)?
                .schema()
                .relationship_to(&mutated_name)
                .map(<[String]>::to_vec);
            match relationship {
                Some(rel_cols) => {
                    let affected = self.reverse_map_keys(dep_fid, &rel_cols, keys)?;
                    debug!(
                        "invalidating {} rows of '{}.{}' after mutation of '{}'",
                        affected.len(),
                        self.frame_name(dep_fid)?,
                        dep_col,
                        mutated_name
                    );
                    self.engine_mut(dep_fid)?.invalidate_rows(&dep_col, &affected);
                }
                None => {
                    debug!(
                        "invalidating all of '{}.{}' after mutation of '{}' (no relationship)",
                        self.frame_name(dep_fid)?,
                        dep_col,
                        mutated_name
                    );
                    self.engine_mut(dep_fid)?.invalidate_column(&dep_col);
                }
            }
        }
        Ok(())
    }

    /// Rows of `dep_fid` whose join tuple matches a prefix of any mutated
    /// key; the reverse direction of the relationship join.
    fn reverse_map_keys(
        &self,
        dep_fid: FrameId,
        rel_cols: &[String],
        changed_keys: &[RowKey],
    ) -> Result<Vec<RowKey>> {
        let width = rel_cols.len();
        let prefixes: BTreeSet<Vec<Value>> = changed_keys
            .iter()
            .map(|k| k[..width.min(k.len())].to_vec())
            .collect();
        let mut affected = Vec::new();
        for key in self.engine(dep_fid)?.keys() {
            let tuple = self.join_tuple(dep_fid, &key, rel_cols)?;
            if prefixes.contains(&tuple) {
                affected.push(key);
            }
        }
        Ok(affected)
    }

    // -- clones & snapshots --------------------------------------------------

    /// Shallow copy of the frame with the cache cleared for every computed
    /// column depending (transitively) on `dependency_key`. `None` when
    /// this frame has no such dependents.
    pub fn invalid_clone(&self, fid: FrameId, dependency_key: &str) -> Option<FrameEngine> {
        let deps = self
            .dependents
            .get(&(fid, dependency_key.to_string()))?;
        let own: Vec<&String> = deps
            .iter()
            .filter(|(f, _)| *f == fid)
            .map(|(_, c)| c)
            .collect();
        if own.is_empty() {
            return None;
        }
        let mut clone = self.frames.get(fid.0)?.clone();
        for column in own {
            clone.invalidate_column(column);
        }
        Some(clone)
    }

    /// Serializable copy of the frame's stored columns. Computed columns
    /// are never persisted; they are re-derived after `load_raw`.
    pub fn raw_snapshot(&self, fid: FrameId) -> Result<RawFrameSnapshot> {
        Ok(self.engine(fid)?.raw_snapshot())
    }

    /// Replaces the frame's backing table from a raw snapshot, clearing its
    /// cache and log, and invalidating every dependent column in related
    /// frames.
    pub fn load_raw(&mut self, fid: FrameId, snapshot: RawFrameSnapshot) -> Result<()> {
        self.engine_mut(fid)?.load_raw(snapshot)?;
        let columns = self.stored_column_names(fid)?;
        let mut targets: BTreeSet<(FrameId, String)> = BTreeSet::new();
        for column in &columns {
            if let Some(deps) = self.dependents.get(&(fid, column.clone())) {
                targets.extend(deps.iter().cloned());
            }
        }
        for (dep_fid, dep_col) in targets {
            if dep_fid != fid {
                self.engine_mut(dep_fid)?.invalidate_column(&dep_col);
            }
        }
        Ok(())
    }
}
