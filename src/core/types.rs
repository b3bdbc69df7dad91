use super::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index tuple uniquely identifying one row of a frame. The values are
/// ordered like the frame's declared index columns.
pub type RowKey = Vec<Value>;

/// Builds a `RowKey` from anything convertible to `Value`.
pub fn row_key<I, V>(parts: I) -> RowKey
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    parts.into_iter().map(Into::into).collect()
}

/// Stored (non-index) column values of one row, aligned with the frame
/// schema's stored-column order. `modified` is refreshed on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub values: Vec<Value>,
    pub modified: DateTime<Utc>,
}

impl StoredRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            modified: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }
}

/// Partial assignment of stored columns, used by `update` (upsert).
/// Columns not mentioned keep their current value, or take the schema
/// default when the update creates the row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPatch {
    entries: BTreeMap<String, Value>,
}

impl RowPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Which rows a read targets.
#[derive(Debug, Clone)]
pub enum RowSelector {
    All,
    One(RowKey),
    Many(Vec<RowKey>),
}

impl RowSelector {
    pub fn one<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::One(row_key(parts))
    }
}

impl From<RowKey> for RowSelector {
    fn from(key: RowKey) -> Self {
        Self::One(key)
    }
}

impl From<Vec<RowKey>> for RowSelector {
    fn from(keys: Vec<RowKey>) -> Self {
        Self::Many(keys)
    }
}

/// Result of a column read: parallel key/value vectors in index order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSlice {
    keys: Vec<RowKey>,
    values: Vec<Value>,
}

impl ColumnSlice {
    pub fn new(keys: Vec<RowKey>, values: Vec<Value>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        Self { keys, values }
    }

    pub fn empty() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Unwraps a single-row slice to its value. `None` when the slice is
    /// empty or holds more than one row.
    pub fn scalar(&self) -> Option<&Value> {
        if self.values.len() == 1 {
            self.values.first()
        } else {
            None
        }
    }

    pub fn get(&self, key: &RowKey) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowKey, &Value)> {
        self.keys.iter().zip(self.values.iter())
    }

    /// Remaps every key through `f`, keeping value alignment. Used by
    /// time-point views to report keys without the time component.
    pub fn map_keys(self, f: impl Fn(RowKey) -> RowKey) -> Self {
        Self {
            keys: self.keys.into_iter().map(f).collect(),
            values: self.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_builder() {
        let patch = RowPatch::new().set("len", 2.5).set("note", "ok");
        assert_eq!(patch.len(), 2);
        assert_eq!(patch.get("len"), Some(&Value::Float(2.5)));
        assert_eq!(patch.get("missing"), None);
    }

    #[test]
    fn test_slice_scalar() {
        let one = ColumnSlice::new(vec![row_key([1i64])], vec![Value::Int(7)]);
        assert_eq!(one.scalar(), Some(&Value::Int(7)));
        assert_eq!(ColumnSlice::empty().scalar(), None);

        let two = ColumnSlice::new(
            vec![row_key([1i64]), row_key([2i64])],
            vec![Value::Int(1), Value::Int(2)],
        );
        assert_eq!(two.scalar(), None);
    }

    #[test]
    fn test_slice_lookup() {
        let slice = ColumnSlice::new(
            vec![row_key([1i64, 0i64]), row_key([2i64, 0i64])],
            vec![Value::Float(1.0), Value::Float(2.0)],
        );
        assert_eq!(slice.get(&row_key([2i64, 0i64])), Some(&Value::Float(2.0)));
        assert_eq!(slice.get(&row_key([3i64, 0i64])), None);
    }
}
