use super::attributes::{AttributeDecl, ColumnAttributes, ColumnKind, ComputeFn, DependencyDecl};
use crate::core::{DataType, FrameError, Result, Value};
use std::collections::BTreeMap;

/// One level of a frame's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: String,
    pub data_type: DataType,
}

impl IndexColumn {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// One declared column: kind plus normalized attributes.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    pub attributes: ColumnAttributes,
}

/// Declaration of one frame: index columns, stored and computed columns
/// (ordered), and relationships used to join into sibling frames.
#[derive(Debug, Clone)]
pub struct FrameSchema {
    name: String,
    index: Vec<IndexColumn>,
    columns: Vec<ColumnDef>,
    relationships: BTreeMap<String, Vec<String>>,
}

impl FrameSchema {
    pub fn new<I>(name: impl Into<String>, index: I) -> Self
    where
        I: IntoIterator<Item = IndexColumn>,
    {
        Self {
            name: name.into(),
            index: index.into_iter().collect(),
            columns: Vec::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Declares a stored column with auto-generated attributes.
    pub fn stored(self, name: impl Into<String>, data_type: DataType, default: Value) -> Self {
        self.stored_with(name, data_type, default, AttributeDecl::new())
    }

    /// Declares a stored column with explicit attributes.
    pub fn stored_with(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        default: Value,
        decl: AttributeDecl,
    ) -> Self {
        let name = name.into();
        let attributes = decl.normalize(&name);
        self.columns.push(ColumnDef {
            name,
            kind: ColumnKind::Stored { data_type, default },
            attributes,
        });
        self
    }

    /// Declares a computed column. The dependency declaration is normalized
    /// against this frame's name.
    pub fn computed(
        mut self,
        name: impl Into<String>,
        decl: AttributeDecl,
        dependencies: DependencyDecl,
        func: ComputeFn,
    ) -> Self {
        let name = name.into();
        let attributes = decl.normalize(&name);
        let dependencies = dependencies.normalize(&self.name);
        self.columns.push(ColumnDef {
            name,
            kind: ColumnKind::Computed { func, dependencies },
            attributes,
        });
        self
    }

    /// Declares the join columns mapping this frame's rows into
    /// `target_frame`'s index. Source columns may be index or stored
    /// columns of this frame.
    pub fn relationship<I, S>(mut self, target_frame: impl Into<String>, source_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships.insert(
            target_frame.into(),
            source_columns.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &[IndexColumn] {
        &self.index
    }

    pub fn index_position(&self, column: &str) -> Option<usize> {
        self.index.iter().position(|c| c.name == column)
    }

    /// `level = None` asks whether the column is any index level.
    pub fn is_index_column(&self, column: &str, level: Option<usize>) -> bool {
        match level {
            None => self.index_position(column).is_some(),
            Some(l) => self.index.get(l).is_some_and(|c| c.name == column),
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some() || self.index_position(name).is_some()
    }

    pub fn attributes_of(&self, name: &str) -> Result<&ColumnAttributes> {
        self.column(name)
            .map(|c| &c.attributes)
            .ok_or_else(|| FrameError::UnknownColumn(name.to_string(), self.name.clone()))
    }

    /// Names of stored columns in declaration order; `StoredRow.values`
    /// aligns with this.
    pub fn stored_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| !c.kind.is_computed())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Position of `name` among the stored columns.
    pub fn stored_position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .filter(|c| !c.kind.is_computed())
            .position(|c| c.name == name)
    }

    pub fn computed_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.kind.is_computed())
    }

    /// Default values for a fresh row, aligned with `stored_columns`.
    pub fn default_row(&self) -> Vec<Value> {
        self.columns
            .iter()
            .filter_map(|c| match &c.kind {
                ColumnKind::Stored { default, .. } => Some(default.clone()),
                ColumnKind::Computed { .. } => None,
            })
            .collect()
    }

    pub fn relationship_to(&self, target_frame: &str) -> Option<&[String]> {
        self.relationships.get(target_frame).map(Vec::as_slice)
    }

    pub fn relationships(&self) -> &BTreeMap<String, Vec<String>> {
        &self.relationships
    }

    pub(crate) fn push_column(&mut self, def: ColumnDef) {
        self.columns.push(def);
    }

    /// Checks a full index tuple against the declared index columns.
    pub fn validate_key(&self, key: &[Value]) -> Result<()> {
        if key.len() != self.index.len() {
            return Err(FrameError::Schema(format!(
                "frame '{}' expects a {}-level index key, got {} values",
                self.name,
                self.index.len(),
                key.len()
            )));
        }
        for (col, value) in self.index.iter().zip(key) {
            if !col.data_type.is_compatible(value) {
                return Err(FrameError::TypeMismatch(format!(
                    "index column '{}' of frame '{}' expects {}, got {}",
                    col.name,
                    self.name,
                    col.data_type,
                    value.type_name()
                )));
            }
        }
        Ok(())
    }
}
