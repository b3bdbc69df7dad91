use crate::core::{DataType, Result, Value};
use crate::frame::ComputeView;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Compute callable of a computed column. Receives a read-only, pre-joined
/// view of the declared dependency columns and returns one value per target
/// row. Callables never see the store, so they cannot re-enter it.
pub type ComputeFn = Arc<dyn Fn(&ComputeView) -> Result<Vec<Value>> + Send + Sync>;

/// Display/classification metadata of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAttributes {
    pub title: String,
    pub group: String,
    pub categorical: bool,
    pub divergent: bool,
    pub plottable: bool,
}

/// Partial attribute declaration; every field may be omitted.
#[derive(Debug, Clone, Default)]
pub struct AttributeDecl {
    pub title: Option<String>,
    pub group: Option<String>,
    pub categorical: Option<bool>,
    pub divergent: Option<bool>,
    pub plottable: Option<bool>,
}

impl AttributeDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn categorical(mut self, categorical: bool) -> Self {
        self.categorical = Some(categorical);
        self
    }

    pub fn divergent(mut self, divergent: bool) -> Self {
        self.divergent = Some(divergent);
        self
    }

    pub fn plottable(mut self, plottable: bool) -> Self {
        self.plottable = Some(plottable);
        self
    }

    /// Fills in defaults: title falls back to the column's own name, flags
    /// to false/true, group to the catch-all.
    pub fn normalize(self, column: &str) -> ColumnAttributes {
        ColumnAttributes {
            title: self.title.unwrap_or_else(|| column.to_string()),
            group: self.group.unwrap_or_else(|| "Other".to_string()),
            categorical: self.categorical.unwrap_or(false),
            divergent: self.divergent.unwrap_or(false),
            plottable: self.plottable.unwrap_or(true),
        }
    }
}

/// Dependency declaration of a computed column. The flat form names columns
/// of the owning frame; the map form spells out frames explicitly.
#[derive(Debug, Clone)]
pub enum DependencyDecl {
    Columns(Vec<String>),
    Frames(BTreeMap<String, Vec<String>>),
}

impl DependencyDecl {
    pub fn columns<I, S>(cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Columns(cols.into_iter().map(Into::into).collect())
    }

    pub fn frames<I, S, C, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: Into<String>,
        C: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::Frames(
            entries
                .into_iter()
                .map(|(f, cols)| (f.into(), cols.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }

    /// Normalizes the flat-list form into the per-frame map using the
    /// owning frame's name as the implicit key.
    pub fn normalize(self, owning_frame: &str) -> BTreeMap<String, Vec<String>> {
        match self {
            Self::Columns(cols) if cols.is_empty() => BTreeMap::new(),
            Self::Columns(cols) => {
                let mut map = BTreeMap::new();
                map.insert(owning_frame.to_string(), cols);
                map
            }
            Self::Frames(map) => map,
        }
    }
}

/// Kind of a column: directly written, or derived from declared
/// dependencies via a compute callable.
#[derive(Clone)]
pub enum ColumnKind {
    Stored {
        data_type: DataType,
        default: Value,
    },
    Computed {
        func: ComputeFn,
        /// `frame name -> [column, ...]`, fully normalized.
        dependencies: BTreeMap<String, Vec<String>>,
    },
}

impl ColumnKind {
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed { .. })
    }

    pub fn dependencies(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        match self {
            Self::Stored { .. } => None,
            Self::Computed { dependencies, .. } => Some(dependencies),
        }
    }
}

impl fmt::Debug for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored { data_type, default } => f
                .debug_struct("Stored")
                .field("data_type", data_type)
                .field("default", default)
                .finish(),
            Self::Computed { dependencies, .. } => f
                .debug_struct("Computed")
                .field("dependencies", dependencies)
                .finish_non_exhaustive(),
        }
    }
}
