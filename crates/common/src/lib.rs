
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::{cmp::Ordering, fmt, io, time::Duration};
use thiserror::Error;
use types::Value;

/// Reserved prefix for synthetic columns. `_id` is a record's identity;
/// `_id<table>` columns are provenance markers injected by joins.
pub const ID_COL: &str = "_id";

/// Name of the provenance column a join emits for rows sourced from `table`.
pub fn provenance_col(table: &str) -> String {
    format!("{ID_COL}{table}")
}

/// Returns true for `_id` and every `_id<table>` provenance column.
pub fn is_synthetic(col: &str) -> bool {
    col.starts_with(ID_COL)
}

/// Logical identifier for a page. Opaque and process-unique; pages keep their
/// id across `clear_table`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u64);

/// Address of a record within a table: page plus slot. Stable until the
/// table is cleared, because records are never deleted from a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordLoc {
    pub page: PageId,
    pub slot: u16,
}

/// An ordered column-name → scalar mapping.
///
/// Field order is preserved so the content-addressed identity
/// ([`Record::content_id`]) is canonical: two records built with the same
/// columns in the same order serialize to the same JSON text. Records move
/// by value; mutating a yielded record never touches storage.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, col: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == col)
            .map(|(_, value)| value)
    }

    /// Set a field, replacing in place when the column already exists so the
    /// field order stays stable.
    pub fn set(&mut self, col: impl Into<String>, value: Value) {
        let col = col.into();
        match self.fields.iter_mut().find(|(name, _)| *name == col) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((col, value)),
        }
    }

    pub fn contains(&self, col: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == col)
    }

    /// Remove a field, returning its value if it was present.
    pub fn remove(&mut self, col: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(name, _)| name == col)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn id(&self) -> Option<&Value> {
        self.get(ID_COL)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.set(ID_COL, Value::Text(id.into()));
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy of this record with every `_id*` field dropped.
    pub fn without_ids(&self) -> Record {
        Record {
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| !is_synthetic(name))
                .cloned()
                .collect(),
        }
    }

    /// Content-addressed identity: the JSON text of the record minus its
    /// synthetic fields, in field order. Rows with equal content collapse to
    /// one identity, which is what gives derived rows set semantics.
    pub fn content_id(&self) -> String {
        serde_json::to_string(&self.without_ids()).expect("record serializes to JSON")
    }

    /// Field-merge `other` into `self`; colliding columns take `other`'s value.
    pub fn merge(&mut self, other: &Record) {
        for (col, value) in other.iter() {
            self.set(col, value.clone());
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut rec = Record::new();
        for (col, value) in iter {
            rec.set(col, value);
        }
        rec
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// The two comparison operators the engine supports. Anything else is
/// rejected when the query IR is constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Gt,
}

impl CompareOp {
    pub fn parse(raw: &str) -> DbResult<Self> {
        match raw {
            "=" => Ok(CompareOp::Eq),
            ">" => Ok(CompareOp::Gt),
            other => Err(DbError::Parser(format!("unsupported operator '{other}'"))),
        }
    }

    /// Whether an ordering outcome satisfies this operator.
    pub fn matches(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "="),
            CompareOp::Gt => write!(f, ">"),
        }
    }
}

/// Canonical error type shared across engine subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("parse: {0}")]
    Parser(String),
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("exec: {0}")]
    Executor(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Engine configuration, read once at construction.
///
/// # Example
/// ```
/// use common::Config;
/// use std::time::Duration;
///
/// let config = Config::builder()
///     .page_capacity(10)
///     .buffer_capacity(2)
///     .page_fetch(Duration::from_millis(1))
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Simulated latency charged on every buffer admission.
    #[builder(default = Duration::from_micros(100))]
    pub page_fetch: Duration,
    /// Maximum records per page.
    #[builder(default = 100)]
    pub page_capacity: usize,
    /// Maximum buffer-resident pages.
    #[builder(default = 50)]
    pub buffer_capacity: usize,
    /// Outer block width for the block nested-loop join.
    #[builder(default = 100)]
    pub block_join_size: usize,
    /// Dataset scale percentages exercised by the benchmark drivers.
    #[builder(default = vec![10, 25, 50, 100])]
    pub scales: Vec<u32>,
    /// Timed runs per scale; the first run is discarded as warmup.
    #[builder(default = 5)]
    pub runs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        CompareOp, Config, DbError, DbResult, ID_COL, PageId, Record, RecordLoc, is_synthetic,
        provenance_col,
    };
    pub use types::{IndexKey, Value};
}
