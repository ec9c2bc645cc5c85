use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};
use thiserror::Error;
use types::Value;

/// Zero-based position of a row within its table's data list. Stable
/// between mutations; reassigned whenever a delete or update compacts
/// the table, so callers must not hold one across a mutating statement.
pub type RowId = usize;

/// Positional row representation backed by `types::Value`.
/// Examples:
/// - `let row = Row::new(vec![Value::Int(1)]);`
/// - `let row = Row::new(vec![Value::Str("alice".into()), Value::Null]);`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Rectangular result set carrying column labels and rows. Single-table
/// results label columns by name; join results use `alias.column` labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RecordBatch {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Canonical error type shared across the engine.
///
/// Every variant surfaces to the HTTP caller verbatim as a 400 response;
/// a statement that raises one has made no durable change.
#[derive(Error, Debug)]
pub enum DbError {
    /// The grammar rejected the input.
    #[error("parse error: {0}")]
    Parse(String),
    /// Missing or duplicate table/column/index, bad column type, foreign
    /// key reference not found, drop blocked by a referent.
    #[error("schema error: {0}")]
    Schema(String),
    /// Primary key duplicate, foreign key violation, type mismatch.
    #[error("constraint violation: {0}")]
    Constraint(String),
    /// Row arity mismatch, unsupported operator or aggregate.
    #[error("value error: {0}")]
    Value(String),
    /// Snapshot codec failure.
    #[error("storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the engine.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .build();
/// assert!(config.db_path().ends_with("database.bin"));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory holding both snapshot files.
    #[builder(default = PathBuf::from("./data"))]
    pub data_dir: PathBuf,
    /// Database snapshot filename within the data directory.
    #[builder(default = String::from("database.bin"))]
    pub db_file: String,
    /// Index snapshot filename within the data directory.
    #[builder(default = String::from("index.bin"))]
    pub index_file: String,
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.index_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            db_file: String::from("database.bin"),
            index_file: String::from("index.bin"),
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, RecordBatch, Row, RowId};
    pub use types::{SqlType, Value};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_joins_snapshot_paths() {
        let config = Config::builder()
            .data_dir(PathBuf::from("/tmp/db"))
            .db_file("d.bin".into())
            .index_file("i.bin".into())
            .build();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/db/d.bin"));
        assert_eq!(config.index_path(), PathBuf::from("/tmp/db/i.bin"));
    }

    #[test]
    fn errors_render_their_kind() {
        let err = DbError::Constraint("duplicate primary key".into());
        assert_eq!(format!("{err}"), "constraint violation: duplicate primary key");
        let err = DbError::Parse("unexpected token".into());
        assert!(format!("{err}").starts_with("parse error"));
    }

    #[test]
    fn row_round_trips_values() {
        let row = Row::new(vec![Value::Int(1), Value::Null]);
        assert_eq!(row.clone().into_values(), vec![Value::Int(1), Value::Null]);
        assert_eq!(Row::from(vec![Value::Int(1), Value::Null]), row);
    }
}
