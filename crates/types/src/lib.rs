use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Column types recognized by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    Int,
    Double,
    Str,
}

impl SqlType {
    /// Parse a declared column type. Accepts the spellings the grammar
    /// produces (`INT`, `DOUBLE`, `STRING`) plus their common synonyms.
    pub fn parse(name: &str) -> Option<SqlType> {
        match name.to_ascii_uppercase().as_str() {
            "INT" | "INTEGER" => Some(SqlType::Int),
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" => Some(SqlType::Double),
            "STRING" | "TEXT" => Some(SqlType::Str),
            _ => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Int => write!(f, "INT"),
            SqlType::Double => write!(f, "DOUBLE"),
            SqlType::Str => write!(f, "STRING"),
        }
    }
}

/// Runtime cell value. A cell is either a typed value or NULL.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Null => "null",
        }
    }

    /// Whether this value can live in a column of the given type.
    /// NULL fits every column; the primary key rejects it separately.
    pub fn fits(&self, ty: SqlType) -> bool {
        matches!(
            (self, ty),
            (Value::Null, _)
                | (Value::Int(_), SqlType::Int)
                | (Value::Double(_), SqlType::Double)
                | (Value::Str(_), SqlType::Str)
        )
    }

    /// Coerce a value into a column type, widening Int into Double.
    /// Returns `None` when the value cannot represent the type.
    pub fn coerce(self, ty: SqlType) -> Option<Value> {
        match (self, ty) {
            (Value::Null, _) => Some(Value::Null),
            (v @ Value::Int(_), SqlType::Int) => Some(v),
            (v @ Value::Double(_), SqlType::Double) => Some(v),
            (v @ Value::Str(_), SqlType::Str) => Some(v),
            (Value::Int(i), SqlType::Double) => Some(Value::Double(i as f64)),
            _ => None,
        }
    }

    /// Query-level comparison: Int and Double compare numerically, strings
    /// by code point. NULL and string/numeric mixes are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => Some(a.total_cmp(b)),
            (Value::Int(a), Value::Double(b)) => Some((*a as f64).total_cmp(b)),
            (Value::Double(a), Value::Int(b)) => Some(a.total_cmp(&(*b as f64))),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) => 1,
            Value::Double(_) => 2,
            Value::Str(_) => 3,
        }
    }
}

/// Total order used for index trees and sorting: NULL first, then Int,
/// Double, Str; doubles ordered by `total_cmp`. A column holds one type,
/// so the cross-type rank only ever separates NULL from values.
impl Ord for Value {
    fn cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Null, Value::Null) => Ordering::Equal,
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Int(i) => i.hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Str(s) => write!(f, "'{s}'"),
            Value::Null => write!(f, "NULL"),
        }
    }
}
