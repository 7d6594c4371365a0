// # Common Types
//
// Shared identifiers and value/schema types used across the optimizer core.
// These mirror what a host database (parser, catalog, statistics provider)
// would hand the optimizer; the optimizer itself never constructs them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ============================================================================
// Type Aliases - Shared Identifiers
// ============================================================================

/// Unique identifier for tables in the catalog.
pub type TableId = u32;

/// Unique identifier for indexes.
pub type IndexId = u32;

/// Unique identifier for columns within a table.
pub type ColumnId = u16;

// ============================================================================
// Core Value Types
// ============================================================================

/// Represents all possible data values in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(i64),
    Timestamp(i64),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    /// Check if value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get type name as string.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::Bytes(_) => "BYTES",
            Value::Date(_) => "DATE",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Json(_) => "JSON",
            Value::Array(_) => "ARRAY",
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
            Value::Date(d) => format!("DATE({})", d),
            Value::Timestamp(t) => format!("TIMESTAMP({})", t),
            Value::Json(j) => j.to_string(),
            Value::Array(a) => format!("[{}]", a.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::Json(j) => j.to_string().hash(state),
            Value::Array(a) => a.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => {
                if a.is_nan() && b.is_nan() {
                    Some(Ordering::Equal)
                } else if a.is_nan() {
                    Some(Ordering::Greater)
                } else if b.is_nan() {
                    Some(Ordering::Less)
                } else {
                    a.partial_cmp(b)
                }
            }
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.partial_cmp(b),
            (Value::Array(a), Value::Array(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

// ============================================================================
// Schema Definitions
// ============================================================================

/// Database schema definition for a relation visible to the optimizer.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Schema {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(table_name: String, columns: Vec<ColumnDef>) -> Self {
        Self { table_name, columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Column definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: String, data_type: DataType) -> Self {
        Self { name, data_type, nullable: true }
    }
}

/// Column data types, as reported by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DataType {
    Integer,
    BigInt,
    Float,
    Double,
    Varchar(usize),
    Text,
    Boolean,
    Date,
    Timestamp,
    Json,
    Blob,
    Decimal(u8, u8),
    Array(Box<DataType>),
}

// ============================================================================
// Index Metadata
// ============================================================================

/// An index's kind, as reported by the catalog (spec.md §6's "Index
/// metadata" collaborator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
    Spatial,
    FullText,
}

/// One catalog index over `table`: an ordered column prefix, uniqueness,
/// and kind. Only `BTree` indexes support ordered (merge-join/range-heap)
/// access; lookup/concat joins accept any kind whose prefix matches.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub id: IndexId,
    pub table: TableId,
    pub columns: Vec<ColumnId>,
    pub unique: bool,
    pub kind: IndexKind,
    /// Declared type of each entry in `columns`, positionally (spec.md
    /// §6's "columnExpressionTypes"). Used by the exec builder to
    /// reject a `MergeJoin` whose range bound type doesn't match the
    /// index it scans (`IndexTypeMismatch`).
    pub column_types: Vec<DataType>,
}

impl IndexInfo {
    /// Longest prefix of `columns` that matches `key_columns` positionally
    /// (the shape `LookupJoin`/`MergeJoin`/`ConcatJoin` candidate
    /// construction needs, spec.md §4.4 Phase D).
    pub fn matches_prefix(&self, key_columns: &[ColumnId]) -> usize {
        self.columns.iter().zip(key_columns.iter()).take_while(|(a, b)| a == b).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_ordering_treats_nulls_as_least() {
        assert!(Value::Null < Value::Integer(0));
    }

    #[test]
    fn schema_column_lookup() {
        let schema = Schema::new(
            "t".to_string(),
            vec![ColumnDef::new("a".to_string(), DataType::Integer)],
        );
        assert_eq!(schema.get_column_index("a"), Some(0));
        assert_eq!(schema.get_column_index("b"), None);
    }
}
