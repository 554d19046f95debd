//! Store trait: the read-only relational source queries run against.
//!
//! A store accepts a SQL string and returns an ordered set of rows with
//! named columns, or an error. Implementations must connect with a
//! read-only credential: the lexical safety check in front of the store
//! is a first gate, not the security boundary.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An ordered row set with named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Missing trailing cells are padded with `Null`.
    pub fn push(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate one row as `(column, value)` pairs.
    pub fn named(&self, index: usize) -> impl Iterator<Item = (&str, &Value)> {
        let row = self.rows.get(index).map(Vec::as_slice).unwrap_or(&[]);
        self.columns.iter().map(String::as_str).zip(row.iter())
    }
}

/// The core QueryStore trait.
///
/// Implementations: SQLite (read-only); scripted stores in tests.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// The backend name (e.g., "sqlite").
    fn name(&self) -> &str;

    /// Run a read-only statement and return every row it produces.
    async fn fetch(&self, sql: &str) -> Result<RowSet, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pads_short_rows() {
        let mut rows = RowSet::new(vec!["a".into(), "b".into()]);
        rows.push(vec![Value::Integer(1)]);
        assert_eq!(rows.rows[0], vec![Value::Integer(1), Value::Null]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn named_pairs_columns_with_values() {
        let mut rows = RowSet::new(vec!["event_id".into(), "type".into()]);
        rows.push(vec![102.into(), "Incident".into()]);
        let pairs: Vec<(&str, String)> = rows.named(0).map(|(c, v)| (c, v.to_string())).collect();
        assert_eq!(
            pairs,
            vec![("event_id", "102".to_string()), ("type", "Incident".to_string())]
        );
        assert_eq!(rows.named(7).count(), 0);
    }

    #[test]
    fn value_display_and_conversions() {
        assert_eq!(Value::from(Some(3_i64)).to_string(), "3");
        assert!(Value::from(None::<i64>).is_null());
        assert_eq!(Value::Real(1500.5).to_string(), "1500.5");
        assert_eq!(Value::Blob(vec![1, 2, 3]).to_string(), "<3 bytes>");
    }
}
