//! The row data model: ordered column/value records flowing through a pipeline.
//!
//! A [`Row`] is the unit of data handed from stage to stage: a mapping from
//! column name to a dynamically-typed [`Value`], with unique keys and
//! insertion order preserved so output formatting stays deterministic.
//!
//! Rows move *by value* between stages. Ownership transfer is what guarantees
//! that no stage ever observes a row another stage is mutating; a stage that
//! wants to change a row simply mutates or rebuilds the one it owns before
//! handing it downstream.

mod value;

pub use value::Value;

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors raised by row access.
#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    /// The requested column does not exist in the row.
    #[error("Column '{0}' not found in row")]
    ColumnNotFound(String),
}

/// One record flowing through the pipeline.
///
/// Backed by an ordered entry vector: column counts in ETL rows are small,
/// and keeping entries in insertion order makes row formatting and column
/// iteration deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty row with capacity for `columns` entries.
    pub fn with_capacity(columns: usize) -> Self {
        Self {
            columns: Vec::with_capacity(columns),
        }
    }

    /// Sets a column, replacing the value in place if the column already
    /// exists (its position in the row is kept).
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Returns the value of `column`.
    ///
    /// # Errors
    ///
    /// Returns [`RowError::ColumnNotFound`] if the column does not exist.
    pub fn get(&self, column: &str) -> Result<&Value, RowError> {
        self.get_opt(column)
            .ok_or_else(|| RowError::ColumnNotFound(column.to_string()))
    }

    /// Returns the value of `column`, or `None` if it does not exist.
    pub fn get_opt(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Removes a column, returning its value if it existed.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let index = self.columns.iter().position(|(name, _)| name == column)?;
        Some(self.columns.remove(index).1)
    }

    /// Returns whether the row contains `column`.
    pub fn contains_column(&self, column: &str) -> bool {
        self.get_opt(column).is_some()
    }

    /// Iterates column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Iterates `(name, value)` entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Hash for Row {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (name, value) in &self.columns {
            name.hash(state);
            value.hash(state);
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (index, (name, value)) in self.columns.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(entries: I) -> Self {
        let mut row = Row::new();
        for (name, value) in entries {
            row.set(name, value);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

// Rows serialize as maps so encoded output reads naturally; entry order is
// the row's insertion order on both ends.
impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of column names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, Value>()? {
                    row.set(name, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        let mut row = Row::new();
        row.set("id", 1i64);
        row.set("name", "ayende");
        row.set("email", "ayende@example.com");
        row
    }

    #[test]
    fn test_get_and_set() {
        let row = sample_row();
        assert_eq!(row.get("id"), Ok(&Value::Int(1)));
        assert_eq!(row.get("name"), Ok(&Value::Text("ayende".to_string())));
    }

    #[test]
    fn test_missing_column_errors() {
        let row = sample_row();
        assert_eq!(
            row.get("missing"),
            Err(RowError::ColumnNotFound("missing".to_string()))
        );
        assert!(row.get_opt("missing").is_none());
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut row = sample_row();
        row.set("name", "AYENDE");
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["id", "name", "email"]);
        assert_eq!(row.get("name"), Ok(&Value::Text("AYENDE".to_string())));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let row = sample_row();
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["id", "name", "email"]);
    }

    #[test]
    fn test_remove() {
        let mut row = sample_row();
        assert_eq!(row.remove("name"), Some(Value::Text("ayende".to_string())));
        assert_eq!(row.remove("name"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_content_equality() {
        let a = sample_row();
        let b = sample_row();
        assert_eq!(a, b);

        let mut c = sample_row();
        c.set("id", 2i64);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display() {
        let mut row = Row::new();
        row.set("a", 1i64);
        row.set("b", "x");
        assert_eq!(row.to_string(), "{a: 1, b: x}");
    }

    #[test]
    fn test_serde_roundtrip_preserves_order() {
        let row = sample_row();
        let encoded = serde_json::to_string(&row).expect("row should serialize");
        let decoded: Row = serde_json::from_str(&encoded).expect("row should deserialize");
        assert_eq!(row, decoded);
        let columns: Vec<&str> = decoded.columns().collect();
        assert_eq!(columns, vec!["id", "name", "email"]);
    }
}
