//! Literal values and row access for filter evaluation.
//!
//! The record-oriented data layer is external; filters only see rows through
//! the [`Row`] trait. [`MemoryRow`] is a simple in-memory implementation that
//! can be built field by field or deserialized from JSON.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar value: a filter constant or an atomic row field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Unquoted text form, used for pattern matching.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Str(s) => Cow::Borrowed(s),
            Value::Bool(b) => Cow::Owned(b.to_string()),
            Value::Int(i) => Cow::Owned(i.to_string()),
            Value::Float(x) => Cow::Owned(format!("{:?}", x)),
        }
    }
}

/// Literal form: strings are quoted and escaped, floats keep a decimal point.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// The data a row carries for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Scalar(Value),
    Array(Vec<Value>),
    Record(BTreeMap<String, Datum>),
}

/// One row of a sequence, as supplied by the data layer.
pub trait Row {
    /// Data for the named field, if the row has it.
    fn field(&self, name: &str) -> Option<&Datum>;
}

impl<R: Row + ?Sized> Row for &R {
    fn field(&self, name: &str) -> Option<&Datum> {
        (**self).field(name)
    }
}

/// In-memory row keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryRow {
    fields: BTreeMap<String, Datum>,
}

impl MemoryRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar field.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .insert(name.into(), Datum::Scalar(value.into()));
        self
    }

    /// Add an arbitrary field.
    pub fn with_datum(mut self, name: impl Into<String>, datum: Datum) -> Self {
        self.fields.insert(name.into(), datum);
        self
    }

    /// Parse a row from a JSON object such as `{"depth": 150, "id": "a1"}`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl Row for MemoryRow {
    fn field(&self, name: &str) -> Option<&Datum> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_literals() {
        assert_eq!(Value::Int(5).to_string(), "5");
        assert_eq!(Value::Float(5.0).to_string(), "5.0");
        assert_eq!(Value::from("a\"b").to_string(), r#""a\"b""#);
        assert_eq!(Value::Bool(true).to_string(), "true");
    }

    #[test]
    fn test_row_from_json() {
        let json = r#"{"depth": 150, "temp": 3.5, "id": "a1", "ok": true, "xs": [1, 2]}"#;
        let row = MemoryRow::from_json(json).unwrap();
        assert_eq!(row.field("depth"), Some(&Datum::Scalar(Value::Int(150))));
        assert_eq!(row.field("temp"), Some(&Datum::Scalar(Value::Float(3.5))));
        assert_eq!(row.field("id"), Some(&Datum::Scalar(Value::from("a1"))));
        assert_eq!(row.field("ok"), Some(&Datum::Scalar(Value::Bool(true))));
        assert!(matches!(row.field("xs"), Some(Datum::Array(v)) if v.len() == 2));
        assert!(row.field("missing").is_none());
    }

    #[test]
    fn test_builder_row() {
        let row = MemoryRow::new().with("depth", 10i64).with("name", "x");
        assert_eq!(row.field("depth"), Some(&Datum::Scalar(Value::Int(10))));
    }
}
