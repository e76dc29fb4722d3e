use serde::{Deserialize, Serialize};
use std::fmt;

/// CSV field standing for SQL NULL. An empty field is an empty string.
pub const NULL_MARKER: &str = "\\N";

/// A single loosely-typed cell read from a table.
///
/// CSV carries no schema, so values only keep enough type information to be
/// rendered back as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value as a CSV field.
    ///
    /// NULL becomes `\N`. Text starting with a backslash gets one more, so
    /// the literal text `\N` is written as `\\N` and never read back as NULL.
    pub fn to_csv_field(&self) -> String {
        match self {
            FieldValue::Null => NULL_MARKER.to_string(),
            FieldValue::Text(s) if s.starts_with('\\') => format!("\\{}", s),
            other => other.to_string(),
        }
    }

    /// Text used to match this value against a parent key, `None` for NULL
    pub fn as_key(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Read a CSV field written by [`FieldValue::to_csv_field`]. `None` is NULL.
pub fn decode_csv_field(field: &str) -> Option<String> {
    if field == NULL_MARKER {
        None
    } else if let Some(rest) = field.strip_prefix('\\') {
        Some(rest.to_string())
    } else {
        Some(field.to_string())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or(FieldValue::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

/// One row of a table at export time, aligned with the table's column list
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExportRecord {
    pub values: Vec<FieldValue>,
}

impl ExportRecord {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A row ready to be written to the destination. `None` is inserted as NULL.
pub type ImportRow = Vec<Option<String>>;

/// What a run does after a table fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failed table
    #[default]
    FailFast,
    /// Report the failure and move on to the next table
    KeepGoing,
}
