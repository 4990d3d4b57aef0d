//! Event records as delivered by the log crawler
//!
//! A record is an ordered tuple. Position 0 is always the UTC epoch timestamp
//! (seconds); the remaining layout depends on the contract method and is
//! described by the stream's header.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of the timestamp field in every record
pub const TIMESTAMP_FIELD: usize = 0;

/// One record field.
///
/// JSON numbers that do not fit in `i64` fall through to `Float`; 256-bit
/// quantities (token amounts) should arrive as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Integer view: `Int` as-is, `Text` if it parses as a whole number.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null | Self::Float(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A single contract-call log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Vec<Value>);

impl Record {
    pub fn new(fields: Vec<Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &[Value] {
        &self.0
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw timestamp field (position 0), if present
    pub fn timestamp_field(&self) -> Option<&Value> {
        self.0.get(TIMESTAMP_FIELD)
    }
}

impl From<Vec<Value>> for Record {
    fn from(fields: Vec<Value>) -> Self {
        Self(fields)
    }
}
