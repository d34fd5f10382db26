//! Query-related data models.
//!
//! This module defines the statements accepted by the query facade and the
//! parameter values that can be bound to prepared statements.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A statement accepted by the query facade: raw SQL text, or SQL with
/// bound parameters executed as a prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Text(String),
    Prepared { sql: String, params: Vec<QueryParam> },
}

impl Statement {
    pub fn prepared(sql: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self::Prepared {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            Self::Text(sql) | Self::Prepared { sql, .. } => sql,
        }
    }

    /// Bound parameters; empty for raw text.
    pub fn params(&self) -> &[QueryParam] {
        match self {
            Self::Text(_) => &[],
            Self::Prepared { params, .. } => params,
        }
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::Text(sql.to_string())
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::Text(sql)
    }
}

impl From<&String> for Statement {
    fn from(sql: &String) -> Self {
        Self::Text(sql.clone())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}
