//! Backend-neutral column values and per-backend row decoding.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! Decoded rows carry a shared, ordered list of column names alongside the
//! values, so shaping can key by name without re-reading driver metadata.

use crate::models::DatabaseType;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Serialize, Serializer};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// =============================================================================
// Values
// =============================================================================

/// A single column value, independent of the backend that produced it.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Exact numeric kept in the backend's textual form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    /// JSON document in its serialized form.
    Json(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int(_) | Self::UInt(_) | Self::Float(_) | Self::Decimal(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Decimal(s) | Self::Json(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of the value, used for count results.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            Self::Decimal(s) | Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UInt(a), Self::UInt(b)) => a == b,
            // Bit equality keeps Eq and Hash consistent (NaN == NaN, 0.0 != -0.0)
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Decimal(a), Self::Decimal(b))
            | (Self::Text(a), Self::Text(b))
            | (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::UInt(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Decimal(s) | Self::Text(s) | Self::Json(s) => s.hash(state),
            Self::Bytes(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Decimal(s) | Self::Text(s) | Self::Json(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&STANDARD.encode(b)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::UInt(v) => serializer.serialize_u64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Decimal(s) | Self::Text(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_str(&STANDARD.encode(b)),
            Self::Json(s) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(json) => json.serialize(serializer),
                Err(_) => serializer.serialize_str(s),
            },
        }
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

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

// =============================================================================
// Decoded rows
// =============================================================================

/// One decoded result row: the statement's column names plus this row's values.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub columns: Arc<[String]>,
    pub values: Vec<Value>,
}

impl RawRow {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }
}

/// Trait for decoding driver rows into backend-neutral values.
pub trait DecodeRow {
    fn column_names(&self) -> Vec<String>;
    fn decode_values(&self) -> Vec<Value>;
}

impl DecodeRow for MySqlRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_values(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::MySQL);
                mysql::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl DecodeRow for PgRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_values(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::PostgreSQL);
                postgres::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl DecodeRow for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_values(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let declared = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                sqlite::decode_column(self, idx, declared)
            })
            .collect()
    }
}

/// Decode a driver row, reusing `columns` when the caller already captured them.
pub fn decode_row<R: DecodeRow>(row: &R, columns: &mut Option<Arc<[String]>>) -> RawRow {
    let columns = columns
        .get_or_insert_with(|| Arc::from(row.column_names()))
        .clone();
    RawRow::new(columns, row.decode_values())
}

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Temporal types, before integers ("interval" contains "int")
    match lower.as_str() {
        "date" => return TypeCategory::Date,
        "time" | "timetz" => return TypeCategory::Time,
        "timestamptz" => return TypeCategory::TimestampTz,
        "timestamp" | "datetime" => return TypeCategory::Timestamp,
        "interval" => return TypeCategory::Unknown,
        _ => {}
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    // Boolean
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Float types
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => {
                let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
                Ok(RawDecimal(s.to_string()))
            }
            // Prepared statements return NUMERIC in its binary base-10000 form
            PgValueFormat::Binary => {
                let bytes = <&[u8] as Decode<sqlx::Postgres>>::decode(value)?;
                numeric_from_binary(bytes).map(RawDecimal)
            }
        }
    }
}

/// Render a binary PostgreSQL NUMERIC as decimal text.
///
/// Layout: ndigits, weight, sign, dscale (all 16-bit big-endian), followed by
/// `ndigits` base-10000 digits, most significant first.
fn numeric_from_binary(buf: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    let read = |offset: usize| -> Result<i16, sqlx::error::BoxDynError> {
        buf.get(offset..offset + 2)
            .map(|b| i16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = read(0)?.max(0) as usize;
    let weight = i32::from(read(2)?);
    let sign = read(4)? as u16;
    let dscale = read(6)? as u16 as usize;

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| read(8 + 2 * i))
        .collect::<Result<Vec<i16>, _>>()?;
    let digit = |index: i32| -> i16 {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for index in 0..=weight {
            if index == 0 {
                out.push_str(&digit(index).to_string());
            } else {
                out.push_str(&format!("{:04}", digit(index)));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut index = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(index)));
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Value {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Date => decode_as::<chrono::NaiveDate>(row, idx),
            TypeCategory::Time => decode_as::<chrono::NaiveTime>(row, idx),
            TypeCategory::Timestamp => decode_as::<chrono::NaiveDateTime>(row, idx),
            TypeCategory::TimestampTz => {
                decode_as::<chrono::DateTime<chrono::Utc>>(row, idx)
            }
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Value {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => Value::Decimal(v.0),
            Ok(None) => Value::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                Value::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Int(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return Value::UInt(v);
        }
        Value::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return Value::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return Value::Float(v as f64);
        }
        Value::Null
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Json(v.to_string()))
            .unwrap_or(Value::Null)
    }

    fn decode_as<T>(row: &MySqlRow, idx: usize) -> Value
    where
        T: for<'r> Decode<'r, sqlx::MySql> + Type<sqlx::MySql> + ToString,
    {
        match row.try_get::<Option<T>, _>(idx) {
            Ok(Some(v)) => Value::Text(v.to_string()),
            Ok(None) => Value::Null,
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return Value::Text(v);
        }
        // Text protocol values of unrecognised types are still valid UTF-8
        row.try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Text)
            .unwrap_or(Value::Null)
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Value {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Date => decode_as::<chrono::NaiveDate>(row, idx),
            TypeCategory::Time => decode_as::<chrono::NaiveTime>(row, idx),
            TypeCategory::Timestamp => decode_as::<chrono::NaiveDateTime>(row, idx),
            TypeCategory::TimestampTz => decode_as::<chrono::DateTime<chrono::Utc>>(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> Value {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => Value::Decimal(v.0),
            Ok(None) => Value::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                Value::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Value {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Int(v);
        }
        Value::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> Value {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return Value::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return Value::Float(v as f64);
        }
        Value::Null
    }

    fn decode_binary(row: &PgRow, idx: usize) -> Value {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> Value {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Json(v.to_string()))
            .unwrap_or(Value::Null)
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> Value {
        // UUIDs travel as 16 raw bytes in binary format
        match row.try_get_unchecked::<Option<Vec<u8>>, _>(idx) {
            Ok(Some(bytes)) if bytes.len() == 16 => Value::Text(format_uuid(&bytes)),
            Ok(None) => Value::Null,
            _ => decode_text(row, idx),
        }
    }

    fn decode_as<T>(row: &PgRow, idx: usize) -> Value
    where
        T: for<'r> Decode<'r, sqlx::Postgres> + Type<sqlx::Postgres> + ToString,
    {
        match row.try_get::<Option<T>, _>(idx) {
            Ok(Some(v)) => Value::Text(v.to_string()),
            Ok(None) => Value::Null,
            Err(e) => {
                tracing::debug!(error = %e, column = idx, "Temporal decode failed");
                Value::Null
            }
        }
    }

    fn decode_text(row: &PgRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        // Simple-query results are text for every type
        match row.try_get_raw(idx) {
            Ok(raw) if matches!(raw.format(), PgValueFormat::Text) => row
                .try_get_unchecked::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(Value::Text)
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

fn format_uuid(bytes: &[u8]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

mod sqlite {
    use super::*;
    use sqlx::ValueRef;

    /// SQLite columns are dynamically typed, so the storage class of the
    /// value decides the decoder; the declared type only refines booleans
    /// and JSON.
    pub fn decode_column(row: &SqliteRow, idx: usize, declared: TypeCategory) -> Value {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
            Err(_) => return Value::Null,
        };

        match (storage.as_str(), declared) {
            ("INTEGER", TypeCategory::Boolean) | ("BOOLEAN", _) => decode_boolean(row, idx),
            ("INTEGER", _) => decode_integer(row, idx),
            ("REAL", _) => decode_float(row, idx),
            ("BLOB", _) => decode_binary(row, idx),
            (_, TypeCategory::Json) => decode_text(row, idx)
                .as_str()
                .map(|s| Value::Json(s.to_string()))
                .unwrap_or(Value::Null),
            _ => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null)
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null)
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> Value {
        row.try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Text)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("SERIAL", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("DATE", DatabaseType::PostgreSQL),
            TypeCategory::Date
        );
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL),
            TypeCategory::TimestampTz
        );
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySQL),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_text_and_json() {
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::MySQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("jsonb", DatabaseType::PostgreSQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("bytea", DatabaseType::PostgreSQL),
            TypeCategory::Binary
        );
    }

    #[test]
    fn test_value_float_equality_by_bits() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_value_hash_in_set() {
        let set: HashSet<Value> = [
            Value::Int(1),
            Value::Int(1),
            Value::Text("a".into()),
            Value::Null,
            Value::Null,
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Decimal("12.50".into()).to_string(), "12.50");
        assert_eq!(Value::Bytes(b"hello world".to_vec()).to_string(), "aGVsbG8gd29ybGQ=");
    }

    #[test]
    fn test_value_serialize() {
        let json = serde_json::to_value(vec![
            Value::Null,
            Value::Int(-3),
            Value::Json(r#"{"a":1}"#.into()),
            Value::Bytes(vec![0xFF, 0xFE, 0x00, 0x01]),
        ])
        .unwrap();
        assert_eq!(json, serde_json::json!([null, -3, {"a": 1}, "//4AAQ=="]));
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::Decimal("42".into()).as_i64(), Some(42));
        assert_eq!(Value::Null.as_i64(), None);
    }

    fn numeric_bytes(ndigits: i16, weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ndigits.to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&sign.to_be_bytes());
        buf.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            buf.extend_from_slice(&d.to_be_bytes());
        }
        buf
    }

    #[test]
    fn test_numeric_from_binary() {
        // 12345.67 = [1, 2345, 6700] with weight 1
        let buf = numeric_bytes(3, 1, 0x0000, 2, &[1, 2345, 6700]);
        assert_eq!(numeric_from_binary(&buf).unwrap(), "12345.67");

        // -0.0042 = [42] with weight -1
        let buf = numeric_bytes(1, -1, 0x4000, 4, &[42]);
        assert_eq!(numeric_from_binary(&buf).unwrap(), "-0.0042");

        // 100 = [100] with weight 0, no scale
        let buf = numeric_bytes(1, 0, 0x0000, 0, &[100]);
        assert_eq!(numeric_from_binary(&buf).unwrap(), "100");

        let buf = numeric_bytes(0, 0, 0xC000, 0, &[]);
        assert_eq!(numeric_from_binary(&buf).unwrap(), "NaN");

        assert!(numeric_from_binary(&[0, 1]).is_err());
    }

    #[test]
    fn test_format_uuid() {
        let bytes: Vec<u8> = (0u8..16).collect();
        assert_eq!(
            format_uuid(&bytes),
            "00010203-0405-0607-0809-0a0b0c0d0e0f"
        );
    }
}
