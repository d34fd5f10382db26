//! Result shaping.
//!
//! A decoded row can be delivered in one of four shapes. The transforms are
//! pure functions of the column names and the row's values.

use crate::db::types::{RawRow, Value};
use std::collections::{HashMap, HashSet};

pub type Record = HashMap<String, Value>;

/// Requested row shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Shape {
    /// Column name to value. Duplicate names keep the last value.
    Record,
    /// Values in column order.
    List,
    /// Distinct values, unordered.
    Set,
    /// Values in column order, unmodified.
    #[default]
    Tuple,
}

impl Shape {
    /// Whether the shape needs the column names.
    pub fn is_name_keyed(&self) -> bool {
        matches!(self, Self::Record)
    }

    pub fn apply(&self, row: RawRow) -> ShapedRow {
        match self {
            Self::Record => ShapedRow::Record(to_record(&row.columns, row.values)),
            Self::List => ShapedRow::List(to_list(row.values)),
            Self::Set => ShapedRow::Set(to_set(row.values)),
            Self::Tuple => ShapedRow::Tuple(to_tuple(row.values)),
        }
    }
}

/// Requested cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// Absolute, 0-indexed row position.
    Row(usize),
    First,
    Last,
    Many(usize),
    All,
}

/// A row in its requested shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapedRow {
    Record(Record),
    List(Vec<Value>),
    Set(HashSet<Value>),
    Tuple(Box<[Value]>),
}

impl ShapedRow {
    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn into_set(self) -> Option<HashSet<Value>> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_tuple(self) -> Option<Box<[Value]>> {
        match self {
            Self::Tuple(t) => Some(t),
            _ => None,
        }
    }
}

pub fn to_record(columns: &[String], values: Vec<Value>) -> Record {
    columns.iter().cloned().zip(values).collect()
}

pub fn to_list(values: Vec<Value>) -> Vec<Value> {
    values
}

pub fn to_set(values: Vec<Value>) -> HashSet<Value> {
    values.into_iter().collect()
}

pub fn to_tuple(values: Vec<Value>) -> Box<[Value]> {
    values.into_boxed_slice()
}
