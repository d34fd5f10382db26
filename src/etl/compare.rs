//! Reconciliation of a source file against a target query result.

use crate::db::types::Value;
use crate::error::{EtlError, EtlResult};
use crate::etl::frame::Frame;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountComparison {
    Equal { rows: u64 },
    Mismatch { source: u64, target: u64 },
}

impl fmt::Display for CountComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal { .. } => {
                f.write_str("Row Count in File is Equal to Row Count in Target Table")
            }
            Self::Mismatch { source, target } => write!(
                f,
                "Row Count in File ({}) differs from Row Count in Target Table ({})",
                source, target
            ),
        }
    }
}

/// Compare a file's row count with the scalar result of a count query.
pub fn count_compare(source_rows: usize, target: &Frame) -> EtlResult<CountComparison> {
    let target = target
        .scalar()
        .and_then(count_value)
        .ok_or(EtlError::MissingCount)?;
    let source = source_rows as u64;

    let comparison = if source == target {
        CountComparison::Equal { rows: source }
    } else {
        CountComparison::Mismatch { source, target }
    };
    match &comparison {
        CountComparison::Equal { rows } => info!(rows, "{}", comparison),
        CountComparison::Mismatch { .. } => warn!("{}", comparison),
    }
    Ok(comparison)
}

/// Counts come back as integers from most backends, as text from some.
fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::UInt(n) => Some(*n),
        other => other.as_i64().and_then(|n| u64::try_from(n).ok()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataComparison {
    Identical,
    /// Rows found exactly once across both sides, source rows first.
    Differences(Frame),
}

impl fmt::Display for DataComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identical => f.write_str("Src File and Target Table are identical"),
            Self::Differences(frame) => write!(f, "{}", frame),
        }
    }
}

/// Compare two frames row by row.
///
/// Frames with the same column names holding the same rows in the same
/// order are identical. Otherwise
/// every row that occurs exactly once in `source` followed by `target` is
/// reported; rows repeated anywhere across the two are dropped. The result
/// uses the source's column names.
pub fn data_compare(source: &Frame, target: &Frame) -> DataComparison {
    if source.columns == target.columns && source.rows == target.rows {
        info!(rows = source.len(), "Src File and Target Table are identical");
        return DataComparison::Identical;
    }

    let mut occurrences: HashMap<&[Value], usize> = HashMap::new();
    for row in source.rows.iter().chain(&target.rows) {
        *occurrences.entry(&row[..]).or_default() += 1;
    }

    let rows: Vec<Box<[Value]>> = source
        .rows
        .iter()
        .chain(&target.rows)
        .filter(|row| occurrences.get(&row[..]) == Some(&1))
        .cloned()
        .collect();

    warn!(
        source_rows = source.len(),
        target_rows = target.len(),
        differences = rows.len(),
        "Src File and Target Table differ"
    );
    DataComparison::Differences(Frame::new(source.columns.clone(), rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rows: &[&[&str]]) -> Frame {
        Frame::new(
            vec!["a".into(), "b".into()],
            rows.iter()
                .map(|row| row.iter().map(|v| Value::Text(v.to_string())).collect())
                .collect(),
        )
    }

    fn count_frame(value: Value) -> Frame {
        Frame::new(vec!["count".into()], vec![vec![value].into()])
    }

    #[test]
    fn test_count_equal() {
        let result = count_compare(3, &count_frame(Value::Int(3))).unwrap();
        assert_eq!(result, CountComparison::Equal { rows: 3 });
        assert_eq!(
            result.to_string(),
            "Row Count in File is Equal to Row Count in Target Table"
        );
    }

    #[test]
    fn test_count_mismatch() {
        let result = count_compare(3, &count_frame(Value::Decimal("4".into()))).unwrap();
        assert_eq!(result, CountComparison::Mismatch { source: 3, target: 4 });
    }

    #[test]
    fn test_count_missing() {
        let err = count_compare(3, &Frame::default()).unwrap_err();
        assert!(matches!(err, EtlError::MissingCount));
    }

    #[test]
    fn test_identical() {
        let a = frame(&[&["1", "x"], &["2", "y"]]);
        let result = data_compare(&a, &a.clone());
        assert_eq!(result, DataComparison::Identical);
        assert_eq!(result.to_string(), "Src File and Target Table are identical");
    }

    #[test]
    fn test_renamed_columns_are_not_identical() {
        let a = frame(&[&["1", "x"]]);
        let mut b = a.clone();
        b.columns = vec!["a".into(), "c".into()];
        match data_compare(&a, &b) {
            DataComparison::Differences(diff) => {
                assert!(diff.is_empty());
                assert_eq!(diff.columns, a.columns);
            }
            other => panic!("expected differences, got {:?}", other),
        }
    }

    #[test]
    fn test_differences_keep_rows_seen_once() {
        let a = frame(&[&["1", "x"], &["2", "y"]]);
        let b = frame(&[&["1", "x"], &["3", "z"]]);
        match data_compare(&a, &b) {
            DataComparison::Differences(diff) => {
                assert_eq!(diff, frame(&[&["2", "y"], &["3", "z"]]));
            }
            other => panic!("expected differences, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicates_within_one_side_are_dropped() {
        let a = frame(&[&["1", "x"], &["1", "x"], &["2", "y"]]);
        let b = frame(&[&["2", "y"]]);
        match data_compare(&a, &b) {
            DataComparison::Differences(diff) => assert!(diff.is_empty()),
            other => panic!("expected differences, got {:?}", other),
        }
    }

    #[test]
    fn test_reordered_rows_have_no_differences() {
        let a = frame(&[&["1", "x"], &["2", "y"]]);
        let b = frame(&[&["2", "y"], &["1", "x"]]);
        match data_compare(&a, &b) {
            DataComparison::Differences(diff) => assert!(diff.is_empty()),
            other => panic!("expected differences, got {:?}", other),
        }
    }
}
