//! Tabular data held in memory.
//!
//! A [`Frame`] is a list of column names plus rows of values. Frames are
//! read from CSV files or fetched from the database, then compared.

use crate::db::types::Value;
use crate::error::{EtlError, EtlResult};
use crate::format::format_as_table;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Columns read from a trip file for loading and reconciliation.
pub const DESIRED_COLUMNS: [&str; 10] = [
    "pick_up_time",
    "drop_off_time",
    "trip_distance",
    "trip_fare",
    "payment_method",
    "cab_color",
    "pickup_location",
    "pickup_zone",
    "dropoff_location",
    "dropoff_zone",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Box<[Value]>>,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Box<[Value]>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first value of the first row, as returned by scalar queries.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_as_table(&self.columns, &self.rows))
    }
}

/// Read the `desired` columns of a CSV file, in the order given.
///
/// Every value is read as text; empty fields become `NULL`.
pub fn read_csv(path: &Path, desired: &[&str]) -> EtlResult<Frame> {
    let mut reader = csv::Reader::from_path(path)?;
    let indices = column_indices(reader.headers()?, desired, path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Box<[Value]> = indices
            .iter()
            .map(|&i| match record.get(i) {
                Some("") | None => Value::Null,
                Some(field) => Value::Text(field.to_string()),
            })
            .collect();
        rows.push(row);
    }

    debug!(path = %path.display(), rows = rows.len(), "Read CSV file");
    Ok(Frame::new(
        desired.iter().map(|c| c.to_string()).collect(),
        rows,
    ))
}

/// Number of data rows in a CSV file that has all `desired` columns.
pub fn csv_row_count(path: &Path, desired: &[&str]) -> EtlResult<usize> {
    let mut reader = csv::Reader::from_path(path)?;
    column_indices(reader.headers()?, desired, path)?;

    let mut count = 0;
    for record in reader.records() {
        record?;
        count += 1;
    }
    Ok(count)
}

fn column_indices(
    headers: &csv::StringRecord,
    desired: &[&str],
    path: &Path,
) -> EtlResult<Vec<usize>> {
    desired
        .iter()
        .map(|column| {
            headers
                .iter()
                .position(|h| h == *column)
                .ok_or_else(|| EtlError::MissingColumn {
                    column: column.to_string(),
                    source_name: path.display().to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_csv_selects_columns_in_order() {
        let file = write_file("a,b,c\n1,2,3\n4,,6\n");
        let frame = read_csv(file.path(), &["c", "b"]).unwrap();
        assert_eq!(frame.columns, ["c", "b"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.rows[0][0], Value::Text("3".into()));
        assert_eq!(frame.rows[1][1], Value::Null);
    }

    #[test]
    fn test_read_csv_missing_column() {
        let file = write_file("a,b\n1,2\n");
        let err = read_csv(file.path(), &["a", "z"]).unwrap_err();
        assert!(matches!(err, EtlError::MissingColumn { ref column, .. } if column == "z"));
    }

    #[test]
    fn test_csv_row_count() {
        let file = write_file("a,b\n1,2\n3,4\n5,6\n");
        assert_eq!(csv_row_count(file.path(), &["b"]).unwrap(), 3);
    }

    #[test]
    fn test_csv_row_count_header_only() {
        let file = write_file("a,b\n");
        assert_eq!(csv_row_count(file.path(), &["a"]).unwrap(), 0);
    }

    #[test]
    fn test_scalar() {
        let frame = Frame::new(vec!["count".into()], vec![vec![Value::Int(3)].into()]);
        assert_eq!(frame.scalar(), Some(&Value::Int(3)));
        assert_eq!(Frame::default().scalar(), None);
    }
}
