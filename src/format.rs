//! Output formatting for query results.
//!
//! Renders tuple rows as a psql-style bordered grid, or as JSON records.

use crate::db::types::Value;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthStr;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Bordered grid (like psql)
    #[default]
    Table,
    /// One JSON object per row
    Json,
}

pub fn format_value(value: &Value) -> String {
    value.to_string()
}

/// Render rows as a grid:
///
/// ```text
/// +----+-------+
/// | id | name  |
/// |----+-------|
/// |  1 | alpha |
/// +----+-------+
/// ```
pub fn format_as_table(columns: &[String], rows: &[Box<[Value]>]) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.width());
        }
    }

    let border = |left: &str, joint: &str, right: &str| -> String {
        let inner = widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join(joint);
        format!("{left}{inner}{right}\n")
    };

    let mut output = String::new();
    output.push_str(&border("+", "+", "+"));
    output.push_str(&render_line(
        columns.iter().map(|c| (c.as_str(), false)),
        &widths,
    ));
    output.push_str(&border("|", "+", "|"));

    for (row, values) in cells.iter().zip(rows) {
        output.push_str(&render_line(
            row.iter()
                .zip(values.iter())
                .map(|(cell, value)| (cell.as_str(), value.is_numeric())),
            &widths,
        ));
    }

    output.push_str(&border("+", "+", "+"));
    output
}

fn render_line<'a>(cells: impl Iterator<Item = (&'a str, bool)>, widths: &[usize]) -> String {
    let mut line = String::from("|");
    for ((text, right_align), width) in cells.zip(widths) {
        // format! pads by char count, so pad by display width manually
        let padding = " ".repeat(width.saturating_sub(text.width()));
        if right_align {
            line.push_str(&format!(" {padding}{text} |"));
        } else {
            line.push_str(&format!(" {text}{padding} |"));
        }
    }
    line.push('\n');
    line
}

/// Render rows as a JSON array of objects keyed by column name.
pub fn format_as_json(columns: &[String], rows: &[Box<[Value]>]) -> serde_json::Result<String> {
    let records: Vec<serde_json::Map<String, serde_json::Value>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .zip(row.iter())
                .map(|(name, value)| serde_json::to_value(value).map(|v| (name.clone(), v)))
                .collect::<serde_json::Result<serde_json::Map<_, _>>>()
        })
        .collect::<serde_json::Result<_>>()?;
    serde_json::to_string_pretty(&records)
}
