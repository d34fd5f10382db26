//! Loading CSV files into a staging table.

use crate::db::executor::{CreateOutcome, QueryExecutor};
use crate::db::identifier::{QualifiedName, quote_identifier};
use crate::db::types::Value;
use crate::error::{EtlError, EtlResult};
use crate::etl::frame::read_csv;
use crate::models::{DatabaseType, QueryParam, Statement};
use std::path::Path;
use tracing::{debug, info};

/// Rows bound per INSERT statement.
const INSERT_BATCH_ROWS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub table: String,
    /// Whether the staging table was created by this load.
    pub created: bool,
    pub rows: usize,
}

/// Load the `columns` of a CSV file into `table`.
///
/// The table is created with one text column per loaded column when it does
/// not exist yet. Rows are inserted with prepared statements and committed
/// once at the end.
pub async fn load_csv(
    executor: &mut QueryExecutor<'_>,
    path: &Path,
    table: &str,
    columns: &[&str],
) -> EtlResult<LoadSummary> {
    let db_type = executor.database_type();
    let target = QualifiedName::parse(table, db_type)?.quoted();
    let frame = read_csv(path, columns)?;

    let quoted_columns: Vec<String> = columns
        .iter()
        .map(|c| quote_identifier(c, db_type))
        .collect();
    let definitions = quoted_columns
        .iter()
        .map(|c| format!("{} TEXT", c))
        .collect::<Vec<_>>()
        .join(", ");

    let created = match executor
        .create_with_commit(format!("CREATE TABLE {} ({})", target, definitions))
        .await?
    {
        CreateOutcome::Created => true,
        CreateOutcome::AlreadyExists => false,
        CreateOutcome::Failed { category } => {
            return Err(EtlError::CreateFailed {
                table: table.to_string(),
                category,
            });
        }
    };

    let column_list = quoted_columns.join(", ");
    for batch in frame.rows.chunks(INSERT_BATCH_ROWS) {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            target,
            column_list,
            values_clause(db_type, batch.len(), columns.len())
        );
        let params = batch
            .iter()
            .flat_map(|row| row.iter().map(to_param))
            .collect();
        executor.execute(Statement::prepared(sql, params)).await?;
        debug!(rows = batch.len(), "Inserted batch");
    }
    executor.commit().await?;

    info!(table = %table, rows = frame.len(), created, "Loaded CSV file");
    Ok(LoadSummary {
        table: table.to_string(),
        created,
        rows: frame.len(),
    })
}

/// `(?, ?), (?, ?)` for MySQL and SQLite, `($1, $2), ($3, $4)` for PostgreSQL.
fn values_clause(db_type: DatabaseType, rows: usize, width: usize) -> String {
    (0..rows)
        .map(|row| {
            let placeholders = (0..width)
                .map(|col| match db_type {
                    DatabaseType::PostgreSQL => format!("${}", row * width + col + 1),
                    DatabaseType::MySQL | DatabaseType::SQLite => "?".to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", placeholders)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_param(value: &Value) -> QueryParam {
    match value {
        Value::Null => QueryParam::Null,
        Value::Bool(b) => QueryParam::Bool(*b),
        Value::Int(n) => QueryParam::Int(*n),
        Value::UInt(n) => match i64::try_from(*n) {
            Ok(n) => QueryParam::Int(n),
            Err(_) => QueryParam::String(n.to_string()),
        },
        Value::Float(f) => QueryParam::Float(*f),
        Value::Decimal(s) | Value::Text(s) | Value::Json(s) => QueryParam::String(s.clone()),
        Value::Bytes(b) => QueryParam::Bytes(b.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_clause_postgres_numbers_placeholders() {
        assert_eq!(
            values_clause(DatabaseType::PostgreSQL, 2, 2),
            "($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_values_clause_positional() {
        assert_eq!(values_clause(DatabaseType::SQLite, 1, 3), "(?, ?, ?)");
        assert_eq!(values_clause(DatabaseType::MySQL, 2, 1), "(?), (?)");
    }

    #[test]
    fn test_to_param() {
        assert_eq!(to_param(&Value::Null), QueryParam::Null);
        assert_eq!(
            to_param(&Value::Text("cash".into())),
            QueryParam::String("cash".into())
        );
        assert_eq!(to_param(&Value::UInt(7)), QueryParam::Int(7));
        assert_eq!(
            to_param(&Value::UInt(u64::MAX)),
            QueryParam::String(u64::MAX.to_string())
        );
    }
}
