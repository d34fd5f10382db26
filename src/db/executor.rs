//! Query execution facade.
//!
//! [`QueryExecutor`] borrows a session and runs statements through one
//! primitive, [`QueryExecutor::run`]: open a scoped cursor tuned for the
//! requested cardinality, fetch, shape each row, close the cursor. The
//! cardinality methods and the derived operations (existence checks,
//! idempotent creates, row counts, rendering) are thin layers over it.

use crate::db::identifier;
use crate::db::session::DbSession;
use crate::db::shape::{Fetch, Shape, ShapedRow};
use crate::db::translate::{CallSite, Disposition, ErrorCategory, ErrorTranslator};
use crate::db::types::Value;
use crate::error::{DbError, DbResult};
use crate::etl::frame::Frame;
use crate::format::format_as_table;
use crate::models::{DatabaseType, QueryParam, Statement};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Reported by [`QueryExecutor::row_count`] for names that do not assert.
pub const INVALID_OBJECT_NAME: &str =
    "Invalid SQL Object Name, Please verify Object Name provided....";

/// Result of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The object was already there; the failure was swallowed.
    AlreadyExists,
    /// The statement failed. The category is `None` for unmapped codes.
    Failed { category: Option<ErrorCategory> },
}

/// Result of a row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowCount {
    Rows(u64),
    /// The table name did not assert; no query was run against it.
    Invalid { message: String },
}

impl fmt::Display for RowCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows(n) => write!(f, "{}", n),
            Self::Invalid { message } => f.write_str(message),
        }
    }
}

/// Query executor over one borrowed session.
pub struct QueryExecutor<'a> {
    session: &'a mut DbSession,
    translator: ErrorTranslator,
}

impl<'a> QueryExecutor<'a> {
    pub(crate) fn new(session: &'a mut DbSession, translator: ErrorTranslator) -> Self {
        Self {
            session,
            translator,
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.session.database_type()
    }

    /// Run a statement and return its rows in the requested shape.
    ///
    /// The cursor is closed before this returns, whether or not the fetch
    /// succeeded. A backend failure undoes this statement only and is logged
    /// with its category before it propagates.
    pub async fn run(
        &mut self,
        stmt: &Statement,
        shape: Shape,
        fetch: Fetch,
    ) -> DbResult<Vec<ShapedRow>> {
        let start = Instant::now();
        debug!(
            sql = %stmt,
            params = stmt.params().len(),
            ?shape,
            ?fetch,
            "Executing query"
        );

        let rows = self
            .session
            .fetch_rows(stmt, fetch)
            .await
            .map_err(|e| self.intercept(e))?;

        debug!(
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query complete"
        );
        Ok(rows.into_iter().map(|row| shape.apply(row)).collect())
    }

    /// The row at 0-indexed position `n`.
    ///
    /// Fails with [`DbError::OutOfRange`] when the result has `n` rows or fewer.
    pub async fn fetch_row(
        &mut self,
        stmt: impl Into<Statement>,
        n: usize,
        shape: Shape,
    ) -> DbResult<ShapedRow> {
        self.run(&stmt.into(), shape, Fetch::Row(n))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::internal("Positioned fetch returned no row"))
    }

    pub async fn fetch_first(
        &mut self,
        stmt: impl Into<Statement>,
        shape: Shape,
    ) -> DbResult<Option<ShapedRow>> {
        Ok(self
            .run(&stmt.into(), shape, Fetch::First)
            .await?
            .into_iter()
            .next())
    }

    pub async fn fetch_last(
        &mut self,
        stmt: impl Into<Statement>,
        shape: Shape,
    ) -> DbResult<Option<ShapedRow>> {
        Ok(self
            .run(&stmt.into(), shape, Fetch::Last)
            .await?
            .into_iter()
            .next())
    }

    /// Up to `k` rows from the start of the result.
    pub async fn fetch_many(
        &mut self,
        stmt: impl Into<Statement>,
        k: usize,
        shape: Shape,
    ) -> DbResult<Vec<ShapedRow>> {
        self.run(&stmt.into(), shape, Fetch::Many(k)).await
    }

    pub async fn fetch_all(
        &mut self,
        stmt: impl Into<Statement>,
        shape: Shape,
    ) -> DbResult<Vec<ShapedRow>> {
        self.run(&stmt.into(), shape, Fetch::All).await
    }

    /// Execute a statement that returns no rows. Nothing is committed.
    pub async fn execute(&mut self, stmt: impl Into<Statement>) -> DbResult<u64> {
        let stmt = stmt.into();
        debug!(sql = %stmt, params = stmt.params().len(), "Executing statement");
        let affected = self
            .session
            .execute(&stmt)
            .await
            .map_err(|e| self.intercept(e))?;
        debug!(rows_affected = affected, "Statement complete");
        Ok(affected)
    }

    pub async fn commit(&mut self) -> DbResult<()> {
        self.session.commit().await
    }

    /// Whether a table, view or routine named `object_name` exists in `schema`.
    ///
    /// Names are compared as stored in the catalog.
    pub async fn object_exists(&mut self, schema: &str, object_name: &str) -> DbResult<bool> {
        let stmt = match self.database_type() {
            DatabaseType::SQLite => {
                let schema = match identifier::assert_schema(self.session, schema).await {
                    Ok(schema) => schema,
                    Err(DbError::InvalidIdentifier { .. }) => return Ok(false),
                    Err(e) => return Err(e),
                };
                Statement::prepared(
                    format!(
                        "SELECT COUNT(1) FROM {}.sqlite_master WHERE name = ? COLLATE NOCASE",
                        identifier::quote_identifier(&schema, DatabaseType::SQLite)
                    ),
                    vec![QueryParam::from(object_name)],
                )
            }
            db_type => catalog_lookup(db_type, schema, object_name),
        };

        let count = self.scalar_count(stmt).await?;
        debug!(schema = %schema, object = %object_name, count, "Checked object existence");
        Ok(count > 0)
    }

    /// Execute a creating statement and commit it.
    ///
    /// Backend failures never propagate: an existing object is reported as
    /// [`CreateOutcome::AlreadyExists`], anything else as
    /// [`CreateOutcome::Failed`] after it has been logged.
    pub async fn create_with_commit(
        &mut self,
        stmt: impl Into<Statement>,
    ) -> DbResult<CreateOutcome> {
        let stmt = stmt.into();
        let result = match self.session.execute(&stmt).await {
            Ok(_) => self.session.commit().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(sql = %stmt, "Object created");
                Ok(CreateOutcome::Created)
            }
            Err(err) if err.is_backend() => {
                Ok(match self.translator.translate(&err, CallSite::Create) {
                    Disposition::Ignored => {
                        debug!("Object already exists");
                        CreateOutcome::AlreadyExists
                    }
                    Disposition::Reported(category) | Disposition::Fatal(category) => {
                        CreateOutcome::Failed {
                            category: Some(category),
                        }
                    }
                    Disposition::Unmapped => CreateOutcome::Failed { category: None },
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Count the rows of a table or view.
    ///
    /// The name is asserted and resolved in the catalog first. Names that do
    /// not assert yield [`RowCount::Invalid`] without running the count.
    pub async fn row_count(&mut self, table_name: &str) -> DbResult<RowCount> {
        let canonical = match identifier::resolve_table(self.session, table_name).await {
            Ok(canonical) => canonical,
            Err(DbError::InvalidIdentifier { name, reason }) => {
                warn!(name = %name, reason = %reason, "{}", INVALID_OBJECT_NAME);
                return Ok(RowCount::Invalid {
                    message: INVALID_OBJECT_NAME.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let count = self
            .scalar_count(Statement::from(format!("SELECT COUNT(1) FROM {}", canonical)))
            .await?;
        Ok(RowCount::Rows(count))
    }

    /// Column names of a statement's result.
    ///
    /// Taken from the first row when there is one; otherwise the statement
    /// is described without fetching.
    pub async fn column_names(&mut self, stmt: impl Into<Statement>) -> DbResult<Vec<String>> {
        let stmt = stmt.into();
        let rows = self
            .session
            .fetch_rows(&stmt, Fetch::First)
            .await
            .map_err(|e| self.intercept(e))?;
        match rows.first() {
            Some(row) => Ok(row.columns.to_vec()),
            None => self.describe_columns(&stmt).await,
        }
    }

    /// Fetch every row and render it as a bordered grid.
    pub async fn render_table(&mut self, stmt: impl Into<Statement>) -> DbResult<String> {
        let stmt = stmt.into();
        let rows: Vec<Box<[Value]>> = self
            .run(&stmt, Shape::Tuple, Fetch::All)
            .await?
            .into_iter()
            .filter_map(ShapedRow::into_tuple)
            .collect();
        let columns = self.column_names(stmt).await?;
        Ok(format_as_table(&columns, &rows))
    }

    /// Fetch every row into a [`Frame`].
    pub async fn fetch_frame(&mut self, stmt: impl Into<Statement>) -> DbResult<Frame> {
        let stmt = stmt.into();
        let rows = self
            .session
            .fetch_rows(&stmt, Fetch::All)
            .await
            .map_err(|e| self.intercept(e))?;
        let columns = match rows.first() {
            Some(row) => row.columns.to_vec(),
            None => self.describe_columns(&stmt).await?,
        };
        Ok(Frame::new(
            columns,
            rows.into_iter()
                .map(|row| row.values.into_boxed_slice())
                .collect(),
        ))
    }

    /// The server's version string.
    pub async fn db_version(&mut self) -> DbResult<String> {
        let sql = match self.database_type() {
            DatabaseType::PostgreSQL | DatabaseType::MySQL => "SELECT version()",
            DatabaseType::SQLite => "SELECT sqlite_version()",
        };
        let version = self
            .fetch_first(sql, Shape::Tuple)
            .await?
            .and_then(ShapedRow::into_tuple)
            .and_then(|values| values.first().map(Value::to_string))
            .ok_or_else(|| DbError::internal("Version query returned no row"))?;
        debug!(version = %version, "Got server version");
        Ok(version)
    }

    async fn describe_columns(&mut self, stmt: &Statement) -> DbResult<Vec<String>> {
        self.session
            .describe_columns(stmt.sql())
            .await
            .map_err(|e| self.intercept(e))
    }

    /// Log a backend failure with its category, then hand it back.
    fn intercept(&self, err: DbError) -> DbError {
        if err.is_backend() {
            self.translator.translate(&err, CallSite::General);
        }
        err
    }

    /// First column of the first row as a non-negative count.
    async fn scalar_count(&mut self, stmt: Statement) -> DbResult<u64> {
        let value = self
            .run(&stmt, Shape::Tuple, Fetch::First)
            .await?
            .into_iter()
            .next()
            .and_then(ShapedRow::into_tuple)
            .and_then(|values| values.first().and_then(Value::as_i64));
        value
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| DbError::internal("Count query did not return a count"))
    }
}

/// Existence query over the server catalog for tables, views and routines.
///
/// SQLite keeps one catalog per attached schema; this form only covers `main`.
fn catalog_lookup(db_type: DatabaseType, schema: &str, object_name: &str) -> Statement {
    match db_type {
        DatabaseType::PostgreSQL => Statement::prepared(
            "SELECT COUNT(1) FROM (\
             SELECT c.relname FROM pg_catalog.pg_class c \
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relname = $2 \
             UNION ALL \
             SELECT p.proname FROM pg_catalog.pg_proc p \
             JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace \
             WHERE n.nspname = $1 AND p.proname = $2) AS objects",
            vec![schema.into(), object_name.into()],
        ),
        DatabaseType::MySQL => Statement::prepared(
            "SELECT COUNT(1) FROM (\
             SELECT table_name FROM information_schema.tables \
             WHERE table_schema = ? AND table_name = ? \
             UNION ALL \
             SELECT routine_name FROM information_schema.routines \
             WHERE routine_schema = ? AND routine_name = ?) AS objects",
            vec![
                schema.into(),
                object_name.into(),
                schema.into(),
                object_name.into(),
            ],
        ),
        DatabaseType::SQLite => Statement::prepared(
            "SELECT COUNT(1) FROM main.sqlite_master WHERE name = ? COLLATE NOCASE",
            vec![QueryParam::from(object_name)],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_count_display() {
        assert_eq!(RowCount::Rows(42).to_string(), "42");
        let invalid = RowCount::Invalid {
            message: INVALID_OBJECT_NAME.to_string(),
        };
        assert_eq!(invalid.to_string(), INVALID_OBJECT_NAME);
    }

    #[test]
    fn test_catalog_lookup_covers_routines() {
        let pg = catalog_lookup(DatabaseType::PostgreSQL, "etl", "refresh_trips");
        assert!(pg.sql().contains("pg_catalog.pg_class"));
        assert!(pg.sql().contains("pg_catalog.pg_proc"));
        assert_eq!(pg.params().len(), 2);

        let mysql = catalog_lookup(DatabaseType::MySQL, "etl", "refresh_trips");
        assert!(mysql.sql().contains("information_schema.routines"));
        assert_eq!(mysql.params().len(), 4);
    }
}
