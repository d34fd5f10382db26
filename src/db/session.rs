//! Sessions: one backend connection plus its unit-of-work state.
//!
//! A session opens a unit of work lazily, immediately before the first
//! statement that runs after a commit or rollback. The unit of work ends on
//! `commit` or `rollback`. Inside it every statement runs under a savepoint,
//! so a failing statement is undone on its own and earlier pending work
//! survives. Releasing or disconnecting a session rolls back whatever is
//! still uncommitted.

use crate::db::cursor::{FetchTuning, ScopedCursor};
use crate::db::executor::QueryExecutor;
use crate::db::params;
use crate::db::shape::Fetch;
use crate::db::translate::ErrorTranslator;
use crate::db::types::RawRow;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Statement};
use sqlx::pool::PoolConnection;
use sqlx::{Column, Connection, Database, Executor, MySql, Postgres, Sqlite};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

const STATEMENT_SAVEPOINT: &str = "dbkit_statement";

/// A connection that is either borrowed from a pool or owned outright.
pub(crate) enum Handle<DB: Database> {
    Pooled(PoolConnection<DB>),
    Direct(DB::Connection),
}

impl<DB: Database> Handle<DB> {
    pub(crate) fn conn(&mut self) -> &mut DB::Connection {
        match self {
            Handle::Pooled(conn) => &mut **conn,
            Handle::Direct(conn) => conn,
        }
    }

    async fn close(self) -> Result<(), sqlx::Error> {
        match self {
            Handle::Pooled(conn) => conn.detach().close().await,
            Handle::Direct(conn) => conn.close().await,
        }
    }
}

/// Database-specific session connection.
pub(crate) enum SessionConn {
    MySql(Handle<MySql>),
    Postgres(Handle<Postgres>),
    SQLite(Handle<Sqlite>),
}

impl SessionConn {
    async fn execute(&mut self, stmt: &Statement) -> Result<u64, sqlx::Error> {
        let (sql, args) = (stmt.sql(), stmt.params());
        let affected = match self {
            SessionConn::MySql(h) if args.is_empty() => h.conn().execute(sql).await?.rows_affected(),
            SessionConn::MySql(h) => params::mysql_query(sql, args)
                .execute(h.conn())
                .await?
                .rows_affected(),
            SessionConn::Postgres(h) if args.is_empty() => {
                h.conn().execute(sql).await?.rows_affected()
            }
            SessionConn::Postgres(h) => params::postgres_query(sql, args)
                .execute(h.conn())
                .await?
                .rows_affected(),
            SessionConn::SQLite(h) if args.is_empty() => {
                h.conn().execute(sql).await?.rows_affected()
            }
            SessionConn::SQLite(h) => params::sqlite_query(sql, args)
                .execute(h.conn())
                .await?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn describe_columns(&mut self, sql: &str) -> Result<Vec<String>, sqlx::Error> {
        use sqlx::Statement as _;

        let names = match self {
            SessionConn::MySql(h) => column_names(h.conn().prepare(sql).await?.columns()),
            SessionConn::Postgres(h) => column_names(h.conn().prepare(sql).await?.columns()),
            SessionConn::SQLite(h) => column_names(h.conn().prepare(sql).await?.columns()),
        };
        Ok(names)
    }

    async fn close(self) -> Result<(), sqlx::Error> {
        match self {
            SessionConn::MySql(h) => h.close().await,
            SessionConn::Postgres(h) => h.close().await,
            SessionConn::SQLite(h) => h.close().await,
        }
    }
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

/// Lifecycle of the session's current unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitOfWork {
    Idle,
    Open,
    /// Every statement commits on its own; no unit of work is ever opened.
    Autocommit,
}

/// One connection and its unit-of-work state.
pub struct DbSession {
    conn: SessionConn,
    db_type: DatabaseType,
    user: String,
    unit_of_work: UnitOfWork,
    open_cursors: Arc<AtomicUsize>,
}

impl std::fmt::Debug for DbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSession")
            .field("db_type", &self.db_type)
            .field("user", &self.user)
            .field("unit_of_work", &self.unit_of_work)
            .field("open_cursors", &self.open_cursors())
            .finish()
    }
}

impl DbSession {
    pub(crate) fn new(conn: SessionConn, db_type: DatabaseType, user: String) -> Self {
        Self {
            conn,
            db_type,
            user,
            unit_of_work: UnitOfWork::Idle,
            open_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run every statement in its own implicit transaction.
    pub(crate) fn into_autocommit(mut self) -> Self {
        self.unit_of_work = UnitOfWork::Autocommit;
        self
    }

    pub fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Number of cursors currently open on this session.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::Acquire)
    }

    /// Whether uncommitted work is pending.
    pub fn in_unit_of_work(&self) -> bool {
        self.unit_of_work == UnitOfWork::Open
    }

    /// Borrow a query executor over this session.
    pub fn executor(&mut self) -> QueryExecutor<'_> {
        QueryExecutor::new(self, ErrorTranslator::default())
    }

    pub async fn commit(&mut self) -> DbResult<()> {
        if self.unit_of_work != UnitOfWork::Open {
            debug!("Commit requested with no pending work");
            return Ok(());
        }
        match self.conn.execute(&Statement::from("COMMIT")).await {
            Ok(_) => {
                self.unit_of_work = UnitOfWork::Idle;
                debug!(user = %self.user, "Committed");
                Ok(())
            }
            Err(e) => {
                let err = DbError::from(e);
                self.rollback_quietly().await;
                Err(err)
            }
        }
    }

    pub async fn rollback(&mut self) -> DbResult<()> {
        if self.unit_of_work != UnitOfWork::Open {
            return Ok(());
        }
        // The unit of work is over whether or not ROLLBACK succeeds
        self.unit_of_work = UnitOfWork::Idle;
        self.conn.execute(&Statement::from("ROLLBACK")).await?;
        debug!(user = %self.user, "Rolled back");
        Ok(())
    }

    /// Roll back, logging instead of returning any failure.
    pub(crate) async fn rollback_quietly(&mut self) {
        if let Err(e) = self.rollback().await {
            warn!(error = %e, "Rollback failed");
        }
    }

    /// Return the connection to its pool, discarding uncommitted work.
    ///
    /// A direct connection has no pool and is dropped.
    pub async fn release(mut self) {
        self.rollback_quietly().await;
        debug!(user = %self.user, "Session released");
    }

    /// Close the underlying connection, discarding uncommitted work.
    ///
    /// A pooled connection is detached from its pool first, so the pool
    /// opens a replacement on demand.
    pub async fn disconnect(mut self) -> DbResult<()> {
        self.rollback_quietly().await;
        self.conn.close().await?;
        debug!(user = %self.user, "Session disconnected");
        Ok(())
    }

    async fn begin_if_needed(&mut self) -> DbResult<()> {
        if self.unit_of_work != UnitOfWork::Idle {
            return Ok(());
        }
        self.conn.execute(&Statement::from("BEGIN")).await?;
        self.unit_of_work = UnitOfWork::Open;
        Ok(())
    }

    /// Open the unit of work if needed and mark a savepoint for the next
    /// statement. Returns whether a savepoint was set.
    async fn begin_statement(&mut self) -> DbResult<bool> {
        self.begin_if_needed().await?;
        if self.unit_of_work != UnitOfWork::Open {
            return Ok(false);
        }
        self.conn
            .execute(&Statement::from(format!("SAVEPOINT {}", STATEMENT_SAVEPOINT)))
            .await?;
        Ok(true)
    }

    /// Undo a statement that failed in the backend, then drop its savepoint.
    ///
    /// When the savepoint cannot be restored the whole unit of work is rolled
    /// back instead.
    async fn settle<T>(&mut self, savepoint: bool, result: DbResult<T>) -> DbResult<T> {
        if !savepoint {
            return result;
        }
        if matches!(&result, Err(err) if err.is_backend()) {
            let undo = Statement::from(format!("ROLLBACK TO SAVEPOINT {}", STATEMENT_SAVEPOINT));
            if let Err(e) = self.conn.execute(&undo).await {
                warn!(error = %e, "Savepoint rollback failed, discarding unit of work");
                self.rollback_quietly().await;
                return result;
            }
            debug!(user = %self.user, "Failed statement rolled back");
        }
        let release = Statement::from(format!("RELEASE SAVEPOINT {}", STATEMENT_SAVEPOINT));
        if let Err(e) = self.conn.execute(&release).await {
            // MySQL DDL commits implicitly and drops the savepoint with it
            debug!(error = %e, "Savepoint already gone");
        }
        result
    }

    /// Execute a statement that returns no rows.
    pub(crate) async fn execute(&mut self, stmt: &Statement) -> DbResult<u64> {
        let savepoint = self.begin_statement().await?;
        let result = self.conn.execute(stmt).await.map_err(DbError::from);
        self.settle(savepoint, result).await
    }

    /// Open a cursor over the statement's result.
    ///
    /// The cursor mutably borrows the session, so nothing else can run on it
    /// until the cursor is dropped.
    async fn open_cursor<'c>(
        &'c mut self,
        stmt: &'c Statement,
        tuning: FetchTuning,
    ) -> DbResult<ScopedCursor<'c>> {
        let counter = Arc::clone(&self.open_cursors);
        ScopedCursor::open(&mut self.conn, stmt, tuning, counter).await
    }

    /// Fetch rows with a cursor that is closed before this returns.
    pub(crate) async fn fetch_rows(
        &mut self,
        stmt: &Statement,
        fetch: Fetch,
    ) -> DbResult<Vec<RawRow>> {
        let savepoint = self.begin_statement().await?;
        let result = match self.open_cursor(stmt, FetchTuning::for_fetch(fetch)).await {
            Ok(mut cursor) => cursor.fetch(fetch).await,
            Err(e) => Err(e),
        };
        self.settle(savepoint, result).await
    }

    /// Column names of a statement's result without fetching any rows.
    pub(crate) async fn describe_columns(&mut self, sql: &str) -> DbResult<Vec<String>> {
        let savepoint = self.begin_statement().await?;
        let result = self.conn.describe_columns(sql).await.map_err(DbError::from);
        self.settle(savepoint, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use crate::db::pool::SessionPool;
    use crate::db::types::Value;
    use crate::models::{ConnectionConfig, Credentials};

    async fn session(dir: &tempfile::TempDir) -> (SessionPool, DbSession) {
        let url = format!("sqlite:{}", dir.path().join("session.db").display());
        let pool = SessionPool::new(ConnectionConfig::new(url, PoolOptions::default()).unwrap());
        let mut session = pool.acquire(&Credentials::new("etl", "")).await.unwrap();
        session
            .execute(&Statement::from("CREATE TABLE t (id INTEGER)"))
            .await
            .unwrap();
        session.commit().await.unwrap();
        (pool, session)
    }

    async fn count(session: &mut DbSession) -> Option<i64> {
        let rows = session
            .fetch_rows(&Statement::from("SELECT COUNT(*) FROM t"), Fetch::First)
            .await
            .unwrap();
        rows[0].values[0].as_i64()
    }

    #[tokio::test]
    async fn test_unit_of_work_opens_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let (_pool, mut session) = session(&dir).await;
        assert!(!session.in_unit_of_work());

        session
            .execute(&Statement::from("INSERT INTO t VALUES (1)"))
            .await
            .unwrap();
        assert!(session.in_unit_of_work());

        session.commit().await.unwrap();
        assert!(!session.in_unit_of_work());
        assert_eq!(count(&mut session).await, Some(1));
    }

    #[tokio::test]
    async fn test_rollback_discards_pending_work() {
        let dir = tempfile::tempdir().unwrap();
        let (_pool, mut session) = session(&dir).await;
        session
            .execute(&Statement::from("INSERT INTO t VALUES (1)"))
            .await
            .unwrap();
        session.rollback().await.unwrap();
        assert_eq!(count(&mut session).await, Some(0));
    }

    #[tokio::test]
    async fn test_failed_statement_keeps_pending_work() {
        let dir = tempfile::tempdir().unwrap();
        let (_pool, mut session) = session(&dir).await;
        session
            .execute(&Statement::from("INSERT INTO t VALUES (1)"))
            .await
            .unwrap();

        let err = session
            .execute(&Statement::from("INSERT INTO missing VALUES (1)"))
            .await
            .unwrap_err();
        assert!(err.is_backend());
        assert!(session.in_unit_of_work());

        let err = session
            .fetch_rows(&Statement::from("SELECT nope FROM t"), Fetch::All)
            .await
            .unwrap_err();
        assert!(err.is_backend());
        assert!(session.in_unit_of_work());
        assert_eq!(session.open_cursors(), 0);

        session.commit().await.unwrap();
        assert_eq!(count(&mut session).await, Some(1));
    }

    #[tokio::test]
    async fn test_failed_statement_is_undone() {
        let dir = tempfile::tempdir().unwrap();
        let (_pool, mut session) = session(&dir).await;
        session
            .execute(&Statement::from("CREATE UNIQUE INDEX t_id ON t (id)"))
            .await
            .unwrap();
        session
            .execute(&Statement::from("INSERT INTO t VALUES (1)"))
            .await
            .unwrap();

        // The second row violates the index, so neither row of this insert stays
        session
            .execute(&Statement::from("INSERT INTO t VALUES (2), (1)"))
            .await
            .unwrap_err();
        session.commit().await.unwrap();
        assert_eq!(count(&mut session).await, Some(1));
    }

    #[tokio::test]
    async fn test_out_of_range_keeps_unit_of_work() {
        let dir = tempfile::tempdir().unwrap();
        let (_pool, mut session) = session(&dir).await;
        session
            .execute(&Statement::from("INSERT INTO t VALUES (7)"))
            .await
            .unwrap();

        let err = session
            .fetch_rows(&Statement::from("SELECT id FROM t"), Fetch::Row(3))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::OutOfRange { position: 3, available: 1 }));
        assert!(session.in_unit_of_work());
        assert_eq!(session.open_cursors(), 0);

        session.commit().await.unwrap();
        let rows = session
            .fetch_rows(&Statement::from("SELECT id FROM t"), Fetch::All)
            .await
            .unwrap();
        assert_eq!(rows[0].values, vec![Value::Int(7)]);
    }

    #[tokio::test]
    async fn test_release_returns_connection() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, session) = session(&dir).await;
        session.release().await;

        // The single SQLite connection is available again
        let again = pool.acquire(&Credentials::new("etl", "")).await.unwrap();
        assert_eq!(again.user(), "etl");
        again.disconnect().await.unwrap();
    }
}
