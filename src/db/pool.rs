//! Session pools.
//!
//! A [`SessionPool`] holds one database-specific sqlx pool per user. Pools are
//! created lazily on the first acquisition for that user, so a process that
//! only ever works as one user opens exactly one pool. Every user shares the
//! connection string and pool sizing of the [`ConnectionConfig`].

use crate::db::session::{DbSession, Handle, SessionConn};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, Credential, Credentials, DatabaseType};
use sqlx::Connection;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::{MySqlPool, PgPool, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    async fn acquire(&self) -> Result<SessionConn, sqlx::Error> {
        Ok(match self {
            DbPool::MySql(pool) => SessionConn::MySql(Handle::Pooled(pool.acquire().await?)),
            DbPool::Postgres(pool) => SessionConn::Postgres(Handle::Pooled(pool.acquire().await?)),
            DbPool::SQLite(pool) => SessionConn::SQLite(Handle::Pooled(pool.acquire().await?)),
        })
    }
}

/// Parsed, credential-carrying connect options for one backend.
enum ConnectOptions {
    MySql(MySqlConnectOptions),
    Postgres(PgConnectOptions),
    SQLite(SqliteConnectOptions),
}

impl ConnectOptions {
    /// Parse the connection string and apply the user's credentials.
    ///
    /// SQLite has no notion of users; its credentials are ignored. An empty
    /// user or credential keeps whatever the connection string carries.
    fn build(
        db_type: DatabaseType,
        connection_string: &str,
        user: &str,
        credential: &Credential,
    ) -> DbResult<Self> {
        let secret = credential.expose();
        match db_type {
            DatabaseType::MySQL => {
                let mut options = MySqlConnectOptions::from_str(connection_string)
                    .map_err(|e| {
                        DbError::connection(
                            format!("Invalid MySQL connection string: {}", e),
                            "Check the connection URL format: mysql://host:port/database",
                        )
                    })?
                    .charset("utf8mb4");
                if !user.is_empty() {
                    options = options.username(user);
                }
                if !secret.is_empty() {
                    options = options.password(secret);
                }
                Ok(Self::MySql(options))
            }
            DatabaseType::PostgreSQL => {
                let mut options = PgConnectOptions::from_str(connection_string).map_err(|e| {
                    DbError::connection(
                        format!("Invalid PostgreSQL connection string: {}", e),
                        "Check the connection URL format: postgres://host:5432/database",
                    )
                })?;
                if !user.is_empty() {
                    options = options.username(user);
                }
                if !secret.is_empty() {
                    options = options.password(secret);
                }
                Ok(Self::Postgres(options))
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(connection_string)
                    .map_err(|e| {
                        DbError::connection(
                            format!("Invalid SQLite connection string: {}", e),
                            "Check the connection URL format: sqlite:path/to/db.sqlite",
                        )
                    })?
                    .create_if_missing(true)
                    .read_only(false);
                Ok(Self::SQLite(options))
            }
        }
    }
}

struct SessionPoolInner {
    config: ConnectionConfig,
    /// Per-user lazy pools. OnceCell ensures single-flight creation.
    pools: RwLock<HashMap<String, Arc<OnceCell<DbPool>>>>,
}

/// Lazily created per-user connection pools sharing one configuration.
///
/// Cloning is cheap; clones share the same pools.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<SessionPoolInner>,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("db_type", &self.inner.config.db_type)
            .field("connection", &self.inner.config.masked_connection_string())
            .finish_non_exhaustive()
    }
}

impl SessionPool {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(SessionPoolInner {
                config,
                pools: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn db_type(&self) -> DatabaseType {
        self.inner.config.db_type
    }

    /// Acquire a pooled session for the given user.
    ///
    /// The user's pool is created on first use. A failed creation leaves no
    /// pool behind, so the next acquisition retries.
    pub async fn acquire(&self, credentials: &Credentials) -> DbResult<DbSession> {
        let pool = self.get_or_create(credentials).await?;
        let db_type = pool.db_type();
        let conn = pool
            .acquire()
            .await
            .map_err(|e| connect_error(db_type, e))?;
        debug!(user = %credentials.user, "Acquired pooled session");
        Ok(DbSession::new(conn, db_type, credentials.user.clone()))
    }

    /// Open a standalone connection outside any pool.
    ///
    /// `connection_string` overrides the configured one when given.
    pub async fn connect_direct(
        &self,
        user: &str,
        credential: &Credential,
        connection_string: Option<&str>,
    ) -> DbResult<DbSession> {
        let config = &self.inner.config;
        let connection_string = connection_string.unwrap_or(&config.connection_string);
        let db_type = DatabaseType::from_connection_string(connection_string).ok_or_else(|| {
            DbError::invalid_input("Unknown database type for the direct connection string")
        })?;

        let conn = match ConnectOptions::build(db_type, connection_string, user, credential)? {
            ConnectOptions::MySql(options) => SessionConn::MySql(Handle::Direct(
                MySqlConnection::connect_with(&options)
                    .await
                    .map_err(|e| connect_error(db_type, e))?,
            )),
            ConnectOptions::Postgres(options) => SessionConn::Postgres(Handle::Direct(
                PgConnection::connect_with(&options)
                    .await
                    .map_err(|e| connect_error(db_type, e))?,
            )),
            ConnectOptions::SQLite(options) => SessionConn::SQLite(Handle::Direct(
                SqliteConnection::connect_with(&options)
                    .await
                    .map_err(|e| connect_error(db_type, e))?,
            )),
        };
        info!(user = %user, db_type = %db_type, "Opened direct connection");
        Ok(DbSession::new(conn, db_type, user.to_string()))
    }

    /// Number of initialized pools.
    pub async fn pool_count(&self) -> usize {
        let pools = self.inner.pools.read().await;
        pools.values().filter(|cell| cell.get().is_some()).count()
    }

    /// Close every pool. Sessions still checked out are closed when returned.
    pub async fn close_all(&self) {
        // Drain pools under lock, close outside lock
        let pools_to_close: Vec<_> = {
            let mut pools = self.inner.pools.write().await;
            pools.drain().collect()
        };

        for (user, cell) in pools_to_close {
            if let Some(pool) = cell.get() {
                info!(user = %user, "Closing session pool");
                pool.close().await;
            }
        }
    }

    async fn get_or_create(&self, credentials: &Credentials) -> DbResult<DbPool> {
        let key = pool_key(self.db_type(), &credentials.user);
        let cell = {
            let pools = self.inner.pools.read().await;
            if let Some(cell) = pools.get(&key) {
                Arc::clone(cell)
            } else {
                drop(pools);
                let mut pools = self.inner.pools.write().await;
                // Double-check after acquiring write lock
                Arc::clone(
                    pools
                        .entry(key.clone())
                        .or_insert_with(|| Arc::new(OnceCell::new())),
                )
            }
        };

        let pool = cell
            .get_or_try_init(|| async {
                debug!(user = %key, "Creating new session pool");
                self.create_pool(credentials).await
            })
            .await?;
        Ok(pool.clone())
    }

    async fn create_pool(&self, credentials: &Credentials) -> DbResult<DbPool> {
        let config = &self.inner.config;
        let pool_opts = &config.pool_options;
        let db_type = config.db_type;
        let is_sqlite = db_type == DatabaseType::SQLite;
        let acquire_timeout = Duration::from_secs(pool_opts.acquire_timeout_or_default());
        let idle_timeout = Some(Duration::from_secs(pool_opts.idle_timeout_or_default()));
        let options = ConnectOptions::build(
            db_type,
            &config.connection_string,
            &credentials.user,
            &credentials.credential,
        )?;

        let pool = match options {
            ConnectOptions::MySql(options) => DbPool::MySql(
                MySqlPoolOptions::new()
                    .min_connections(pool_opts.min_connections_or_default())
                    .max_connections(pool_opts.max_connections_or_default(is_sqlite))
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(pool_opts.test_before_acquire_or_default())
                    .connect_with(options)
                    .await
                    .map_err(|e| connect_error(db_type, e))?,
            ),
            ConnectOptions::Postgres(options) => DbPool::Postgres(
                PgPoolOptions::new()
                    .min_connections(pool_opts.min_connections_or_default())
                    .max_connections(pool_opts.max_connections_or_default(is_sqlite))
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(pool_opts.test_before_acquire_or_default())
                    .connect_with(options)
                    .await
                    .map_err(|e| connect_error(db_type, e))?,
            ),
            ConnectOptions::SQLite(options) => DbPool::SQLite(
                SqlitePoolOptions::new()
                    .min_connections(pool_opts.min_connections_or_default())
                    .max_connections(pool_opts.max_connections_or_default(is_sqlite))
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(pool_opts.test_before_acquire_or_default())
                    .connect_with(options)
                    .await
                    .map_err(|e| connect_error(db_type, e))?,
            ),
        };

        info!(
            db_type = %db_type,
            connection = %config.masked_connection_string(),
            user = %credentials.user,
            "Session pool created"
        );
        Ok(pool)
    }
}

/// SQLite pools are shared by every user.
fn pool_key(db_type: DatabaseType, user: &str) -> String {
    match db_type {
        DatabaseType::SQLite => String::new(),
        _ => user.to_string(),
    }
}

/// Convert a connect failure, keeping its backend code for the translator.
fn connect_error(db_type: DatabaseType, error: sqlx::Error) -> DbError {
    let suggestion = connection_suggestion(db_type, &error);
    DbError::from(error).with_suggestion(suggestion)
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type.display_name()
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the user name and credential".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match db_type {
        DatabaseType::PostgreSQL => {
            "Verify the connection string format: postgres://host:5432/db".to_string()
        }
        DatabaseType::MySQL => "Verify the connection string format: mysql://host:3306/db".to_string(),
        DatabaseType::SQLite => {
            "Verify the file path exists and is accessible: sqlite:path/to/db.sqlite".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;

    fn sqlite_pool(path: &std::path::Path) -> SessionPool {
        let url = format!("sqlite:{}", path.display());
        SessionPool::new(ConnectionConfig::new(url, PoolOptions::default()).unwrap())
    }

    #[test]
    fn test_sqlite_pool_key_ignores_user() {
        assert_eq!(pool_key(DatabaseType::SQLite, "alice"), "");
        assert_eq!(pool_key(DatabaseType::PostgreSQL, "alice"), "alice");
    }

    #[tokio::test]
    async fn test_pool_created_lazily_once() {
        let dir = tempfile::tempdir().unwrap();
        let pool = sqlite_pool(&dir.path().join("lazy.db"));
        assert_eq!(pool.pool_count().await, 0);

        let first = pool.acquire(&Credentials::new("etl", "")).await.unwrap();
        drop(first);
        let second = pool.acquire(&Credentials::new("other", "")).await.unwrap();
        drop(second);

        assert_eq!(pool.pool_count().await, 1);
        pool.close_all().await;
        assert_eq!(pool.pool_count().await, 0);
    }

    #[tokio::test]
    async fn test_connect_direct_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let pool = sqlite_pool(&dir.path().join("direct.db"));
        let session = pool
            .connect_direct("admin", &Credential::new(""), None)
            .await
            .unwrap();
        assert_eq!(session.database_type(), DatabaseType::SQLite);
        session.disconnect().await.unwrap();
        assert_eq!(pool.pool_count().await, 0);
    }

    #[test]
    fn test_connection_suggestion_refused() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        let suggestion = connection_suggestion(DatabaseType::MySQL, &err);
        assert!(suggestion.contains("MySQL"));
    }
}
