//! Session manager.
//!
//! A [`SessionManager`] owns one pooled session for its whole life and hands
//! out [`QueryExecutor`]s that borrow it. Initialization is fail-fast: a
//! mapped backend failure while acquiring the first session is fatal.

use crate::db::executor::QueryExecutor;
use crate::db::identifier;
use crate::db::pool::SessionPool;
use crate::db::session::DbSession;
use crate::db::translate::{CallSite, Disposition, ErrorTranslator};
use crate::error::{DbError, DbResult, InitError};
use crate::etl::frame::Frame;
use crate::models::{
    ConnectionConfig, Credentials, DatabaseType, PrivilegedCredentials, Statement,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Client version recorded at initialization.
pub const CLIENT_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Client runtime details resolved at initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub version: &'static str,
    /// Configured client library directory, if any.
    pub lib_dir: Option<PathBuf>,
}

impl ClientInfo {
    fn resolve(lib_dir: Option<&Path>) -> DbResult<Self> {
        if let Some(dir) = lib_dir.filter(|dir| !dir.is_dir()) {
            return Err(DbError::invalid_input(format!(
                "Client library directory does not exist: {}",
                dir.display()
            )));
        }
        Ok(Self {
            version: CLIENT_VERSION,
            lib_dir: lib_dir.map(Path::to_path_buf),
        })
    }
}

/// Owner of one pooled session and the pool it came from.
#[derive(Debug)]
pub struct SessionManager {
    pool: SessionPool,
    session: Option<DbSession>,
    translator: ErrorTranslator,
    client: ClientInfo,
}

impl SessionManager {
    /// Create the pool for `config` and acquire one session from it.
    pub async fn initialize(
        config: ConnectionConfig,
        credentials: &Credentials,
    ) -> Result<Self, InitError> {
        let client = ClientInfo::resolve(config.client_lib_dir.as_deref())?;
        info!(
            version = client.version,
            lib_dir = ?client.lib_dir,
            db_type = %config.db_type,
            "Initializing session manager"
        );
        Self::with_client(SessionPool::new(config), credentials, client).await
    }

    /// Acquire a session from an existing pool, which may back other managers.
    pub async fn from_pool(pool: SessionPool, credentials: &Credentials) -> Result<Self, InitError> {
        let client = ClientInfo::resolve(pool.config().client_lib_dir.as_deref())?;
        Self::with_client(pool, credentials, client).await
    }

    async fn with_client(
        pool: SessionPool,
        credentials: &Credentials,
        client: ClientInfo,
    ) -> Result<Self, InitError> {
        let translator = ErrorTranslator::default();
        let session = match pool.acquire(credentials).await {
            Ok(session) => session,
            Err(err) if err.is_backend() => {
                return Err(match translator.translate(&err, CallSite::Initialize) {
                    Disposition::Fatal(category) | Disposition::Reported(category) => {
                        InitError::Fatal {
                            category,
                            source: err,
                        }
                    }
                    Disposition::Ignored | Disposition::Unmapped => InitError::Unhandled(err),
                });
            }
            Err(err) => return Err(InitError::Unhandled(err)),
        };

        info!(user = %credentials.user, "Session manager ready");
        Ok(Self {
            pool,
            session: Some(session),
            translator,
            client,
        })
    }

    fn session_mut(&mut self) -> DbResult<&mut DbSession> {
        self.session.as_mut().ok_or(DbError::SessionReleased)
    }

    /// Borrow a query executor over the held session.
    pub fn executor(&mut self) -> DbResult<QueryExecutor<'_>> {
        let translator = self.translator.clone();
        let session = self.session_mut()?;
        Ok(QueryExecutor::new(session, translator))
    }

    pub async fn commit(&mut self) -> DbResult<()> {
        self.session_mut()?.commit().await
    }

    pub async fn rollback(&mut self) -> DbResult<()> {
        self.session_mut()?.rollback().await
    }

    /// Return the held session to its pool. The pool stays open.
    pub async fn release_to_pool(&mut self) {
        match self.session.take() {
            Some(session) => session.release().await,
            None => debug!("No session to release"),
        }
    }

    /// Close the held session's connection instead of returning it.
    pub async fn disconnect(&mut self) -> DbResult<()> {
        match self.session.take() {
            Some(session) => session.disconnect().await,
            None => Ok(()),
        }
    }

    /// Close every pool behind this manager.
    pub async fn close_pool(&self) {
        self.pool.close_all().await;
        info!("Session pools closed");
    }

    /// Open a standalone session with elevated privileges.
    ///
    /// The session runs each statement in autocommit mode. When a role is
    /// given it is asserted and activated with `SET ROLE`; backends without
    /// roles ignore it. The manager does not track the returned session.
    pub async fn privileged_connection(
        &self,
        credentials: &PrivilegedCredentials,
    ) -> DbResult<DbSession> {
        let db_type = credentials
            .connection_string
            .as_deref()
            .and_then(DatabaseType::from_connection_string)
            .unwrap_or(self.pool.db_type());

        let role = match &credentials.role {
            Some(role) if db_type.supports_roles() => Some(identifier::assert_role(role, db_type)?),
            Some(role) => {
                warn!(role = %role, db_type = %db_type, "Backend has no roles, ignoring role");
                None
            }
            None => None,
        };

        let mut session = self
            .pool
            .connect_direct(
                &credentials.user,
                &credentials.credential,
                credentials.connection_string.as_deref(),
            )
            .await?
            .into_autocommit();

        if let Some(role) = &role {
            let set_role = Statement::from(format!("SET ROLE {}", role));
            if let Err(e) = session.execute(&set_role).await {
                if let Err(close_err) = session.disconnect().await {
                    warn!(error = %close_err, "Failed to close privileged session");
                }
                return Err(e);
            }
        }

        info!(user = %credentials.user, role = ?role, "Privileged session opened");
        Ok(session)
    }

    /// Run a statement on a fresh privileged session and return every row.
    pub async fn execute_privileged(
        &self,
        credentials: &PrivilegedCredentials,
        stmt: impl Into<Statement>,
    ) -> DbResult<Frame> {
        let mut session = self.privileged_connection(credentials).await?;
        let result = session.executor().fetch_frame(stmt).await;
        if let Err(e) = session.disconnect().await {
            warn!(error = %e, "Failed to close privileged session");
        }
        result
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    pub fn client_info(&self) -> &ClientInfo {
        &self.client
    }

    /// Cursors open on the held session; zero once it is released.
    pub fn open_cursors(&self) -> usize {
        self.session.as_ref().map_or(0, DbSession::open_cursors)
    }

    /// Whether a session is held.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn translator(&self) -> &ErrorTranslator {
        &self.translator
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }
}
