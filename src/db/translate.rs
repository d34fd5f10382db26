//! Backend error translation.
//!
//! Driver failures are identified by an [`ErrorCode`] in the namespace of the
//! backend (or transport) that raised them. A static map resolves known codes
//! to an [`ErrorCategory`] whose message is what operators see in the logs.
//! What happens next depends on where the failure surfaced ([`CallSite`]).

use crate::error::DbError;
use sqlx::error::DatabaseError;
use sqlx::mysql::MySqlDatabaseError;
use sqlx::postgres::PgDatabaseError;
use sqlx::sqlite::SqliteError;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, LazyLock};
use tracing::{error, warn};

/// Substrings the resolver puts into I/O errors when a host name cannot be resolved.
const NAME_RESOLUTION_HINTS: &[&str] = &[
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "no such host",
    "temporary failure in name resolution",
];

/// Identifier of a failure, namespaced by the backend or transport that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// PostgreSQL SQLSTATE.
    Postgres(String),
    /// MySQL/MariaDB server error number.
    MySql(u16),
    /// SQLite primary result code.
    Sqlite(i32),
    Io(io::ErrorKind),
    PoolTimedOut,
    Protocol,
    Tls,
    NameResolution,
    /// The backend reported an existing object without a dedicated code.
    AlreadyExists,
}

impl ErrorCode {
    /// Extract the code carried by a driver error, if any.
    pub fn from_sqlx(err: &sqlx::Error) -> Option<Self> {
        match err {
            sqlx::Error::Database(db_err) => Self::from_database_error(db_err.as_ref()),
            sqlx::Error::Io(io_err) => Some(Self::from_io(io_err)),
            sqlx::Error::Tls(_) => Some(Self::Tls),
            sqlx::Error::Protocol(_) => Some(Self::Protocol),
            sqlx::Error::PoolTimedOut => Some(Self::PoolTimedOut),
            _ => None,
        }
    }

    fn from_database_error(db_err: &dyn DatabaseError) -> Option<Self> {
        if let Some(pg) = db_err.try_downcast_ref::<PgDatabaseError>() {
            return Some(Self::Postgres(pg.code().to_string()));
        }
        if let Some(my) = db_err.try_downcast_ref::<MySqlDatabaseError>() {
            return Some(Self::MySql(my.number()));
        }
        if db_err.try_downcast_ref::<SqliteError>().is_some() {
            if db_err.message().ends_with("already exists") {
                return Some(Self::AlreadyExists);
            }
            // Extended result codes carry the primary code in the low byte
            return db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| Self::Sqlite(code & 0xff));
        }
        None
    }

    fn from_io(err: &io::Error) -> Self {
        let text = err.to_string().to_lowercase();
        if NAME_RESOLUTION_HINTS.iter().any(|hint| text.contains(hint)) {
            return Self::NameResolution;
        }
        Self::Io(err.kind())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres(state) => write!(f, "SQLSTATE {}", state),
            Self::MySql(number) => write!(f, "MySQL {}", number),
            Self::Sqlite(code) => write!(f, "SQLite {}", code),
            Self::Io(kind) => write!(f, "I/O {:?}", kind),
            Self::PoolTimedOut => write!(f, "pool timed out"),
            Self::Protocol => write!(f, "protocol"),
            Self::Tls => write!(f, "TLS"),
            Self::NameResolution => write!(f, "name resolution"),
            Self::AlreadyExists => write!(f, "already exists"),
        }
    }
}

/// Human-readable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    ObjectAlreadyExists,
    DatabaseNotOpen,
    NotConnected,
    NameResolution,
    ProtocolMismatch,
    RedirectFailure,
    ConnectionAccept,
    NoConnectionPossible,
    SevereNetwork,
    HostUnreachable,
    NoListener,
    TooManyConnections,
    Timeout,
    DirectoryService,
    InternalNetwork,
}

impl ErrorCategory {
    pub fn message(&self) -> &'static str {
        match self {
            Self::ObjectAlreadyExists => "Object Already Exists",
            Self::DatabaseNotOpen => "Error: Database is not open",
            Self::NotConnected => {
                "Error: Not currently connected to a remote host. Please check connection"
            }
            Self::NameResolution => "Error: Could not resolve the host specified",
            Self::ProtocolMismatch => "Error: Protocol not supported by the server",
            Self::RedirectFailure => {
                "Error: Failure to redirect to destination. Please reach out to Network Administrator"
            }
            Self::ConnectionAccept => {
                "Error: Failure to accept a connection. Please reach out to Network Administrator"
            }
            Self::NoConnectionPossible => {
                "Error: No connection possible to destination. Please reach out to Network Administrator"
            }
            Self::SevereNetwork => {
                "Error: Severe network error occurred in making this connection. Please reach out to Network Administrator"
            }
            Self::HostUnreachable => {
                "Error: Destination host unreachable. Please check your network connection or reach out to Network Administrator"
            }
            Self::NoListener => {
                "Error: No listener. Please check that the database service is running on the configured host and port"
            }
            Self::TooManyConnections => {
                "Error: Too many connections open simultaneously. Please close a few connections and retry"
            }
            Self::Timeout => "Error: Connection has timed out",
            Self::DirectoryService => "Error: Unable to establish a secure channel to the server",
            Self::InternalNetwork => "Error: Internal error during network communication",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Where a failure surfaced; selects the handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    Initialize,
    Create,
    General,
}

/// Outcome of translating a failure at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Expected failure swallowed silently (idempotent create).
    Ignored,
    /// Mapped failure reported to the log; not fatal.
    Reported(ErrorCategory),
    /// Mapped failure during initialization; the caller must stop.
    Fatal(ErrorCategory),
    /// No mapping for the code.
    Unmapped,
}

/// Immutable code-to-category map.
#[derive(Debug)]
pub struct ErrorCategoryMap {
    entries: HashMap<ErrorCode, ErrorCategory>,
}

static SHARED_MAP: LazyLock<Arc<ErrorCategoryMap>> =
    LazyLock::new(|| Arc::new(ErrorCategoryMap::build()));

impl ErrorCategoryMap {
    /// The process-wide map, built on first use.
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED_MAP)
    }

    fn build() -> Self {
        use ErrorCategory::*;
        use io::ErrorKind;

        let pg = |state: &str| ErrorCode::Postgres(state.to_string());
        let entries = [
            (pg("42P07"), ObjectAlreadyExists),
            (pg("42710"), ObjectAlreadyExists),
            (pg("42P06"), ObjectAlreadyExists),
            (ErrorCode::MySql(1050), ObjectAlreadyExists),
            (ErrorCode::MySql(1007), ObjectAlreadyExists),
            (ErrorCode::AlreadyExists, ObjectAlreadyExists),
            (pg("3D000"), DatabaseNotOpen),
            (pg("57P03"), DatabaseNotOpen),
            (ErrorCode::MySql(1049), DatabaseNotOpen),
            (ErrorCode::Sqlite(14), DatabaseNotOpen),
            (pg("53300"), TooManyConnections),
            (ErrorCode::MySql(1040), TooManyConnections),
            (ErrorCode::Sqlite(5), Timeout),
            (ErrorCode::Io(ErrorKind::TimedOut), Timeout),
            (ErrorCode::PoolTimedOut, Timeout),
            (ErrorCode::Io(ErrorKind::ConnectionRefused), NoListener),
            (ErrorCode::Io(ErrorKind::HostUnreachable), HostUnreachable),
            (ErrorCode::Io(ErrorKind::NetworkUnreachable), HostUnreachable),
            (pg("08003"), NotConnected),
            (ErrorCode::MySql(2006), NotConnected),
            (ErrorCode::Io(ErrorKind::NotConnected), NotConnected),
            (ErrorCode::MySql(2005), NameResolution),
            (ErrorCode::NameResolution, NameResolution),
            (pg("08P01"), ProtocolMismatch),
            (ErrorCode::MySql(1043), ProtocolMismatch),
            (ErrorCode::Protocol, ProtocolMismatch),
            (pg("08004"), ConnectionAccept),
            (ErrorCode::MySql(1130), ConnectionAccept),
            (ErrorCode::Io(ErrorKind::ConnectionReset), ConnectionAccept),
            (ErrorCode::Io(ErrorKind::ConnectionAborted), ConnectionAccept),
            (pg("08001"), NoConnectionPossible),
            (pg("08006"), NoConnectionPossible),
            (ErrorCode::MySql(2002), NoConnectionPossible),
            (ErrorCode::MySql(2003), NoConnectionPossible),
            (ErrorCode::MySql(2013), SevereNetwork),
            (ErrorCode::Io(ErrorKind::BrokenPipe), SevereNetwork),
            (ErrorCode::Io(ErrorKind::UnexpectedEof), SevereNetwork),
            (ErrorCode::Tls, DirectoryService),
            (pg("08000"), InternalNetwork),
        ];

        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, code: &ErrorCode) -> Option<ErrorCategory> {
        self.entries.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Applies the call-site policy to backend failures.
#[derive(Debug, Clone)]
pub struct ErrorTranslator {
    map: Arc<ErrorCategoryMap>,
}

impl Default for ErrorTranslator {
    fn default() -> Self {
        Self::new(ErrorCategoryMap::shared())
    }
}

impl ErrorTranslator {
    pub fn new(map: Arc<ErrorCategoryMap>) -> Self {
        Self { map }
    }

    /// Look up the category for a failure, if its code is mapped.
    pub fn categorize(&self, err: &DbError) -> Option<ErrorCategory> {
        err.code().and_then(|code| self.map.get(code))
    }

    /// Decide how a failure at `site` is handled, emitting the category
    /// message as a log event.
    pub fn translate(&self, err: &DbError, site: CallSite) -> Disposition {
        let Some(category) = self.categorize(err) else {
            warn!(
                code = ?err.code(),
                error = %err,
                "Unmapped error code, please update the error mapping"
            );
            return Disposition::Unmapped;
        };

        match (site, category) {
            (CallSite::Create, ErrorCategory::ObjectAlreadyExists) => Disposition::Ignored,
            (CallSite::Initialize, category) => {
                error!(code = ?err.code(), "{}", category.message());
                Disposition::Fatal(category)
            }
            (_, category) => {
                warn!(code = ?err.code(), "{}", category.message());
                Disposition::Reported(category)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_error(code: ErrorCode) -> DbError {
        DbError::database("boom", Some(code), "none")
    }

    #[test]
    fn test_shared_map_is_memoized() {
        let a = ErrorCategoryMap::shared();
        let b = ErrorCategoryMap::shared();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!a.is_empty());
    }

    #[test]
    fn test_already_exists_codes() {
        let map = ErrorCategoryMap::shared();
        for code in [
            ErrorCode::Postgres("42P07".into()),
            ErrorCode::MySql(1050),
            ErrorCode::AlreadyExists,
        ] {
            assert_eq!(map.get(&code), Some(ErrorCategory::ObjectAlreadyExists));
        }
    }

    #[test]
    fn test_transport_codes() {
        let map = ErrorCategoryMap::shared();
        assert_eq!(
            map.get(&ErrorCode::Io(io::ErrorKind::ConnectionRefused)),
            Some(ErrorCategory::NoListener)
        );
        assert_eq!(
            map.get(&ErrorCode::PoolTimedOut),
            Some(ErrorCategory::Timeout)
        );
        assert_eq!(map.get(&ErrorCode::Postgres("42601".into())), None);
    }

    #[test]
    fn test_create_ignores_already_exists() {
        let translator = ErrorTranslator::default();
        let err = db_error(ErrorCode::Postgres("42P07".into()));
        assert_eq!(
            translator.translate(&err, CallSite::Create),
            Disposition::Ignored
        );
        assert_eq!(
            translator.translate(&err, CallSite::General),
            Disposition::Reported(ErrorCategory::ObjectAlreadyExists)
        );
    }

    #[test]
    fn test_initialize_is_fatal() {
        let translator = ErrorTranslator::default();
        let err = db_error(ErrorCode::Sqlite(14));
        assert_eq!(
            translator.translate(&err, CallSite::Initialize),
            Disposition::Fatal(ErrorCategory::DatabaseNotOpen)
        );
    }

    #[test]
    fn test_unmapped_code() {
        let translator = ErrorTranslator::default();
        let err = db_error(ErrorCode::MySql(1064));
        assert_eq!(
            translator.translate(&err, CallSite::Create),
            Disposition::Unmapped
        );
        assert_eq!(
            translator.translate(&DbError::internal("no code"), CallSite::General),
            Disposition::Unmapped
        );
    }

    #[test]
    fn test_io_name_resolution() {
        let err = io::Error::other("failed to lookup address information: Name or service not known");
        assert_eq!(ErrorCode::from_io(&err), ErrorCode::NameResolution);

        let err = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(
            ErrorCode::from_io(&err),
            ErrorCode::Io(io::ErrorKind::ConnectionRefused)
        );
    }

    #[test]
    fn test_category_display() {
        assert_eq!(
            ErrorCategory::Timeout.to_string(),
            "Error: Connection has timed out"
        );
    }
}
