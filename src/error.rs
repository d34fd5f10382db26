//! Error types for the data-access layer and the ETL utilities.
//!
//! Every error variant carries enough context to act on: backend failures keep
//! the [`ErrorCode`] the translator needs, plus a suggestion for the operator.

use crate::db::translate::{ErrorCategory, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection {
        message: String,
        code: Option<ErrorCode>,
        suggestion: String,
    },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g. `Postgres("42P01")` for undefined table
        code: Option<ErrorCode>,
        suggestion: String,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("Row position {position} is out of range ({available} rows available)")]
    OutOfRange { position: usize, available: usize },

    #[error("Session has been released; acquire a new one before issuing queries")]
    SessionReleased,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            code: None,
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with an optional backend code.
    pub fn database(
        message: impl Into<String>,
        code: Option<ErrorCode>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            code,
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn invalid_identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn out_of_range(position: usize, available: usize) -> Self {
        Self::OutOfRange {
            position,
            available,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::SessionReleased => Some("Create a new session manager"),
            _ => None,
        }
    }

    /// Backend code carried by this error, used for category lookup.
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Connection { code, .. } | Self::Database { code, .. } => code.as_ref(),
            _ => None,
        }
    }

    /// Whether the failure was raised by the backend or the transport to it.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Database { .. })
    }

    /// Replace the suggestion on backend errors, keeping message and code.
    pub(crate) fn with_suggestion(self, new_suggestion: impl Into<String>) -> Self {
        match self {
            Self::Connection { message, code, .. } => Self::Connection {
                message,
                code,
                suggestion: new_suggestion.into(),
            },
            Self::Database { message, code, .. } => Self::Database {
                message,
                code,
                suggestion: new_suggestion.into(),
            },
            other => other,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let code = ErrorCode::from_sqlx(&err);
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => DbError::database(
                db_err.message(),
                code,
                "Check the SQL syntax and referenced objects",
            ),
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::Connection {
                message: "Timed out acquiring a connection from the pool".to_string(),
                code,
                suggestion: "Release idle sessions or raise acquire_timeout/max_connections"
                    .to_string(),
            },
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Create a new session manager")
            }
            sqlx::Error::Io(io_err) => DbError::Connection {
                message: format!("I/O error: {}", io_err),
                code,
                suggestion: "Check network connectivity and database server status".to_string(),
            },
            sqlx::Error::Tls(tls_err) => DbError::Connection {
                message: format!("TLS error: {}", tls_err),
                code,
                suggestion: "Verify TLS configuration and certificates".to_string(),
            },
            sqlx::Error::Protocol(msg) => DbError::Connection {
                message: format!("Protocol error: {}", msg),
                code,
                suggestion: "Check database server compatibility".to_string(),
            },
            sqlx::Error::TypeNotFound { type_name } => DbError::schema(
                format!("Type not found: {}", type_name),
                type_name.to_string(),
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Failure while initializing a session manager.
#[derive(Error, Debug)]
pub enum InitError {
    /// A mapped backend failure. The session manager cannot be used.
    #[error("{category}")]
    Fatal {
        category: ErrorCategory,
        #[source]
        source: DbError,
    },

    #[error(transparent)]
    Unhandled(#[from] DbError),
}

impl InitError {
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Fatal { category, .. } => Some(*category),
            Self::Unhandled(_) => None,
        }
    }
}

/// Errors raised by the ETL utilities.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Column '{column}' not found in {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("Count query did not return a row count")]
    MissingCount,

    #[error("Could not create table '{table}'")]
    CreateFailed {
        table: String,
        category: Option<ErrorCategory>,
    },
}

pub type EtlResult<T> = Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some(ErrorCode::Postgres("42601".to_string())),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(err.code(), Some(&ErrorCode::Postgres("42601".to_string())));
    }

    #[test]
    fn test_with_suggestion_keeps_code() {
        let err = DbError::database("exists", Some(ErrorCode::MySql(1050)), "old")
            .with_suggestion("new");
        assert_eq!(err.suggestion(), Some("new"));
        assert_eq!(err.code(), Some(&ErrorCode::MySql(1050)));
    }

    #[test]
    fn test_pool_timeout_keeps_code() {
        let err = DbError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), Some(&ErrorCode::PoolTimedOut));
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[test]
    fn test_out_of_range_display() {
        let err = DbError::out_of_range(5, 3);
        assert_eq!(
            err.to_string(),
            "Row position 5 is out of range (3 rows available)"
        );
    }

    #[test]
    fn test_init_error_category() {
        let err = InitError::Fatal {
            category: ErrorCategory::NoListener,
            source: DbError::connection("refused", "start the server"),
        };
        assert_eq!(err.category(), Some(ErrorCategory::NoListener));
        assert!(err.to_string().starts_with("Error: No listener"));

        let err = InitError::from(DbError::internal("x"));
        assert_eq!(err.category(), None);
    }
}
