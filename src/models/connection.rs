//! Connection-related data models.
//!
//! This module defines the backend type, connection configuration and the
//! credential types used to open sessions.

use crate::config::PoolOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Whether the backend supports `SET ROLE`.
    pub fn supports_roles(&self) -> bool {
        !matches!(self, Self::SQLite)
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Configuration for the session pool of one connection string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub db_type: DatabaseType,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub connection_string: String,
    /// Location of the client runtime, when one is installed outside the default search path.
    #[serde(default)]
    pub client_lib_dir: Option<PathBuf>,
    #[serde(default)]
    pub pool_options: PoolOptions,
}

impl ConnectionConfig {
    /// Create a new connection configuration.
    pub fn new(
        connection_string: impl Into<String>,
        pool_options: PoolOptions,
    ) -> Result<Self, ConnectionConfigError> {
        let connection_string = connection_string.into();

        if connection_string.trim().is_empty() {
            return Err(ConnectionConfigError::EmptyConnectionString);
        }

        let db_type = DatabaseType::from_connection_string(&connection_string)
            .ok_or_else(|| ConnectionConfigError::UnknownDatabaseType(mask(&connection_string)))?;

        Ok(Self {
            db_type,
            connection_string,
            client_lib_dir: None,
            pool_options,
        })
    }

    pub fn with_client_lib_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.client_lib_dir = dir;
        self
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        mask(&self.connection_string)
    }
}

fn mask(connection_string: &str) -> String {
    let authority_start = connection_string.find("://").map_or(0, |i| i + 3);
    if let Some(at_pos) = connection_string[authority_start..].find('@') {
        let at_pos = authority_start + at_pos;
        if let Some(colon_pos) = connection_string[authority_start..at_pos].rfind(':') {
            let colon_pos = authority_start + colon_pos;
            let prefix = &connection_string[..colon_pos + 1];
            let suffix = &connection_string[at_pos..];
            return format!("{}****{}", prefix, suffix);
        }
    }
    connection_string.to_string()
}

/// Errors that can occur when creating a connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    #[error("Connection string cannot be empty")]
    EmptyConnectionString,

    #[error(
        "Unknown database type in connection string: {0}. Supported: postgres://, mysql://, mariadb://, sqlite:"
    )]
    UnknownDatabaseType(String),
}

/// A secret credential, wiped from memory on drop.
///
/// Once constructed the value can only be read inside this crate, where it
/// is handed to the driver's connect options.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// User and credential for an ordinary session.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub credential: Credential,
}

impl Credentials {
    pub fn new(user: impl Into<String>, credential: impl Into<Credential>) -> Self {
        Self {
            user: user.into(),
            credential: credential.into(),
        }
    }
}

/// Credentials for a privileged (elevated-role) session.
#[derive(Debug, Clone)]
pub struct PrivilegedCredentials {
    pub user: String,
    pub credential: Credential,
    /// Connection string to use instead of the manager's one.
    pub connection_string: Option<String>,
    /// Role activated with `SET ROLE` once connected.
    pub role: Option<String>,
}

impl PrivilegedCredentials {
    pub fn new(user: impl Into<String>, credential: impl Into<Credential>) -> Self {
        Self {
            user: user.into(),
            credential: credential.into(),
            connection_string: None,
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }
}
