//! Data models shared across the crate.

pub mod connection;
pub mod query;

pub use connection::{
    ConnectionConfig, ConnectionConfigError, Credential, Credentials, DatabaseType,
    PrivilegedCredentials,
};
pub use query::{QueryParam, Statement};
