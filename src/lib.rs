//! etl-dbkit library
//!
//! A session-oriented data-access layer over SQLite, PostgreSQL and MySQL,
//! plus ETL utilities that generate, load and reconcile taxi-trip data.

pub mod config;
pub mod db;
pub mod error;
pub mod etl;
pub mod format;
pub mod models;

pub use config::Config;
pub use db::{QueryExecutor, SessionManager, SessionPool};
pub use error::{DbError, EtlError, InitError};
