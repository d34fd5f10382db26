//! Database access layer.
//!
//! This module provides:
//! - Lazily created per-user session pools
//! - Sessions with explicit units of work
//! - Scoped cursors and the query execution facade
//! - Result shaping and backend-neutral values
//! - Backend error translation
//! - Identifier assertion for interpolated object names

pub mod cursor;
pub mod executor;
pub mod identifier;
pub mod manager;
pub(crate) mod params;
pub mod pool;
pub mod session;
pub mod shape;
pub mod translate;
pub mod types;

pub use cursor::FetchTuning;
pub use executor::{CreateOutcome, INVALID_OBJECT_NAME, QueryExecutor, RowCount};
pub use manager::{CLIENT_VERSION, ClientInfo, SessionManager};
pub use pool::{DbPool, SessionPool};
pub use session::DbSession;
pub use shape::{Fetch, Record, Shape, ShapedRow};
pub use translate::{CallSite, Disposition, ErrorCategory, ErrorCode, ErrorTranslator};
pub use types::{RawRow, Value};
