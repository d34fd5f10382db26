//! ETL utilities for taxi-trip data.
//!
//! Generate a synthetic trip file, load it into a staging table, then
//! reconcile the file against the table by row count and by content.

pub mod compare;
pub mod frame;
pub mod generator;
pub mod loader;
pub mod paths;
pub mod timing;

pub use compare::{CountComparison, DataComparison, count_compare, data_compare};
pub use frame::{DESIRED_COLUMNS, Frame, csv_row_count, read_csv};
pub use generator::{COLUMNS, TripRecord, write_csv};
pub use loader::{LoadSummary, load_csv};
pub use paths::ProjectPaths;
pub use timing::Stopwatch;
