//! End-to-end tests for the ETL utilities against SQLite.
//!
//! Generate a trip file, load it into a staging table, then reconcile the
//! file against the table by count and by content.

use etl_dbkit::config::PoolOptions;
use etl_dbkit::db::{RowCount, SessionManager};
use etl_dbkit::error::EtlError;
use etl_dbkit::etl::{
    CountComparison, DESIRED_COLUMNS, DataComparison, ProjectPaths, count_compare, csv_row_count,
    data_compare, load_csv, read_csv, write_csv,
};
use etl_dbkit::models::{ConnectionConfig, Credentials};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use tempfile::TempDir;

const ROWS: usize = 120;
const TABLE: &str = "taxi_trip_staging";

struct Fixture {
    _dir: TempDir,
    manager: SessionManager,
    file: PathBuf,
}

async fn setup() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let paths = ProjectPaths::new(dir.path());
    paths.ensure_dirs().unwrap();

    let file = paths.input_file("trips.csv");
    let mut rng = StdRng::seed_from_u64(7);
    let message = write_csv(&file, ROWS, &mut rng).unwrap();
    assert!(message.ends_with(&format!("with {} records.", ROWS)));

    let url = format!("sqlite:{}", paths.output_file("etl.db").display());
    let config = ConnectionConfig::new(url, PoolOptions::default()).unwrap();
    let manager = SessionManager::initialize(config, &Credentials::new("etl", ""))
        .await
        .unwrap();

    Fixture {
        _dir: dir,
        manager,
        file,
    }
}

fn select_staging() -> String {
    format!(
        "SELECT {} FROM {} ORDER BY rowid",
        DESIRED_COLUMNS.join(", "),
        TABLE
    )
}

#[tokio::test]
async fn test_generate_load_and_reconcile() {
    let mut fx = setup().await;
    let mut executor = fx.manager.executor().unwrap();

    let summary = load_csv(&mut executor, &fx.file, TABLE, &DESIRED_COLUMNS)
        .await
        .unwrap();
    assert!(summary.created);
    assert_eq!(summary.rows, ROWS);
    assert_eq!(
        executor.row_count(TABLE).await.unwrap(),
        RowCount::Rows(ROWS as u64)
    );

    let source_rows = csv_row_count(&fx.file, &DESIRED_COLUMNS).unwrap();
    let target = executor
        .fetch_frame(format!("SELECT COUNT(1) FROM {}", TABLE))
        .await
        .unwrap();
    let counts = count_compare(source_rows, &target).unwrap();
    assert_eq!(counts, CountComparison::Equal { rows: ROWS as u64 });
    assert_eq!(
        counts.to_string(),
        "Row Count in File is Equal to Row Count in Target Table"
    );

    let source = read_csv(&fx.file, &DESIRED_COLUMNS).unwrap();
    let target = executor.fetch_frame(select_staging()).await.unwrap();
    assert_eq!(target.columns, DESIRED_COLUMNS);
    let data = data_compare(&source, &target);
    assert_eq!(data, DataComparison::Identical);
    assert_eq!(data.to_string(), "Src File and Target Table are identical");
}

#[tokio::test]
async fn test_reload_appends_to_existing_table() {
    let mut fx = setup().await;
    let mut executor = fx.manager.executor().unwrap();

    load_csv(&mut executor, &fx.file, TABLE, &DESIRED_COLUMNS)
        .await
        .unwrap();
    let again = load_csv(&mut executor, &fx.file, TABLE, &DESIRED_COLUMNS)
        .await
        .unwrap();
    assert!(!again.created);

    let target = executor
        .fetch_frame(format!("SELECT COUNT(1) FROM {}", TABLE))
        .await
        .unwrap();
    assert_eq!(
        count_compare(ROWS, &target).unwrap(),
        CountComparison::Mismatch {
            source: ROWS as u64,
            target: 2 * ROWS as u64
        }
    );
}

#[tokio::test]
async fn test_data_compare_reports_missing_row() {
    let mut fx = setup().await;
    let mut executor = fx.manager.executor().unwrap();

    load_csv(&mut executor, &fx.file, TABLE, &DESIRED_COLUMNS)
        .await
        .unwrap();
    executor
        .execute(format!(
            "DELETE FROM {} WHERE rowid = (SELECT MIN(rowid) FROM {})",
            TABLE, TABLE
        ))
        .await
        .unwrap();
    executor.commit().await.unwrap();

    let source = read_csv(&fx.file, &DESIRED_COLUMNS).unwrap();
    let target = executor.fetch_frame(select_staging()).await.unwrap();
    match data_compare(&source, &target) {
        DataComparison::Differences(diff) => {
            assert_eq!(diff.len(), 1);
            assert_eq!(diff.rows[0], source.rows[0]);
        }
        DataComparison::Identical => panic!("expected a difference"),
    }
}

#[tokio::test]
async fn test_load_rejects_invalid_table_name() {
    let mut fx = setup().await;
    let mut executor = fx.manager.executor().unwrap();

    let err = load_csv(&mut executor, &fx.file, "trips; DROP TABLE x", &DESIRED_COLUMNS)
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::Db(_)));
}

#[tokio::test]
async fn test_load_missing_column() {
    let mut fx = setup().await;
    let mut executor = fx.manager.executor().unwrap();

    let err = load_csv(&mut executor, &fx.file, TABLE, &["pick_up_time", "tip"])
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::MissingColumn { ref column, .. } if column == "tip"));
    assert!(!executor.object_exists("main", TABLE).await.unwrap());
}
