//! etl-dbkit - Main entry point.
//!
//! Generates synthetic taxi-trip files, loads them into a staging table and
//! reconciles the two, on SQLite, PostgreSQL or MySQL.

use clap::Parser;
use etl_dbkit::config::{Command, Config, DEFAULT_STAGING_TABLE};
use etl_dbkit::db::SessionManager;
use etl_dbkit::db::identifier::{QualifiedName, quote_identifier};
use etl_dbkit::error::InitError;
use etl_dbkit::etl::{
    DESIRED_COLUMNS, ProjectPaths, Stopwatch, count_compare, csv_row_count, data_compare,
    load_csv, read_csv, write_csv,
};
use etl_dbkit::format::{OutputFormat, format_as_json};
use etl_dbkit::models::DatabaseType;
use std::error::Error;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_tracing(&config);

    info!("Starting etl-dbkit v{}", env!("CARGO_PKG_VERSION"));

    let paths = match ProjectPaths::from_config(config.project_home.clone()) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("Error: cannot resolve project home: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut stopwatch = Stopwatch::new();

    if !config.command.needs_database() {
        return match run_offline(&config.command, &paths, &mut stopwatch) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "Command failed");
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let connection = match config.connection_config() {
        Ok(connection) => connection,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("Examples:");
            eprintln!("  etl-dbkit --database sqlite:trips.db load");
            eprintln!("  etl-dbkit --database postgres://localhost/etl -u etl row-count --table t");
            return ExitCode::FAILURE;
        }
    };

    let mut manager = match stopwatch
        .time_async(
            "connect",
            SessionManager::initialize(connection, &config.credentials()),
        )
        .await
    {
        Ok(manager) => manager,
        Err(InitError::Fatal { category, source }) => {
            error!(error = %source, "Initialization failed");
            eprintln!("{}", category);
            return ExitCode::from(2);
        }
        Err(InitError::Unhandled(e)) => {
            error!(error = %e, "Initialization failed");
            eprintln!("Error: {}", e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            return ExitCode::FAILURE;
        }
    };

    let result = run_online(&config, &mut manager, &paths, &mut stopwatch).await;

    manager.release_to_pool().await;
    manager.close_pool().await;
    info!(
        total_ms = stopwatch.total().as_millis() as u64,
        "etl-dbkit finished"
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_offline(
    command: &Command,
    paths: &ProjectPaths,
    stopwatch: &mut Stopwatch,
) -> CliResult<()> {
    match command {
        Command::Generate { rows, file } => {
            paths.ensure_dirs()?;
            let path = paths.output_file(file);
            let mut rng = rand::thread_rng();
            let message = stopwatch.time("generate", || write_csv(&path, *rows, &mut rng))?;
            println!("{}", message);
            Ok(())
        }
        other => Err(format!("Command needs a database: {:?}", other).into()),
    }
}

async fn run_online(
    config: &Config,
    manager: &mut SessionManager,
    paths: &ProjectPaths,
    stopwatch: &mut Stopwatch,
) -> CliResult<()> {
    let db_type = manager.database_type();

    match &config.command {
        Command::Load { file, table } => {
            let path = paths.input_file(file);
            let mut executor = manager.executor()?;
            let summary = stopwatch
                .time_async(
                    "load",
                    load_csv(&mut executor, &path, table, &DESIRED_COLUMNS),
                )
                .await?;
            println!(
                "Loaded {} rows from {} into {}",
                summary.rows,
                path.display(),
                summary.table
            );
        }
        Command::CountValidate { file, query } => {
            let path = paths.input_file(file);
            let source_rows =
                stopwatch.time("read file", || csv_row_count(&path, &DESIRED_COLUMNS))?;
            let query = match query {
                Some(query) => query.clone(),
                None => format!("SELECT COUNT(1) FROM {}", staging_table(db_type)?),
            };
            let target = stopwatch
                .time_async("count query", manager.executor()?.fetch_frame(query))
                .await?;
            let comparison =
                stopwatch.time("count compare", || count_compare(source_rows, &target))?;
            println!("{}", comparison);
        }
        Command::DataValidate { file, query } => {
            let path = paths.input_file(file);
            let source = stopwatch.time("read file", || read_csv(&path, &DESIRED_COLUMNS))?;
            let query = match query {
                Some(query) => query.clone(),
                None => staging_select(db_type)?,
            };
            let target = stopwatch
                .time_async("target query", manager.executor()?.fetch_frame(query))
                .await?;
            let comparison = stopwatch.time("data compare", || data_compare(&source, &target));
            println!("{}", comparison);
        }
        Command::Query { sql, format } => {
            let frame = manager.executor()?.fetch_frame(sql).await?;
            match format {
                OutputFormat::Table => println!("{}", frame),
                OutputFormat::Json => {
                    println!("{}", format_as_json(&frame.columns, &frame.rows)?)
                }
            }
        }
        Command::RowCount { table } => {
            let count = manager.executor()?.row_count(table).await?;
            println!("{}", count);
        }
        Command::Exists { schema, object } => {
            let exists = manager.executor()?.object_exists(schema, object).await?;
            println!("{}", exists);
        }
        Command::Privileged { sql } => {
            let credentials = config
                .privileged_credentials()
                .ok_or("A privileged user is required (--privileged-user)")?;
            let frame = manager.execute_privileged(&credentials, sql).await?;
            println!("{}", frame);
        }
        Command::Version => {
            let server = manager.executor()?.db_version().await?;
            println!("client: {}", manager.client_info().version);
            println!("server: {}", server);
        }
        Command::Generate { .. } => run_offline(&config.command, paths, stopwatch)?,
    }
    Ok(())
}

fn staging_table(db_type: DatabaseType) -> CliResult<String> {
    Ok(QualifiedName::parse(DEFAULT_STAGING_TABLE, db_type)?.quoted())
}

fn staging_select(db_type: DatabaseType) -> CliResult<String> {
    let columns = DESIRED_COLUMNS
        .iter()
        .map(|c| quote_identifier(c, db_type))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("SELECT {} FROM {}", columns, staging_table(db_type)?))
}
