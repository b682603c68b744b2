//! dbal - run one SQL statement against MySQL, PostgreSQL or SQLite.
//!
//! Result rows are printed to stdout as a JSON array of objects. Statements
//! that return no rows print `{"rows_affected": n}`.

use clap::Parser;
use dbal::config::{Config, ConnectTarget};
use dbal::db::{Connection, ConnectionManager, QueryFacade};
use dbal::error::DbalError;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so stdout carries only the result.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn register(manager: &ConnectionManager, config: &Config) -> Result<Arc<Connection>, DbalError> {
    match config.target()? {
        ConnectTarget::Server(cfg) => manager.create(&cfg, &config.connection).await,
        ConnectTarget::Embedded(url) => {
            let connection = Connection::open(&url).await?;
            manager.add(Arc::new(connection), &config.connection).await;
            manager
                .get(&config.connection)
                .await
                .ok_or_else(|| DbalError::connection_not_found(&config.connection))
        }
    }
}

async fn run(manager: &ConnectionManager, config: &Config) -> Result<(), DbalError> {
    let params = config.statement_params()?;
    let connection = register(manager, config).await?;
    let facade = QueryFacade::with_mode(connection, config.mode());

    let result = facade.execute_query(&config.sql, params).await;
    let result = match result {
        Ok(result) => result,
        Err(e) if config.soft => {
            error!(error = %e, "Statement failed");
            Default::default()
        }
        Err(e) => return Err(e),
    };

    let output = if result.columns().is_empty() {
        json!({ "rows_affected": result.row_count() })
    } else {
        json!(result.into_rows())
    };
    let text = serde_json::to_string_pretty(&output)
        .map_err(|e| DbalError::internal(format!("Failed to serialize result: {e}")))?;
    println!("{text}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    init_tracing(&config);

    info!(
        connection = %config.connection,
        mode = ?config.mode(),
        "Starting dbal v{}",
        env!("CARGO_PKG_VERSION")
    );

    let manager = ConnectionManager::new();
    let result = run(&manager, &config).await;
    manager.close_all().await;

    if let Err(e) = result {
        error!(error = %e, "dbal failed");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("Hint: {suggestion}");
        }
        return Err(e.into());
    }

    Ok(())
}
