//! Opening fresh driver connections from a [`Configuration`].

use crate::db::connection::{Connection, DbConnection};
use crate::db::executor;
use crate::error::{DbalError, DbalResult, driver_cause};
use crate::models::{Configuration, DatabaseType, Driver};
use sqlx::ConnectOptions;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::postgres::PgConnectOptions;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Opens connections. Never caches; see [`ConnectionManager`](crate::db::ConnectionManager)
/// for named, reusable connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseFactory;

impl DatabaseFactory {
    /// Open a connection and run the driver's post-connect statements.
    ///
    /// Any failure along the way (bad charset, unreachable server, rejected
    /// credentials, timeout, failing setup statement) is reported as
    /// [`DbalError::Connection`]. A connection whose setup failed is closed.
    pub async fn connect(config: &Configuration) -> DbalResult<Connection> {
        let dsn = config.dsn();
        let driver = dsn.driver();
        let db_type = DatabaseType::from(driver);

        validate_charset(config.charset())?;

        info!(
            driver = %driver.display_name(),
            host = %dsn.host(),
            port = dsn.port(),
            database = %dsn.database(),
            persistent = config.is_persistent(),
            "Connecting to database"
        );

        let mut conn = match config.connect_timeout() {
            Some(limit) => timeout(limit, open(config))
                .await
                .map_err(|_| {
                    DbalError::connection(
                        format!("Timed out after {}s", limit.as_secs()),
                        None,
                        format!(
                            "Check that the {} server is reachable at {}:{}",
                            db_type,
                            dsn.host(),
                            dsn.port()
                        ),
                    )
                })??,
            None => open(config).await?,
        };

        for statement in post_connect_statements(driver, config.charset()) {
            debug!(sql = %statement, "Running post-connect statement");
            if let Err(e) = executor::run(&mut conn, &statement, &[], None).await {
                let (message, code) = driver_cause(&e);
                if let Err(close_err) = conn.close().await {
                    warn!(error = %close_err, "Failed to close connection after setup error");
                }
                return Err(DbalError::connection(
                    format!("Post-connect statement '{}' failed: {}", statement, message),
                    code,
                    connection_suggestion(db_type, &e),
                ));
            }
        }

        let server_version = conn.server_version().await;
        info!(
            driver = %driver.display_name(),
            server_version = ?server_version,
            "Connected successfully"
        );

        Ok(Connection::new(conn, config.is_persistent()).with_server_version(server_version))
    }
}

async fn open(config: &Configuration) -> DbalResult<DbConnection> {
    let dsn = config.dsn();
    let db_type = DatabaseType::from(dsn.driver());
    let failed = |e: sqlx::Error| {
        let (message, code) = driver_cause(&e);
        DbalError::connection(
            format!("Failed to connect: {}", message),
            code,
            connection_suggestion(db_type, &e),
        )
    };

    match dsn.driver() {
        Driver::MySql => {
            let options = MySqlConnectOptions::new()
                .host(dsn.host())
                .port(dsn.port())
                .username(config.username())
                .password(config.password())
                .database(dsn.database())
                .charset(config.charset());
            Ok(DbConnection::MySql(options.connect().await.map_err(failed)?))
        }
        Driver::Postgres => {
            let options = PgConnectOptions::new()
                .host(dsn.host())
                .port(dsn.port())
                .username(config.username())
                .password(config.password())
                .database(dsn.database());
            Ok(DbConnection::Postgres(options.connect().await.map_err(failed)?))
        }
    }
}

/// Statements run on every fresh connection, in order.
pub fn post_connect_statements(driver: Driver, charset: &str) -> Vec<String> {
    match driver {
        Driver::MySql => vec![format!("SET NAMES {}", charset)],
        Driver::Postgres => vec![
            format!("SET client_encoding='{}'", charset),
            "SET datestyle='DMY'".to_string(),
        ],
    }
}

/// Charsets are interpolated into setup statements, so only plain names pass.
fn validate_charset(charset: &str) -> DbalResult<()> {
    let valid = !charset.is_empty()
        && charset
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DbalError::connection(
            format!("Invalid charset '{}'", charset),
            None,
            "Use a character set name such as utf8 or utf8mb4",
        ))
    }
}

/// Generate a helpful suggestion for connection errors.
pub(crate) fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the username and password".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("character set") || error_str.contains("encoding") {
        return "Check that the server supports the configured charset".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match db_type {
        DatabaseType::PostgreSQL => {
            "Verify the DSN: pgsql:dbname=<db>;host=<host>;port=5432".to_string()
        }
        DatabaseType::MySQL => "Verify the DSN: mysql:dbname=<db>;host=<host>;port=3306".to_string(),
        DatabaseType::SQLite => {
            "Verify the file path exists and is accessible: sqlite:path/to/db.sqlite".to_string()
        }
    }
}
