//! Open database connections.
//!
//! A [`Connection`] owns exactly one driver connection behind an async mutex.
//! It is shared as `Arc<Connection>` between the [`ConnectionManager`] and any
//! number of facades; whoever holds the mutex has exclusive use of the wire.
//!
//! [`ConnectionManager`]: crate::db::ConnectionManager

use crate::db::factory::connection_suggestion;
use crate::db::macros::impl_db_dispatch;
use crate::error::{DbalError, DbalResult, driver_cause};
use crate::models::DatabaseType;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection as _};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Database-specific connection (avoids `AnyConnection` limitations).
#[derive(Debug)]
pub enum DbConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

impl DbConnection {
    /// Get the database type for this connection.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbConnection::MySql(_) => DatabaseType::MySQL,
            DbConnection::Postgres(_) => DatabaseType::PostgreSQL,
            DbConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Gracefully close the connection.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        impl_db_dispatch!(self, {
            MySql(c) => c.close().await,
            Postgres(c) => c.close().await,
            SQLite(c) => c.close().await,
        })
    }

    /// Check that the connection is still alive.
    pub async fn ping(&mut self) -> Result<(), sqlx::Error> {
        impl_db_dispatch!(self, {
            MySql(c) => c.ping().await,
            Postgres(c) => c.ping().await,
            SQLite(c) => c.ping().await,
        })
    }

    /// Get the server version from the connected database.
    pub(crate) async fn server_version(&mut self) -> Option<String> {
        let result = impl_db_dispatch!(self, {
            MySql(c) => sqlx::query_scalar::<_, String>("SELECT version()").fetch_one(c).await,
            Postgres(c) => sqlx::query_scalar::<_, String>("SELECT version()").fetch_one(c).await,
            SQLite(c) => sqlx::query_scalar::<_, String>("SELECT sqlite_version()").fetch_one(c).await,
        });

        match result {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }
}

/// A registered database connection.
#[derive(Debug)]
pub struct Connection {
    kind: DatabaseType,
    persistent: bool,
    server_version: Option<String>,
    handle: Arc<Mutex<DbConnection>>,
}

impl Connection {
    /// Wrap an already opened driver connection.
    pub fn new(conn: DbConnection, persistent: bool) -> Self {
        Self {
            kind: conn.db_type(),
            persistent,
            server_version: None,
            handle: Arc::new(Mutex::new(conn)),
        }
    }

    pub(crate) fn with_server_version(mut self, version: Option<String>) -> Self {
        self.server_version = version;
        self
    }

    /// Open a connection from a driver URL (`mysql://`, `postgres://`, `sqlite:`).
    ///
    /// This bypasses [`DatabaseFactory`](crate::db::DatabaseFactory) and runs no
    /// post-connect statements; it is meant for connections handed to
    /// [`ConnectionManager::add`](crate::db::ConnectionManager::add). SQLite
    /// files are created if missing.
    pub async fn open(url: &str) -> DbalResult<Self> {
        let kind = DatabaseType::from_connection_string(url).ok_or_else(|| {
            let scheme = url.split(':').next().unwrap_or(url);
            DbalError::unsupported_driver(scheme)
        })?;

        let invalid = |e: sqlx::Error| {
            DbalError::connection(
                format!("Invalid {} connection string: {}", kind, e),
                None,
                connection_suggestion(kind, &e),
            )
        };
        let failed = |e: sqlx::Error| {
            let (message, code) = driver_cause(&e);
            DbalError::connection(
                format!("Failed to connect: {}", message),
                code,
                connection_suggestion(kind, &e),
            )
        };

        let mut conn = match kind {
            DatabaseType::MySQL => {
                let options = MySqlConnectOptions::from_str(url).map_err(invalid)?;
                DbConnection::MySql(options.connect().await.map_err(failed)?)
            }
            DatabaseType::PostgreSQL => {
                let options = PgConnectOptions::from_str(url).map_err(invalid)?;
                DbConnection::Postgres(options.connect().await.map_err(failed)?)
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(url)
                    .map_err(invalid)?
                    .create_if_missing(true);
                DbConnection::SQLite(options.connect().await.map_err(failed)?)
            }
        };

        let server_version = conn.server_version().await;
        info!(db_type = %kind, server_version = ?server_version, "Opened connection");

        Ok(Self::new(conn, false).with_server_version(server_version))
    }

    /// Get the database type for this connection.
    pub fn db_type(&self) -> DatabaseType {
        self.kind
    }

    /// Whether the connection outlives its registry entry.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Server version reported when the connection was opened.
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub(crate) fn handle(&self) -> &Arc<Mutex<DbConnection>> {
        &self.handle
    }

    /// Check that the connection is still alive.
    pub async fn ping(&self) -> DbalResult<()> {
        let mut conn = self.handle.lock().await;
        conn.ping().await.map_err(|e| {
            let (message, code) = driver_cause(&e);
            DbalError::connection(message, code, connection_suggestion(self.kind, &e))
        })
    }

    /// Gracefully close the connection.
    ///
    /// Returns `false` without closing when a facade or transaction still
    /// holds the driver connection; it is then released when the last holder
    /// drops it.
    pub async fn close(self) -> DbalResult<bool> {
        let kind = self.kind;
        match Arc::try_unwrap(self.handle) {
            Ok(mutex) => {
                mutex.into_inner().close().await.map_err(|e| {
                    let (message, code) = driver_cause(&e);
                    DbalError::connection(message, code, connection_suggestion(kind, &e))
                })?;
                debug!(db_type = %kind, "Connection closed");
                Ok(true)
            }
            Err(_) => {
                warn!(db_type = %kind, "Connection still in use, not closing");
                Ok(false)
            }
        }
    }
}
