//! Data source names.
//!
//! A [`Dsn`] identifies a database server and schema. It is validated once at
//! construction and rendered on demand as
//! `{driver}:dbname={database};host={host};port={port}`.

use crate::error::{DbalError, DbalResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_HOST: &str = "localhost";
pub const MYSQL_DEFAULT_PORT: u16 = 3306;
pub const POSTGRES_DEFAULT_PORT: u16 = 5432;

/// Drivers a [`Dsn`] may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    MySql,
    Postgres,
}

impl Driver {
    /// Every driver accepted by [`Dsn::new`].
    pub const SUPPORTED: [Driver; 2] = [Driver::MySql, Driver::Postgres];

    /// Name used as the connection-string prefix.
    pub fn dsn_prefix(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "pgsql",
        }
    }

    /// Canonical server port for this driver.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql => MYSQL_DEFAULT_PORT,
            Self::Postgres => POSTGRES_DEFAULT_PORT,
        }
    }

    /// Get the display name for this driver.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
        }
    }
}

impl FromStr for Driver {
    type Err = DbalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(Self::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(DbalError::unsupported_driver(other)),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Immutable data source name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    driver: Driver,
    database: String,
    host: String,
    port: u16,
}

impl Dsn {
    /// Create a DSN. A port of 0 selects the driver's canonical port.
    pub fn new(
        driver: &str,
        database: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> DbalResult<Self> {
        let driver: Driver = driver.parse()?;
        let port = if port == 0 { driver.default_port() } else { port };

        Ok(Self {
            driver,
            database: database.into(),
            host: host.into(),
            port,
        })
    }

    /// Create a DSN for `localhost` on the driver's canonical port.
    pub fn with_defaults(driver: &str, database: impl Into<String>) -> DbalResult<Self> {
        Self::new(driver, database, DEFAULT_HOST, 0)
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Render the driver connection string.
    pub fn to_connection_string(&self) -> String {
        format!(
            "{}:dbname={};host={};port={}",
            self.driver.dsn_prefix(),
            self.database,
            self.host,
            self.port
        )
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_connection_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let mysql = Dsn::with_defaults("mysql", "shop").unwrap();
        assert_eq!(mysql.port(), 3306);
        assert_eq!(mysql.host(), "localhost");

        let pgsql = Dsn::new("pgsql", "shop", "db.internal", 0).unwrap();
        assert_eq!(pgsql.port(), 5432);
        assert_eq!(pgsql.driver(), Driver::Postgres);
    }

    #[test]
    fn test_explicit_port_is_kept() {
        let dsn = Dsn::new("mysql", "shop", "127.0.0.1", 3307).unwrap();
        assert_eq!(dsn.port(), 3307);
    }

    #[test]
    fn test_unsupported_drivers_fail() {
        for name in ["sqlite", "oracle", "MySQL", "", "mssql"] {
            let result = Dsn::new(name, "shop", "localhost", 0);
            assert!(
                matches!(result, Err(DbalError::UnsupportedDriver { .. })),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_connection_string_format() {
        let dsn = Dsn::new("mysql", "shop", "db.local", 0).unwrap();
        assert_eq!(
            dsn.to_connection_string(),
            "mysql:dbname=shop;host=db.local;port=3306"
        );

        let dsn = Dsn::new("postgres", "crm", "10.0.0.5", 6432).unwrap();
        assert_eq!(dsn.to_string(), "pgsql:dbname=crm;host=10.0.0.5;port=6432");
    }

    #[test]
    fn test_supported_drivers_round_trip_through_prefix() {
        for driver in Driver::SUPPORTED {
            let parsed: Driver = driver.dsn_prefix().parse().unwrap();
            assert_eq!(parsed, driver);
        }
    }
}
