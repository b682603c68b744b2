//! Data models for the database abstraction layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod configuration;
pub mod connection;
pub mod dsn;
pub mod query;

// Re-export commonly used types
pub use configuration::{Configuration, DEFAULT_CHARSET};
pub use connection::DatabaseType;
pub use dsn::{DEFAULT_HOST, Driver, Dsn, MYSQL_DEFAULT_PORT, POSTGRES_DEFAULT_PORT};
pub use query::{Condition, Fields, ParamType, Params, QueryParam, ResultSet, Row};
