//! Database access layer.
//!
//! This module provides database access functionality:
//! - Opening connections from a `Configuration` (`factory`)
//! - Named connection registry (`manager`)
//! - Query facade with strict and soft failure modes (`facade`)
//! - Statement execution, placeholder rewriting, and literal quoting
//! - Type mappings from driver rows to JSON values
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub(crate) mod macros;
pub mod connection;
pub(crate) mod executor;
pub mod facade;
pub mod factory;
pub mod manager;
pub(crate) mod params;
pub(crate) mod placeholders;
pub mod quote;
pub mod types;

pub use connection::{Connection, DbConnection};
pub use facade::{FacadeMode, PreparedStatement, QueryFacade};
pub use factory::{DatabaseFactory, post_connect_statements};
pub use manager::ConnectionManager;
