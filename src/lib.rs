//! dbal - a lightweight database abstraction layer
//!
//! Connection descriptors and a factory for MySQL and PostgreSQL, a named
//! connection registry, a query facade with strict and soft error modes, and
//! an active-record style entity mapper on top.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod models;

pub use config::Config;
pub use db::{
    Connection, ConnectionManager, DatabaseFactory, FacadeMode, PreparedStatement, QueryFacade,
};
pub use entity::{Entity, EntityMapper, FieldSet};
pub use error::{DbalError, DbalResult};
pub use models::{Condition, Configuration, Dsn, Fields, ParamType, Params, QueryParam, ResultSet, Row};
