//! Database dispatch macros for reducing code duplication.
//!
//! The macros expand to a plain `match` over [`DbConnection`] variants, so each
//! arm sees the concrete sqlx connection type.
//!
//! [`DbConnection`]: crate::db::connection::DbConnection

/// Macro for generating database dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => do_mysql(c),
///     Postgres(c) => do_postgres(c),
///     SQLite(c) => do_sqlite(c),
/// });
/// ```
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::connection::DbConnection::$variant($c) => $body,
            )+
        }
    };
}

pub(crate) use impl_db_dispatch;
