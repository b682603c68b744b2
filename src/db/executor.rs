//! Statement execution.
//!
//! This module runs SQL on a single driver connection and materializes the
//! outcome into a [`ResultSet`]:
//! - Parameterized statements (bound through `db::params`)
//! - Optional row limits (enforced while streaming, so only needed rows are read)
//! - Multi-statement scripts when no parameters are given
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific execution
//! - `postgres`: PostgreSQL-specific execution
//! - `sqlite`: SQLite-specific execution
//!
//! Each submodule provides identical functionality adapted to the database's type system.
//! Errors are returned as raw `sqlx::Error`; the facade attaches the SQL text.

use crate::db::connection::DbConnection;
use crate::db::macros::impl_db_dispatch;
use crate::db::types::RowToJson;
use crate::models::{DatabaseType, QueryParam, ResultSet};
use futures_util::{Stream, TryStreamExt};
use sqlx::{Column, Either, Executor, Statement};
use tracing::debug;

/// Columns and parameter count of a statement validated by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StatementInfo {
    pub(crate) columns: Vec<String>,
    pub(crate) parameters: usize,
}

/// Execute `sql` with `params`, reading at most `limit` rows.
pub(crate) async fn run(
    conn: &mut DbConnection,
    sql: &str,
    params: &[QueryParam],
    limit: Option<usize>,
) -> Result<ResultSet, sqlx::Error> {
    debug!(
        sql = %sql,
        params = params.len(),
        limit = ?limit,
        "Executing statement"
    );

    impl_db_dispatch!(conn, {
        MySql(c) => mysql::run(c, sql, params, limit).await,
        Postgres(c) => postgres::run(c, sql, params, limit).await,
        SQLite(c) => sqlite::run(c, sql, params, limit).await,
    })
}

/// Ask the server to prepare `sql` without executing it.
pub(crate) async fn describe(
    conn: &mut DbConnection,
    sql: &str,
) -> Result<StatementInfo, sqlx::Error> {
    debug!(sql = %sql, "Preparing statement");

    impl_db_dispatch!(conn, {
        MySql(c) => c.prepare(sql).await.map(|s| statement_info(&s)),
        Postgres(c) => c.prepare(sql).await.map(|s| statement_info(&s)),
        SQLite(c) => c.prepare(sql).await.map(|s| statement_info(&s)),
    })
}

/// Query returning the identifier generated by the most recent insert.
pub(crate) fn last_insert_id_sql(db: DatabaseType) -> &'static str {
    match db {
        DatabaseType::MySQL => "SELECT LAST_INSERT_ID()",
        DatabaseType::PostgreSQL => "SELECT lastval()",
        DatabaseType::SQLite => "SELECT last_insert_rowid()",
    }
}

/// Identifier generated by the most recent insert on this connection.
pub(crate) async fn last_insert_id(conn: &mut DbConnection) -> Result<String, sqlx::Error> {
    let sql = last_insert_id_sql(conn.db_type());
    impl_db_dispatch!(conn, {
        // LAST_INSERT_ID() is BIGINT UNSIGNED
        MySql(c) => sqlx::query_scalar::<_, u64>(sql)
            .fetch_one(c)
            .await
            .map(|id| id.to_string()),
        Postgres(c) => sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(c)
            .await
            .map(|id| id.to_string()),
        SQLite(c) => sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(c)
            .await
            .map(|id| id.to_string()),
    })
}

fn statement_info<'q, S: Statement<'q>>(statement: &S) -> StatementInfo {
    let parameters = match statement.parameters() {
        Some(Either::Left(types)) => types.len(),
        Some(Either::Right(count)) => count,
        None => 0,
    };
    StatementInfo {
        columns: statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
        parameters,
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

/// Drain a `fetch_many` stream into a result set. Completion records add
/// their affected-row counts; rows stop being read once `limit` is reached.
async fn collect_results<R, S>(mut stream: S, limit: Option<usize>) -> Result<ResultSet, sqlx::Error>
where
    R: RowToJson,
    S: Stream<Item = Result<Either<u64, R>, sqlx::Error>> + Unpin,
{
    let mut result = ResultSet::default();

    while let Some(step) = stream.try_next().await? {
        match step {
            Either::Left(rows_affected) => result.rows_affected += rows_affected,
            Either::Right(row) => {
                if result.columns.is_empty() {
                    result.columns = row.get_column_names();
                }
                result.rows.push(row.to_json_values());
                if limit.is_some_and(|l| result.rows.len() >= l) {
                    break;
                }
            }
        }
    }

    Ok(result)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::mysql::MySqlConnection;

    pub async fn run(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
        limit: Option<usize>,
    ) -> Result<ResultSet, sqlx::Error> {
        // When params is empty, use raw SQL to avoid prepared statement issues
        // (some SQL like CREATE PROCEDURE doesn't support prepared statements)
        if params.is_empty() {
            let stream = conn
                .fetch_many(sql)
                .map_ok(|step| step.map_left(|done| done.rows_affected()));
            return collect_results(stream, limit).await;
        }

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        let stream = conn
            .fetch_many(query)
            .map_ok(|step| step.map_left(|done| done.rows_affected()));
        collect_results(stream, limit).await
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::postgres::PgConnection;

    pub async fn run(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
        limit: Option<usize>,
    ) -> Result<ResultSet, sqlx::Error> {
        if params.is_empty() {
            let stream = conn
                .fetch_many(sql)
                .map_ok(|step| step.map_left(|done| done.rows_affected()));
            return collect_results(stream, limit).await;
        }

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        let stream = conn
            .fetch_many(query)
            .map_ok(|step| step.map_left(|done| done.rows_affected()));
        collect_results(stream, limit).await
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::sqlite::SqliteConnection;

    pub async fn run(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
        limit: Option<usize>,
    ) -> Result<ResultSet, sqlx::Error> {
        if params.is_empty() {
            let stream = conn
                .fetch_many(sql)
                .map_ok(|step| step.map_left(|done| done.rows_affected()));
            return collect_results(stream, limit).await;
        }

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        let stream = conn
            .fetch_many(query)
            .map_ok(|step| step.map_left(|done| done.rows_affected()));
        collect_results(stream, limit).await
    }
}
