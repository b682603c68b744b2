//! Query execution facade.
//!
//! [`QueryFacade`] wraps one registered [`Connection`] and offers fetch
//! helpers, generated INSERT/UPDATE/DELETE statements, transactions, and
//! literal quoting. Statements use `?` or `:name` placeholders on every
//! database.
//!
//! # Failure modes
//!
//! In [`FacadeMode::Strict`] (the default) every failure is returned as a
//! [`DbalError`]. In [`FacadeMode::Soft`] the failure is logged, kept as
//! [`QueryFacade::last_error`], and the operation returns its empty value
//! (`false`, `0`, `""`, an empty row or list). `execute_query` and `prepare`
//! return errors in both modes.
//!
//! # Transactions
//!
//! A transaction belongs to the tokio task that began it. Statements from
//! that task run inside it; statements from any other task sharing the
//! facade wait for the connection until the owner commits or rolls back.

use crate::db::connection::{Connection, DbConnection};
use crate::db::{executor, placeholders, quote};
use crate::error::{DbalError, DbalResult};
use crate::models::{
    Condition, DatabaseType, Fields, ParamType, Params, QueryParam, ResultSet, Row,
};
use serde_json::Value as JsonValue;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard, OwnedMutexGuard};
use tokio::task::{self, Id as TaskId};
use tracing::{debug, warn};

/// How a facade reports failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacadeMode {
    /// Return every failure as an error.
    #[default]
    Strict,
    /// Log failures and return an empty value instead.
    Soft,
}

#[derive(Debug, Default)]
struct Diagnostics {
    last_sql: Option<String>,
    last_error: Option<String>,
}

/// An open transaction and the task it belongs to. `None` is code running
/// outside any spawned task, such as a `block_on` future.
struct OpenTransaction {
    owner: Option<TaskId>,
    conn: OwnedMutexGuard<DbConnection>,
}

/// Connection access for one operation: either the caller's open
/// transaction or a plain lock on the shared connection.
enum ConnGuard<'a> {
    Transaction(MappedMutexGuard<'a, DbConnection>),
    Direct(MutexGuard<'a, DbConnection>),
}

impl Deref for ConnGuard<'_> {
    type Target = DbConnection;

    fn deref(&self) -> &DbConnection {
        match self {
            ConnGuard::Transaction(conn) => conn,
            ConnGuard::Direct(conn) => conn,
        }
    }
}

impl DerefMut for ConnGuard<'_> {
    fn deref_mut(&mut self) -> &mut DbConnection {
        match self {
            ConnGuard::Transaction(conn) => conn,
            ConnGuard::Direct(conn) => conn,
        }
    }
}

pub struct QueryFacade {
    connection: Arc<Connection>,
    mode: FacadeMode,
    diagnostics: std::sync::Mutex<Diagnostics>,
    /// Exclusive hold on the connection while a transaction is open.
    transaction: Mutex<Option<OpenTransaction>>,
}

impl std::fmt::Debug for QueryFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryFacade")
            .field("db_type", &self.connection.db_type())
            .field("mode", &self.mode)
            .field("last_sql", &self.last_sql())
            .finish_non_exhaustive()
    }
}

impl QueryFacade {
    /// Create a strict facade.
    pub fn new(connection: Arc<Connection>) -> Self {
        Self::with_mode(connection, FacadeMode::Strict)
    }

    /// Create a soft-fail facade.
    pub fn soft(connection: Arc<Connection>) -> Self {
        Self::with_mode(connection, FacadeMode::Soft)
    }

    pub fn with_mode(connection: Arc<Connection>, mode: FacadeMode) -> Self {
        Self {
            connection,
            mode,
            diagnostics: std::sync::Mutex::new(Diagnostics::default()),
            transaction: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> FacadeMode {
        self.mode
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// SQL text of the most recent statement attempted.
    pub fn last_sql(&self) -> Option<String> {
        self.diagnostics().last_sql.clone()
    }

    /// Message of the most recent failure, cleared by every new call.
    pub fn last_error(&self) -> Option<String> {
        self.diagnostics().last_error.clone()
    }

    /// Whether the calling task has a transaction open on this facade.
    pub async fn in_transaction(&self) -> bool {
        let owner = task::try_id();
        self.transaction
            .lock()
            .await
            .as_ref()
            .is_some_and(|tx| tx.owner == owner)
    }

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    /// Start a transaction owned by the calling task. The connection stays
    /// reserved for that task until [`commit`](Self::commit) or
    /// [`rollback`](Self::rollback); if another task holds a transaction,
    /// this waits for it to finish.
    pub async fn begin_transaction(&self) -> DbalResult<bool> {
        let result = self.begin_inner().await;
        self.settle(result)
    }

    pub async fn commit(&self) -> DbalResult<bool> {
        let result = self.commit_inner().await;
        self.settle(result)
    }

    pub async fn rollback(&self) -> DbalResult<bool> {
        let result = self.rollback_inner().await;
        self.settle(result)
    }

    async fn begin_inner(&self) -> DbalResult<bool> {
        self.start_call(Some("BEGIN"));
        let owner = task::try_id();
        if self.in_transaction().await {
            return Err(DbalError::transaction("A transaction is already active", None));
        }

        // Waits here while another task's transaction holds the connection
        let mut conn = Arc::clone(self.connection.handle()).lock_owned().await;
        executor::run(&mut conn, "BEGIN", &[], None)
            .await
            .map_err(|e| DbalError::from_transaction(&e))?;
        *self.transaction.lock().await = Some(OpenTransaction { owner, conn });
        debug!(db_type = %self.connection.db_type(), task = ?owner, "Transaction started");
        Ok(true)
    }

    /// Take the calling task's transaction out of the slot.
    async fn take_own_transaction(&self) -> DbalResult<OwnedMutexGuard<DbConnection>> {
        let owner = task::try_id();
        let mut slot = self.transaction.lock().await;
        match slot.take_if(|tx| tx.owner == owner) {
            Some(tx) => Ok(tx.conn),
            None => Err(DbalError::transaction("No active transaction", None)),
        }
    }

    async fn commit_inner(&self) -> DbalResult<bool> {
        self.start_call(Some("COMMIT"));
        let mut conn = self.take_own_transaction().await?;

        if let Err(e) = executor::run(&mut conn, "COMMIT", &[], None).await {
            if let Err(rollback_err) = executor::run(&mut conn, "ROLLBACK", &[], None).await {
                warn!(error = %rollback_err, "Rollback after failed commit also failed");
            }
            return Err(DbalError::from_transaction(&e));
        }
        debug!("Transaction committed");
        Ok(true)
    }

    async fn rollback_inner(&self) -> DbalResult<bool> {
        self.start_call(Some("ROLLBACK"));
        let mut conn = self.take_own_transaction().await?;

        executor::run(&mut conn, "ROLLBACK", &[], None)
            .await
            .map_err(|e| DbalError::from_transaction(&e))?;
        debug!("Transaction rolled back");
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Fetching
    // -------------------------------------------------------------------------

    /// Every row of the result, as column-name maps.
    pub async fn fetch_all(&self, sql: &str, params: Params) -> DbalResult<Vec<Row>> {
        let result = self.run(sql, &params, None).await.map(ResultSet::into_rows);
        self.settle(result)
    }

    /// The first row, or an empty row when there is none.
    pub async fn fetch_first(&self, sql: &str, params: Params) -> DbalResult<Row> {
        let result = self
            .run(sql, &params, Some(1))
            .await
            .map(|rs| rs.into_rows().into_iter().next().unwrap_or_default());
        self.settle(result)
    }

    /// Values of the first row in column order.
    pub async fn fetch_array(&self, sql: &str, params: Params) -> DbalResult<Vec<JsonValue>> {
        let result = self
            .run(sql, &params, Some(1))
            .await
            .map(|rs| rs.first_values().map(<[JsonValue]>::to_vec).unwrap_or_default());
        self.settle(result)
    }

    /// The first row as a column-name map.
    pub async fn fetch_assoc(&self, sql: &str, params: Params) -> DbalResult<Row> {
        let result = self
            .run(sql, &params, Some(1))
            .await
            .map(|rs| rs.first_row().unwrap_or_default());
        self.settle(result)
    }

    /// One column of the first row rendered as text. Missing rows, missing
    /// columns, and NULL all render as `""`.
    pub async fn fetch_column(&self, sql: &str, params: Params, index: usize) -> DbalResult<String> {
        let result = self.run(sql, &params, Some(1)).await.map(|rs| {
            render_scalar(rs.first_values().and_then(|values| values.get(index)))
        });
        self.settle(result)
    }

    // -------------------------------------------------------------------------
    // Writing
    // -------------------------------------------------------------------------

    /// Insert one row. Returns whether a row was written.
    pub async fn insert(&self, table: &str, fields: &Fields) -> DbalResult<bool> {
        let result = self.insert_inner(table, fields).await;
        self.settle(result)
    }

    /// Update rows matching `condition`. Returns the affected-row count.
    pub async fn update(&self, table: &str, fields: &Fields, condition: &Condition) -> DbalResult<u64> {
        let result = self.update_inner(table, fields, condition).await;
        self.settle(result)
    }

    /// Delete rows matching `condition`. Returns the affected-row count.
    pub async fn delete(&self, table: &str, condition: &Condition) -> DbalResult<u64> {
        let result = self.delete_inner(table, condition).await;
        self.settle(result)
    }

    async fn insert_inner(&self, table: &str, fields: &Fields) -> DbalResult<bool> {
        let (sql, values) = build_insert(table, fields)?;
        let rs = self.run(&sql, &Params::Positional(values), None).await?;
        Ok(rs.row_count() > 0)
    }

    async fn update_inner(&self, table: &str, fields: &Fields, condition: &Condition) -> DbalResult<u64> {
        let (sql, values) = build_update(table, fields, condition)?;
        let rs = self.run(&sql, &Params::Positional(values), None).await?;
        Ok(rs.row_count())
    }

    async fn delete_inner(&self, table: &str, condition: &Condition) -> DbalResult<u64> {
        let (sql, values) = build_delete(table, condition)?;
        let rs = self.run(&sql, &Params::Positional(values), None).await?;
        Ok(rs.row_count())
    }

    /// Insert one row and read back its generated id while still holding the
    /// connection, so no other insert can run in between. `None` when no row
    /// was written.
    pub(crate) async fn insert_returning_id(&self, table: &str, fields: &Fields) -> DbalResult<Option<String>> {
        let result = self.insert_returning_id_inner(table, fields).await;
        self.settle(result)
    }

    async fn insert_returning_id_inner(&self, table: &str, fields: &Fields) -> DbalResult<Option<String>> {
        let (sql, values) = build_insert(table, fields)?;
        let (native, values) = self.statement(&sql, &Params::Positional(values))?;

        let mut conn = self.acquire().await;
        let rs = executor::run(&mut conn, &native, &values, None)
            .await
            .map_err(|e| DbalError::from_driver(&e, &sql))?;
        if rs.row_count() == 0 {
            return Ok(None);
        }
        self.read_last_insert_id(&mut conn).await.map(Some)
    }

    /// Run an arbitrary modifying statement. Returns the affected-row count.
    pub async fn update_query(&self, sql: &str, params: Params) -> DbalResult<u64> {
        let result = self.run(sql, &params, None).await.map(|rs| rs.row_count());
        self.settle(result)
    }

    /// Identifier generated by the most recent insert on this connection.
    pub async fn last_insert_id(&self) -> DbalResult<String> {
        let result = self.last_insert_id_inner().await;
        self.settle(result)
    }

    async fn last_insert_id_inner(&self) -> DbalResult<String> {
        let mut conn = self.acquire().await;
        self.read_last_insert_id(&mut conn).await
    }

    async fn read_last_insert_id(&self, conn: &mut DbConnection) -> DbalResult<String> {
        let db_type = self.connection.db_type();
        let sql = executor::last_insert_id_sql(db_type);
        self.start_call(Some(sql));

        executor::last_insert_id(conn).await.map_err(|e| {
            let err = DbalError::from_driver(&e, sql);
            // 55000: lastval() called before any sequence use in this session
            if db_type == DatabaseType::PostgreSQL && err.code() == Some("55000") {
                return DbalError::query(
                    "Cannot get id, lastval is not yet defined",
                    Some("55000".to_string()),
                    sql,
                );
            }
            err
        })
    }

    // -------------------------------------------------------------------------
    // Low level
    // -------------------------------------------------------------------------

    /// Quote `value` as an SQL literal for this connection.
    pub fn quote(&self, value: &str, param_type: ParamType) -> DbalResult<String> {
        self.start_call(None);
        let result = quote::quote(value, param_type, self.connection.db_type());
        self.settle(result)
    }

    /// Execute a statement and return the full result set. Errors are
    /// returned even in soft mode.
    pub async fn execute_query(&self, sql: &str, params: Params) -> DbalResult<ResultSet> {
        let result = self.run(sql, &params, None).await;
        if let Err(e) = &result {
            self.record_error(e);
        }
        result
    }

    /// Validate a statement with the server without executing it. Errors are
    /// returned even in soft mode.
    pub async fn prepare(&self, sql: &str) -> DbalResult<PreparedStatement> {
        let result = self.prepare_inner(sql).await;
        if let Err(e) = &result {
            self.record_error(e);
        }
        result
    }

    async fn prepare_inner(&self, sql: &str) -> DbalResult<PreparedStatement> {
        self.start_call(Some(sql));
        let rewritten = placeholders::rewrite(sql, self.connection.db_type())?;
        let mut conn = self.acquire().await;
        let info = executor::describe(&mut conn, &rewritten.sql)
            .await
            .map_err(|e| DbalError::from_driver(&e, sql))?;

        Ok(PreparedStatement {
            sql: sql.to_string(),
            columns: info.columns,
            parameter_count: info.parameters.max(rewritten.slot_count()),
        })
    }

    async fn run(&self, sql: &str, params: &Params, limit: Option<usize>) -> DbalResult<ResultSet> {
        let (native, values) = self.statement(sql, params)?;

        let mut conn = self.acquire().await;
        executor::run(&mut conn, &native, &values, limit)
            .await
            .map_err(|e| DbalError::from_driver(&e, sql))
    }

    /// Record `sql` and rewrite it to native placeholders with bound values.
    fn statement(&self, sql: &str, params: &Params) -> DbalResult<(String, Vec<QueryParam>)> {
        self.start_call(Some(sql));
        let rewritten = placeholders::rewrite(sql, self.connection.db_type())?;
        let values = rewritten.bind(params)?;
        Ok((rewritten.sql, values))
    }

    /// The caller's transaction if it has one, otherwise the connection
    /// itself, waiting out any transaction owned by another task.
    async fn acquire(&self) -> ConnGuard<'_> {
        let owner = task::try_id();
        let slot = self.transaction.lock().await;
        let own = MutexGuard::try_map(slot, |slot| {
            slot.as_mut()
                .filter(|tx| tx.owner == owner)
                .map(|tx| &mut *tx.conn)
        });
        match own {
            Ok(conn) => ConnGuard::Transaction(conn),
            // The slot guard is released before waiting so the owner can finish
            Err(slot) => {
                drop(slot);
                ConnGuard::Direct(self.connection.handle().lock().await)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    fn diagnostics(&self) -> std::sync::MutexGuard<'_, Diagnostics> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_call(&self, sql: Option<&str>) {
        let mut diagnostics = self.diagnostics();
        diagnostics.last_error = None;
        if let Some(sql) = sql {
            diagnostics.last_sql = Some(sql.to_string());
        }
    }

    fn record_error(&self, err: &DbalError) {
        self.diagnostics().last_error = Some(err.to_string());
    }

    fn settle<T: Default>(&self, result: DbalResult<T>) -> DbalResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.record_error(&e);
                match self.mode {
                    FacadeMode::Strict => Err(e),
                    FacadeMode::Soft => {
                        warn!(error = %e, sql = ?self.last_sql(), "Statement failed, returning empty value");
                        Ok(T::default())
                    }
                }
            }
        }
    }
}

impl Drop for QueryFacade {
    fn drop(&mut self) {
        let Some(OpenTransaction { mut conn, .. }) = self.transaction.get_mut().take() else {
            return;
        };

        // Roll back in a task since Drop cannot await
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    match executor::run(&mut conn, "ROLLBACK", &[], None).await {
                        Ok(_) => warn!("Open transaction rolled back via Drop - commit or roll back explicitly"),
                        Err(e) => warn!(error = %e, "Failed to roll back abandoned transaction"),
                    }
                });
            }
            Err(_) => warn!("No runtime available to roll back abandoned transaction"),
        }
    }
}

/// A statement the server accepted, ready to run with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    sql: String,
    columns: Vec<String>,
    parameter_count: usize,
}

impl PreparedStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Result column names; empty for statements that return no rows.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Run the statement through `facade`.
    pub async fn execute(&self, facade: &QueryFacade, params: Params) -> DbalResult<ResultSet> {
        facade.execute_query(&self.sql, params).await
    }
}

// =============================================================================
// Statement Builders
// =============================================================================

fn validate_identifier(name: &str) -> DbalResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(DbalError::invalid_input(format!(
            "Invalid identifier '{}'",
            name
        )))
    }
}

fn build_insert(table: &str, fields: &Fields) -> DbalResult<(String, Vec<QueryParam>)> {
    validate_identifier(table)?;
    if fields.is_empty() {
        return Err(DbalError::invalid_input("Cannot insert a row without fields"));
    }
    for column in fields.columns() {
        validate_identifier(column)?;
    }

    let columns: Vec<&str> = fields.columns().collect();
    let markers = vec!["?"; columns.len()];
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(","),
        markers.join(",")
    );
    Ok((sql, fields.values().cloned().collect()))
}

fn build_update(
    table: &str,
    fields: &Fields,
    condition: &Condition,
) -> DbalResult<(String, Vec<QueryParam>)> {
    validate_identifier(table)?;
    validate_identifier(condition.column())?;
    if fields.is_empty() {
        return Err(DbalError::invalid_input("Cannot update a row without fields"));
    }

    let mut assignments = Vec::with_capacity(fields.len());
    for column in fields.columns() {
        validate_identifier(column)?;
        assignments.push(format!("{}=?", column));
    }
    let sql = format!(
        "UPDATE {} SET {} WHERE {}=?",
        table,
        assignments.join(","),
        condition.column()
    );

    let mut values: Vec<QueryParam> = fields.values().cloned().collect();
    values.push(condition.value().clone());
    Ok((sql, values))
}

fn build_delete(table: &str, condition: &Condition) -> DbalResult<(String, Vec<QueryParam>)> {
    validate_identifier(table)?;
    validate_identifier(condition.column())?;
    let sql = format!("DELETE FROM {} WHERE {}=?", table, condition.column());
    Ok((sql, vec![condition.value().clone()]))
}

fn render_scalar(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::Bool(b)) => (if *b { "1" } else { "0" }).to_string(),
        Some(other) => other.to_string(),
    }
}
