//! Integration tests for the query facade.
//!
//! Tests run against an in-memory SQLite database so they need no server:
//! - Fetch helpers and generated INSERT/UPDATE/DELETE
//! - Positional and named placeholders
//! - Transactions, including rollback of an abandoned transaction
//! - Strict and soft failure modes

use dbal::db::{Connection, FacadeMode, QueryFacade};
use dbal::error::DbalError;
use dbal::models::{Condition, Fields, ParamType, Params, QueryParam};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Open an in-memory database with a seeded `users` table.
async fn setup_db() -> Arc<Connection> {
    let connection = Arc::new(Connection::open("sqlite::memory:").await.unwrap());
    let facade = QueryFacade::new(Arc::clone(&connection));
    facade
        .execute_query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT, active INTEGER NOT NULL DEFAULT 1)",
            Params::none(),
        )
        .await
        .unwrap();
    facade
        .execute_query(
            "INSERT INTO users (name, email) VALUES ('Ana', 'ana@example.com'), ('Bea', 'bea@example.com')",
            Params::none(),
        )
        .await
        .unwrap();
    connection
}

async fn count_users(facade: &QueryFacade) -> String {
    facade
        .fetch_column("SELECT COUNT(*) FROM users", Params::none(), 0)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_fetch_all_returns_rows_in_column_order() {
    let facade = QueryFacade::new(setup_db().await);

    let rows = facade
        .fetch_all("SELECT id, name FROM users ORDER BY id", Params::none())
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&json!("Ana")));
    assert_eq!(rows[1].get("id"), Some(&json!(2)));
    let keys: Vec<&String> = rows[0].keys().collect();
    assert_eq!(keys, vec!["id", "name"]);
}

#[tokio::test]
async fn test_fetch_first_and_assoc() {
    let facade = QueryFacade::new(setup_db().await);

    let first = facade
        .fetch_first("SELECT name FROM users ORDER BY id DESC", Params::none())
        .await
        .unwrap();
    assert_eq!(first.get("name"), Some(&json!("Bea")));

    let assoc = facade
        .fetch_assoc("SELECT name, email FROM users WHERE id = ?", Params::positional([1]))
        .await
        .unwrap();
    assert_eq!(assoc.get("email"), Some(&json!("ana@example.com")));

    let missing = facade
        .fetch_first("SELECT name FROM users WHERE id = ?", Params::positional([99]))
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_fetch_array_and_column() {
    let facade = QueryFacade::new(setup_db().await);

    let values = facade
        .fetch_array("SELECT id, name FROM users WHERE id = ?", Params::positional([2]))
        .await
        .unwrap();
    assert_eq!(values, vec![json!(2), json!("Bea")]);

    let name = facade
        .fetch_column("SELECT id, name FROM users WHERE id = ?", Params::positional([2]), 1)
        .await
        .unwrap();
    assert_eq!(name, "Bea");

    // Out of range column and missing row both render as ""
    let out_of_range = facade
        .fetch_column("SELECT id FROM users WHERE id = 1", Params::none(), 5)
        .await
        .unwrap();
    assert_eq!(out_of_range, "");
    let no_row = facade
        .fetch_column("SELECT id FROM users WHERE id = 99", Params::none(), 0)
        .await
        .unwrap();
    assert_eq!(no_row, "");
}

#[tokio::test]
async fn test_named_placeholders() {
    let facade = QueryFacade::new(setup_db().await);

    let rows = facade
        .fetch_all(
            "SELECT id FROM users WHERE name = :name OR email = :name",
            Params::named([("name", "Bea")]),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&json!(2)));
}

#[tokio::test]
async fn test_mixed_placeholders_are_rejected() {
    let facade = QueryFacade::new(setup_db().await);

    let err = facade
        .fetch_all(
            "SELECT id FROM users WHERE id = ? AND name = :name",
            Params::positional([1]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbalError::Query { .. }));
}

#[tokio::test]
async fn test_insert_and_last_insert_id() {
    let facade = QueryFacade::new(setup_db().await);

    let fields = Fields::new()
        .with("name", "Cleo")
        .with("email", QueryParam::Null)
        .with("active", false);
    assert!(facade.insert("users", &fields).await.unwrap());
    assert_eq!(facade.last_insert_id().await.unwrap(), "3");

    let row = facade
        .fetch_assoc("SELECT email, active FROM users WHERE id = 3", Params::none())
        .await
        .unwrap();
    assert_eq!(row.get("email"), Some(&json!(null)));
    assert_eq!(row.get("active"), Some(&json!(0)));
}

#[tokio::test]
async fn test_update_and_delete_report_affected_rows() {
    let facade = QueryFacade::new(setup_db().await);

    let affected = facade
        .update(
            "users",
            &Fields::new().with("email", "ana@new.example.com"),
            &Condition::eq("id", 1),
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let none = facade
        .update("users", &Fields::new().with("name", "X"), &Condition::eq("id", 99))
        .await
        .unwrap();
    assert_eq!(none, 0);

    assert_eq!(facade.delete("users", &Condition::eq("id", 2)).await.unwrap(), 1);
    assert_eq!(count_users(&facade).await, "1");
}

#[tokio::test]
async fn test_update_query() {
    let facade = QueryFacade::new(setup_db().await);

    let affected = facade
        .update_query("UPDATE users SET active = ?", Params::positional([false]))
        .await
        .unwrap();
    assert_eq!(affected, 2);
    assert_eq!(
        facade
            .fetch_column("SELECT SUM(active) FROM users", Params::none(), 0)
            .await
            .unwrap(),
        "0"
    );
}

#[tokio::test]
async fn test_invalid_identifier_is_rejected() {
    let facade = QueryFacade::new(setup_db().await);

    let err = facade
        .insert("users; DROP TABLE users", &Fields::new().with("name", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbalError::InvalidInput { .. }));
    assert_eq!(count_users(&facade).await, "2");
}

#[tokio::test]
async fn test_strict_error_carries_sql() {
    let facade = QueryFacade::new(setup_db().await);
    let sql = "SELECT * FROM missing_table";

    let err = facade.fetch_all(sql, Params::none()).await.unwrap_err();

    assert_eq!(err.sql(), Some(sql));
    assert!(err.to_string().contains("missing_table"));
    assert_eq!(facade.last_sql().as_deref(), Some(sql));
    assert!(facade.last_error().is_some());
}

#[tokio::test]
async fn test_soft_mode_returns_empty_values() {
    let facade = QueryFacade::soft(setup_db().await);
    assert_eq!(facade.mode(), FacadeMode::Soft);

    let rows = facade
        .fetch_all("SELECT * FROM missing_table", Params::none())
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert!(facade.last_error().unwrap().contains("missing_table"));

    let row = facade
        .fetch_first("SELECT * FROM missing_table", Params::none())
        .await
        .unwrap();
    assert!(row.is_empty());

    let column = facade
        .fetch_column("SELECT nope FROM users", Params::none(), 0)
        .await
        .unwrap();
    assert_eq!(column, "");

    let inserted = facade
        .insert("missing_table", &Fields::new().with("a", 1))
        .await
        .unwrap();
    assert!(!inserted);

    assert!(!facade.commit().await.unwrap());

    // A successful call clears the previous error
    assert_eq!(count_users(&facade).await, "2");
    assert!(facade.last_error().is_none());
}

#[tokio::test]
async fn test_execute_query_fails_even_in_soft_mode() {
    let facade = QueryFacade::soft(setup_db().await);

    let err = facade
        .execute_query("SELEC 1", Params::none())
        .await
        .unwrap_err();
    assert_eq!(err.sql(), Some("SELEC 1"));
    assert!(facade.last_error().is_some());
}

#[tokio::test]
async fn test_execute_query_reports_affected_rows() {
    let facade = QueryFacade::new(setup_db().await);

    let result = facade
        .execute_query("DELETE FROM users WHERE active = ?", Params::positional([true]))
        .await
        .unwrap();
    assert_eq!(result.row_count(), 2);
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_transaction_commit() {
    let facade = QueryFacade::new(setup_db().await);

    assert!(facade.begin_transaction().await.unwrap());
    assert!(facade.in_transaction().await);
    facade
        .insert("users", &Fields::new().with("name", "Cleo"))
        .await
        .unwrap();
    assert!(facade.commit().await.unwrap());
    assert!(!facade.in_transaction().await);

    assert_eq!(count_users(&facade).await, "3");
}

#[tokio::test]
async fn test_transaction_rollback() {
    let facade = QueryFacade::new(setup_db().await);

    facade.begin_transaction().await.unwrap();
    facade
        .delete("users", &Condition::eq("id", 1))
        .await
        .unwrap();
    assert_eq!(count_users(&facade).await, "1");
    assert!(facade.rollback().await.unwrap());

    assert_eq!(count_users(&facade).await, "2");
}

#[tokio::test]
async fn test_transaction_state_errors() {
    let facade = QueryFacade::new(setup_db().await);

    let err = facade.commit().await.unwrap_err();
    assert!(matches!(err, DbalError::Transaction { .. }));
    assert!(facade.rollback().await.is_err());

    facade.begin_transaction().await.unwrap();
    let err = facade.begin_transaction().await.unwrap_err();
    assert!(matches!(err, DbalError::Transaction { .. }));
    facade.rollback().await.unwrap();
}

#[tokio::test]
async fn test_transaction_reserves_connection() {
    let connection = setup_db().await;
    let writer = QueryFacade::new(Arc::clone(&connection));
    let reader = QueryFacade::new(Arc::clone(&connection));

    writer.begin_transaction().await.unwrap();

    let blocked = tokio::time::timeout(
        Duration::from_millis(100),
        reader.fetch_all("SELECT * FROM users", Params::none()),
    )
    .await;
    assert!(blocked.is_err(), "other facades wait while a transaction is open");

    writer.commit().await.unwrap();
    assert_eq!(count_users(&reader).await, "2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transaction_belongs_to_the_task_that_began_it() {
    let facade = Arc::new(QueryFacade::new(setup_db().await));
    facade.begin_transaction().await.unwrap();

    let other = Arc::clone(&facade);
    let outsider = tokio::spawn(async move {
        assert!(!other.in_transaction().await);
        let err = other.commit().await.unwrap_err();
        assert!(matches!(err, DbalError::Transaction { .. }));
        other
            .insert("users", &Fields::new().with("name", "Cleo"))
            .await
            .unwrap()
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!outsider.is_finished(), "other tasks wait for the transaction");
    assert!(facade.in_transaction().await);

    facade.rollback().await.unwrap();
    assert!(outsider.await.unwrap());
    assert_eq!(count_users(&facade).await, "3");
}

#[tokio::test]
async fn test_dropped_facade_rolls_back() {
    let connection = setup_db().await;

    {
        let facade = QueryFacade::new(Arc::clone(&connection));
        facade.begin_transaction().await.unwrap();
        facade
            .execute_query("DELETE FROM users", Params::none())
            .await
            .unwrap();
    }

    let facade = QueryFacade::new(connection);
    assert_eq!(count_users(&facade).await, "2");
}

#[tokio::test]
async fn test_prepare() {
    let facade = QueryFacade::new(setup_db().await);

    let statement = facade
        .prepare("SELECT id, name FROM users WHERE id = ?")
        .await
        .unwrap();
    assert_eq!(statement.columns(), ["id".to_string(), "name".to_string()]);
    assert_eq!(statement.parameter_count(), 1);

    let result = statement
        .execute(&facade, Params::positional([2]))
        .await
        .unwrap();
    assert_eq!(result.first_row().unwrap().get("name"), Some(&json!("Bea")));
}

#[tokio::test]
async fn test_prepare_rejects_invalid_sql_in_soft_mode() {
    let facade = QueryFacade::soft(setup_db().await);

    let err = facade
        .prepare("SELECT * FROM missing_table")
        .await
        .unwrap_err();
    assert!(matches!(err, DbalError::Query { .. }));
}

#[tokio::test]
async fn test_quote_matches_sqlite_literals() {
    let facade = QueryFacade::new(setup_db().await);

    let quoted = facade.quote("O'Brien", ParamType::Str).unwrap();
    assert_eq!(quoted, "'O''Brien'");

    let sql = format!("SELECT id FROM users WHERE name = {}", facade.quote("Ana", ParamType::Str).unwrap());
    assert_eq!(facade.fetch_column(&sql, Params::none(), 0).await.unwrap(), "1");

    assert_eq!(facade.quote("", ParamType::Null).unwrap(), "NULL");
    assert!(facade.quote("abc", ParamType::Int).is_err());
}
