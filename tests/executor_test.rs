//! Integration tests for statement execution against SQLite.
//!
//! Tests verify that:
//! - Missing or non-sequence parameters run as an empty parameter list
//! - Rows are normalized into JSON objects
//! - Writes report affected rows and insert ids
//! - Failed statements carry their SQL and parameters

use maintenance_store::db::{ConnectionPool, QueryExecutor, QueryParam};
use maintenance_store::models::StoreConfig;
use maintenance_store::{PoolOptions, StoreError};
use serde_json::json;
use tempfile::TempDir;

async fn setup() -> (TempDir, ConnectionPool, QueryExecutor) {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::sqlite(dir.path().join("exec.db"), PoolOptions::default()).unwrap();
    let pool = ConnectionPool::new(config).unwrap();
    let executor = QueryExecutor::new(pool.clone());

    executor
        .query_direct(
            "CREATE TABLE equipamentos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT NOT NULL,
                setor TEXT,
                custo REAL,
                foto BLOB
            )",
            (),
        )
        .await
        .unwrap();

    (dir, pool, executor)
}

#[tokio::test]
async fn test_missing_params_execute_as_empty() {
    let (_dir, pool, executor) = setup().await;

    let none: Option<Vec<QueryParam>> = None;
    let rows = executor
        .query("SELECT id FROM equipamentos", none)
        .await
        .unwrap();
    assert!(rows.is_empty());

    let rows = executor
        .query("SELECT id FROM equipamentos", serde_json::Value::Null)
        .await
        .unwrap();
    assert!(rows.is_empty());

    let rows = executor
        .query_direct("SELECT id FROM equipamentos", json!({"unexpected": true}))
        .await
        .unwrap();
    assert!(rows.is_empty());

    pool.close().await;
}

#[tokio::test]
async fn test_execute_reports_insert_id_and_rows() {
    let (_dir, pool, executor) = setup().await;

    let first = executor
        .execute(
            "INSERT INTO equipamentos (nome, setor, custo) VALUES (?, ?, ?)",
            vec![
                QueryParam::from("Monitor multiparamétrico"),
                QueryParam::from("UTI"),
                QueryParam::from(12500.5),
            ],
        )
        .await
        .unwrap();
    assert_eq!(first.rows_affected, 1);
    assert_eq!(first.last_insert_id, Some(1));

    let second = executor
        .execute(
            "INSERT INTO equipamentos (nome, setor) VALUES (?, ?)",
            json!(["Desfibrilador", null]),
        )
        .await
        .unwrap();
    assert_eq!(second.last_insert_id, Some(2));

    let updated = executor
        .execute(
            "UPDATE equipamentos SET setor = ? WHERE setor IS NULL",
            vec![QueryParam::from("Emergência")],
        )
        .await
        .unwrap();
    assert_eq!(updated.rows_affected, 1);

    pool.close().await;
}

#[tokio::test]
async fn test_rows_are_normalized_to_json() {
    let (_dir, pool, executor) = setup().await;

    executor
        .execute(
            "INSERT INTO equipamentos (nome, setor, custo, foto) VALUES (?, ?, ?, X'DEADBEEF')",
            vec![
                QueryParam::from("Bomba de infusão"),
                QueryParam::Null,
                QueryParam::from(899.9),
            ],
        )
        .await
        .unwrap();

    let rows = executor
        .query(
            "SELECT id, nome, setor, custo, foto FROM equipamentos WHERE nome = ?",
            vec![QueryParam::from("Bomba de infusão")],
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    let columns: Vec<&str> = row.keys().map(String::as_str).collect();
    assert_eq!(columns, ["id", "nome", "setor", "custo", "foto"]);
    assert_eq!(row["id"], json!(1));
    assert_eq!(row["nome"], json!("Bomba de infusão"));
    assert_eq!(row["setor"], serde_json::Value::Null);
    assert_eq!(row["custo"], json!(899.9));
    assert_eq!(row["foto"], json!("3q2+7w=="));

    pool.close().await;
}

#[tokio::test]
async fn test_query_and_query_direct_agree() {
    let (_dir, pool, executor) = setup().await;

    for name in ["Autoclave", "Ventilador pulmonar", "Eletrocardiógrafo"] {
        executor
            .execute(
                "INSERT INTO equipamentos (nome) VALUES (?)",
                vec![QueryParam::from(name)],
            )
            .await
            .unwrap();
    }

    let sql = "SELECT nome FROM equipamentos WHERE id > ? ORDER BY id";
    let cached = executor.query(sql, vec![QueryParam::from(1)]).await.unwrap();
    let direct = executor
        .query_direct(sql, vec![QueryParam::from(1)])
        .await
        .unwrap();
    assert_eq!(cached, direct);
    assert_eq!(direct.len(), 2);

    pool.close().await;
}

#[tokio::test]
async fn test_failed_statement_carries_context() {
    let (_dir, pool, executor) = setup().await;

    let err = executor
        .query(
            "SELECT * FROM ordens_servico WHERE id = ?",
            vec![QueryParam::from(42)],
        )
        .await
        .unwrap_err();

    match &err {
        StoreError::Query { sql, params, .. } => {
            assert_eq!(sql, "SELECT * FROM ordens_servico WHERE id = ?");
            assert_eq!(params, &vec![QueryParam::Int(42)]);
        }
        other => panic!("expected Query error, got {:?}", other),
    }
    assert!(!err.is_retryable());

    let err = executor
        .execute("INSERT INTO equipamentos (setor) VALUES (?)", vec![QueryParam::from("UTI")])
        .await
        .unwrap_err();
    assert!(err.sql().is_some_and(|sql| sql.starts_with("INSERT INTO equipamentos")));

    // The connection went back to the pool despite the failures
    let rows = executor.query("SELECT id FROM equipamentos", ()).await.unwrap();
    assert!(rows.is_empty());

    pool.close().await;
}
