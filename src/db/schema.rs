//! Table bootstrap.
//!
//! Creates the tables this layer depends on when they are missing. DDL is
//! dialect specific and kept in the `queries` submodule with one constant per
//! database type. Existing tables are never altered.

use crate::db::executor::{QueryExecutor, statement_error};
use crate::db::pool::PooledConnection;
use crate::error::{StoreError, StoreResult};
use crate::models::DatabaseType;
use tracing::{debug, info};

/// Default maintenance types as (name, description, category).
pub const DEFAULT_MAINTENANCE_TYPES: &[(&str, &str, &str)] = &[
    ("Preventiva", "Manutenção preventiva programada", "preventiva"),
    ("Corretiva", "Manutenção corretiva para reparo", "corretiva"),
    ("Preditiva", "Manutenção baseada em condição", "preditiva"),
    ("Calibração", "Calibração de equipamentos", "calibracao"),
    ("Instalação", "Instalação de novos equipamentos", "instalacao"),
    ("Desinstalação", "Remoção de equipamentos", "desinstalacao"),
    ("Consultoria", "Serviços de consultoria técnica", "consultoria"),
];

mod queries {
    pub mod mysql {
        pub const CREATE_COUNTERS: &str = r#"
            CREATE TABLE IF NOT EXISTS counters (
                entity_type VARCHAR(64) NOT NULL,
                year INT NOT NULL,
                counter BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (entity_type, year)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#;

        pub const CREATE_MAINTENANCE_TYPES: &str = r#"
            CREATE TABLE IF NOT EXISTS tipos_manutencao (
                id INT AUTO_INCREMENT PRIMARY KEY,
                nome VARCHAR(100) NOT NULL,
                descricao TEXT NULL,
                categoria VARCHAR(50) NULL,
                ativo TINYINT(1) NOT NULL DEFAULT 1,
                criado_em TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                atualizado_em TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                    ON UPDATE CURRENT_TIMESTAMP
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#;
    }

    pub mod sqlite {
        pub const CREATE_COUNTERS: &str = r#"
            CREATE TABLE IF NOT EXISTS counters (
                entity_type TEXT NOT NULL,
                year INTEGER NOT NULL,
                counter INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (entity_type, year)
            )
        "#;

        pub const CREATE_MAINTENANCE_TYPES: &str = r#"
            CREATE TABLE IF NOT EXISTS tipos_manutencao (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT NOT NULL,
                descricao TEXT,
                categoria TEXT,
                ativo INTEGER NOT NULL DEFAULT 1,
                criado_em TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                atualizado_em TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;
    }

    pub mod mysql_seed {
        pub const LOCK: &str = "SELECT id FROM tipos_manutencao LIMIT 1 FOR UPDATE";
    }

    pub mod sqlite_seed {
        // Takes the write lock before the emptiness check
        pub const LOCK: &str = "UPDATE tipos_manutencao SET id = id WHERE 0";
    }

    pub const ANY_MAINTENANCE_TYPE: &str = "SELECT id FROM tipos_manutencao LIMIT 1";

    pub const INSERT_MAINTENANCE_TYPE: &str =
        "INSERT INTO tipos_manutencao (nome, descricao, categoria) VALUES (?, ?, ?)";
}

fn create_statements(db_type: DatabaseType) -> [&'static str; 2] {
    match db_type {
        DatabaseType::MySQL => [
            queries::mysql::CREATE_COUNTERS,
            queries::mysql::CREATE_MAINTENANCE_TYPES,
        ],
        DatabaseType::SQLite => [
            queries::sqlite::CREATE_COUNTERS,
            queries::sqlite::CREATE_MAINTENANCE_TYPES,
        ],
    }
}

/// Create the counter and maintenance type tables when missing.
pub async fn ensure_schema(executor: &QueryExecutor) -> StoreResult<()> {
    let db_type = executor.pool().db_type();
    for ddl in create_statements(db_type) {
        debug!(db_type = %db_type, "Ensuring table");
        executor.query_direct(ddl, ()).await?;
    }
    info!(db_type = %db_type, "Schema ready");
    Ok(())
}

/// Insert the default maintenance types into an empty table.
///
/// The emptiness check and the inserts share one transaction, so concurrent
/// callers never seed twice. On MySQL a concurrent loser may fail with a
/// deadlock error instead of returning 0.
///
/// Returns the number of rows inserted (0 when the table already had rows).
pub async fn seed_maintenance_types(executor: &QueryExecutor) -> StoreResult<u64> {
    let pool = executor.pool();
    pool.ensure_server("seed_maintenance_types")?;

    let mut conn = pool.acquire().await?;
    let inserted = match &mut conn {
        PooledConnection::MySql(c) => mysql::seed(c).await?,
        PooledConnection::SQLite(c) => sqlite::seed(c).await?,
    };

    if inserted == 0 {
        debug!("Maintenance types already present");
    } else {
        info!(inserted, "Seeded maintenance types");
    }
    Ok(inserted)
}

fn seed_error(sql: &str, source: sqlx::Error) -> StoreError {
    statement_error("seed_maintenance_types", sql, &[], source)
}

mod mysql {
    use super::*;
    use sqlx::{Connection, MySqlConnection};

    pub async fn seed(conn: &mut MySqlConnection) -> StoreResult<u64> {
        let mut tx = conn.begin().await.map_err(|e| seed_error("BEGIN", e))?;

        let existing = sqlx::query(queries::mysql_seed::LOCK)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| seed_error(queries::mysql_seed::LOCK, e))?;
        if existing.is_some() {
            return Ok(0);
        }

        let mut inserted = 0;
        for (name, description, category) in DEFAULT_MAINTENANCE_TYPES {
            inserted += sqlx::query(queries::INSERT_MAINTENANCE_TYPE)
                .bind(*name)
                .bind(*description)
                .bind(*category)
                .execute(&mut *tx)
                .await
                .map_err(|e| seed_error(queries::INSERT_MAINTENANCE_TYPE, e))?
                .rows_affected();
        }

        tx.commit().await.map_err(|e| seed_error("COMMIT", e))?;
        Ok(inserted)
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Connection, SqliteConnection};

    pub async fn seed(conn: &mut SqliteConnection) -> StoreResult<u64> {
        let mut tx = conn.begin().await.map_err(|e| seed_error("BEGIN", e))?;

        sqlx::query(queries::sqlite_seed::LOCK)
            .execute(&mut *tx)
            .await
            .map_err(|e| seed_error(queries::sqlite_seed::LOCK, e))?;

        let existing = sqlx::query(queries::ANY_MAINTENANCE_TYPE)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| seed_error(queries::ANY_MAINTENANCE_TYPE, e))?;
        if existing.is_some() {
            return Ok(0);
        }

        let mut inserted = 0;
        for (name, description, category) in DEFAULT_MAINTENANCE_TYPES {
            inserted += sqlx::query(queries::INSERT_MAINTENANCE_TYPE)
                .bind(*name)
                .bind(*description)
                .bind(*category)
                .execute(&mut *tx)
                .await
                .map_err(|e| seed_error(queries::INSERT_MAINTENANCE_TYPE, e))?
                .rows_affected();
        }

        tx.commit().await.map_err(|e| seed_error("COMMIT", e))?;
        Ok(inserted)
    }
}
