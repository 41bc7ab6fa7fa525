//! Statement execution over the shared pool.
//!
//! Three entry points, all of which check out exactly one connection for the
//! duration of the statement:
//! - [`QueryExecutor::query`]: unprepared (no persistent statement)
//! - [`QueryExecutor::execute`]: prepared and cached, returns write metadata
//! - [`QueryExecutor::query_direct`]: unprepared, for statements that must not
//!   go through the statement cache
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific statement execution
//! - `sqlite`: SQLite-specific statement execution
//!
//! Each submodule provides identical functionality adapted to the database's type system.

use crate::db::params::{Params, QueryParam};
use crate::db::pool::{ConnectionPool, PooledConnection};
use crate::db::types::RowToJson;
use crate::error::{StoreError, StoreResult};
use crate::models::{ExecuteResult, Row};
use std::time::Instant;
use tracing::{debug, error};

/// Executes statements against a [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    pool: ConnectionPool,
}

impl QueryExecutor {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run a statement without a persistent prepared statement and return its rows.
    ///
    /// With no parameters the SQL is sent as plain text.
    pub async fn query(&self, sql: &str, params: impl Into<Params>) -> StoreResult<Vec<Row>> {
        let params = params.into();
        self.run_unprepared("query", sql, params.as_slice()).await
    }

    /// Same contract as [`query`](Self::query), for call sites that must bypass
    /// the statement cache.
    pub async fn query_direct(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> StoreResult<Vec<Row>> {
        let params = params.into();
        self.run_unprepared("query_direct", sql, params.as_slice()).await
    }

    /// Run a write statement as a cached prepared statement.
    pub async fn execute(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> StoreResult<ExecuteResult> {
        let params = params.into();
        let params = params.as_slice();
        self.pool.ensure_server("execute")?;

        let start = Instant::now();
        debug!(sql = %sql, params = params.len(), "Executing statement");

        let mut conn = self.pool.acquire().await?;
        let result = match &mut conn {
            PooledConnection::MySql(c) => mysql::execute(c, sql, params).await,
            PooledConnection::SQLite(c) => sqlite::execute(c, sql, params).await,
        };
        drop(conn);

        match result {
            Ok(result) => {
                debug!(
                    rows_affected = result.rows_affected,
                    last_insert_id = ?result.last_insert_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Statement executed"
                );
                Ok(result)
            }
            Err(e) => Err(statement_error("execute", sql, params, e)),
        }
    }

    async fn run_unprepared(
        &self,
        operation: &str,
        sql: &str,
        params: &[QueryParam],
    ) -> StoreResult<Vec<Row>> {
        self.pool.ensure_server(operation)?;

        let start = Instant::now();
        debug!(sql = %sql, params = params.len(), operation, "Executing query");

        let mut conn = self.pool.acquire().await?;
        let result = match &mut conn {
            PooledConnection::MySql(c) => mysql::fetch_unprepared(c, sql, params).await,
            PooledConnection::SQLite(c) => sqlite::fetch_unprepared(c, sql, params).await,
        };
        drop(conn);

        match result {
            Ok(rows) => {
                debug!(
                    rows = rows.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query completed"
                );
                Ok(rows)
            }
            Err(e) => Err(statement_error(operation, sql, params, e)),
        }
    }
}

/// Log a failed statement and wrap it with its SQL and parameters.
pub(crate) fn statement_error(
    operation: &str,
    sql: &str,
    params: &[QueryParam],
    source: sqlx::Error,
) -> StoreError {
    error!(
        operation,
        sql = %sql,
        params = ?params,
        error = %source,
        "Statement failed"
    );
    StoreError::query(sql, params, source)
}

fn to_rows<R: RowToJson>(rows: Vec<R>) -> Vec<Row> {
    rows.iter().map(RowToJson::to_json_map).collect()
}

/// Nonzero insert ids only; zero means the statement generated none.
fn insert_id(id: u64) -> Option<u64> {
    (id != 0).then_some(id)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::{Executor, MySqlConnection};

    pub async fn fetch_unprepared(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Row>, sqlx::Error> {
        // Plain text protocol when there is nothing to bind
        let rows = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            let mut query = sqlx::query(sql).persistent(false);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.fetch_all(&mut *conn).await?
        };
        Ok(to_rows(rows))
    }

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<ExecuteResult, sqlx::Error> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        let result = query.execute(&mut *conn).await?;
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: insert_id(result.last_insert_id()),
        })
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::{Executor, SqliteConnection};

    pub async fn fetch_unprepared(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Row>, sqlx::Error> {
        let rows = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            let mut query = sqlx::query(sql).persistent(false);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.fetch_all(&mut *conn).await?
        };
        Ok(to_rows(rows))
    }

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<ExecuteResult, sqlx::Error> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        let result = query.execute(&mut *conn).await?;
        let rowid = u64::try_from(result.last_insert_rowid()).unwrap_or(0);
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: insert_id(rowid),
        })
    }
}
