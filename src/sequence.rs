//! Sequential, human-readable document numbers.
//!
//! Each `(entity_type, year)` pair owns one row in the `counters` table. A new
//! number is produced by seeding the row if needed, incrementing it with a
//! single store-side `UPDATE` and reading the result back. The three steps run
//! in one transaction on one connection, so concurrent callers never observe
//! each other's increments and every caller gets a distinct value.

use crate::db::executor::{QueryExecutor, statement_error};
use crate::db::params::QueryParam;
use crate::db::pool::PooledConnection;
use crate::error::{StoreError, StoreResult};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::convert::Infallible;
use std::str::FromStr;
use tracing::{debug, info};

/// What a sequence number is issued for. Decides the output format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    /// `OS-001-2025`
    ServiceOrders,
    /// `EQ-01/2025`
    Equipment,
    /// `EMP-01/2025`
    Companies,
    /// `01/2025`
    Other(String),
}

impl EntityType {
    /// Key stored in `counters.entity_type`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServiceOrders => "service_orders",
            Self::Equipment => "equipment",
            Self::Companies => "companies",
            Self::Other(name) => name,
        }
    }

    /// Render a counter value for the given year.
    pub fn format(&self, counter: i64, year: i32) -> String {
        match self {
            Self::ServiceOrders => format!("OS-{:03}-{}", counter, year),
            Self::Equipment => format!("EQ-{:02}/{}", counter, year),
            Self::Companies => format!("EMP-{:02}/{}", counter, year),
            Self::Other(_) => format!("{:02}/{}", counter, year),
        }
    }
}

impl FromStr for EntityType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        match s {
            "service_orders" => Self::ServiceOrders,
            "equipment" => Self::Equipment,
            "companies" => Self::Companies,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "service_orders" | "equipment" | "companies" => Self::from(s.as_str()),
            _ => Self::Other(s),
        }
    }
}

impl From<EntityType> for String {
    fn from(entity: EntityType) -> Self {
        entity.as_str().to_string()
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Year used for new numbers: the current calendar year in local time.
pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

mod queries {
    pub const INCREMENT: &str =
        "UPDATE counters SET counter = counter + 1 WHERE entity_type = ? AND year = ?";
    pub const SELECT: &str = "SELECT counter FROM counters WHERE entity_type = ? AND year = ?";

    pub mod mysql {
        // Takes an exclusive lock on conflict, unlike INSERT IGNORE
        pub const SEED: &str = "INSERT INTO counters (entity_type, year, counter) VALUES (?, ?, 0) \
             ON DUPLICATE KEY UPDATE counter = counter";
    }

    pub mod sqlite {
        pub const SEED: &str = "INSERT INTO counters (entity_type, year, counter) VALUES (?, ?, 0) \
             ON CONFLICT(entity_type, year) DO NOTHING";
    }
}

/// Issues sequence numbers from the `counters` table.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    executor: QueryExecutor,
}

impl SequenceGenerator {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    /// Next formatted number for `entity_type` in the current year.
    pub async fn next_number(&self, entity_type: impl Into<EntityType>) -> StoreResult<String> {
        self.next_number_for_year(entity_type, current_year()).await
    }

    /// Next formatted number for `entity_type` in an explicit year.
    pub async fn next_number_for_year(
        &self,
        entity_type: impl Into<EntityType>,
        year: i32,
    ) -> StoreResult<String> {
        let entity_type = entity_type.into();
        let counter = self.increment(&entity_type, year).await?;
        let number = entity_type.format(counter, year);
        info!(
            entity_type = %entity_type,
            year,
            counter,
            number = %number,
            "Issued sequence number"
        );
        Ok(number)
    }

    /// Stored counter value without incrementing. `None` before the first number.
    pub async fn current_counter(
        &self,
        entity_type: impl Into<EntityType>,
        year: i32,
    ) -> StoreResult<Option<i64>> {
        let entity_type = entity_type.into();
        let rows = self
            .executor
            .query(
                queries::SELECT,
                vec![QueryParam::from(entity_type.as_str()), QueryParam::from(year)],
            )
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("counter"))
            .and_then(JsonValue::as_i64))
    }

    /// Seed, increment and read back in a single transaction.
    async fn increment(&self, entity_type: &EntityType, year: i32) -> StoreResult<i64> {
        let pool = self.executor.pool();
        pool.ensure_server("next_number")?;

        let mut conn = pool.acquire().await?;
        let key = entity_type.as_str();
        debug!(entity_type = key, year, "Incrementing counter");

        match &mut conn {
            PooledConnection::MySql(c) => mysql::increment(c, key, year).await,
            PooledConnection::SQLite(c) => sqlite::increment(c, key, year).await,
        }
    }
}

fn step_error(sql: &str, key: &str, year: i32, source: sqlx::Error) -> StoreError {
    let params = [QueryParam::from(key), QueryParam::from(year)];
    statement_error("next_number", sql, &params, source)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod mysql {
    use super::*;
    use sqlx::{Connection, MySqlConnection};

    pub async fn increment(conn: &mut MySqlConnection, key: &str, year: i32) -> StoreResult<i64> {
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| step_error("BEGIN", key, year, e))?;

        sqlx::query(queries::mysql::SEED)
            .bind(key)
            .bind(year)
            .execute(&mut *tx)
            .await
            .map_err(|e| step_error(queries::mysql::SEED, key, year, e))?;

        sqlx::query(queries::INCREMENT)
            .bind(key)
            .bind(year)
            .execute(&mut *tx)
            .await
            .map_err(|e| step_error(queries::INCREMENT, key, year, e))?;

        let counter: i64 = sqlx::query_scalar(queries::SELECT)
            .bind(key)
            .bind(year)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| step_error(queries::SELECT, key, year, e))?;

        tx.commit()
            .await
            .map_err(|e| step_error("COMMIT", key, year, e))?;
        Ok(counter)
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Connection, SqliteConnection};

    pub async fn increment(conn: &mut SqliteConnection, key: &str, year: i32) -> StoreResult<i64> {
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| step_error("BEGIN", key, year, e))?;

        // Write first so the transaction holds the write lock before it reads
        sqlx::query(queries::sqlite::SEED)
            .bind(key)
            .bind(year)
            .execute(&mut *tx)
            .await
            .map_err(|e| step_error(queries::sqlite::SEED, key, year, e))?;

        sqlx::query(queries::INCREMENT)
            .bind(key)
            .bind(year)
            .execute(&mut *tx)
            .await
            .map_err(|e| step_error(queries::INCREMENT, key, year, e))?;

        let counter: i64 = sqlx::query_scalar(queries::SELECT)
            .bind(key)
            .bind(year)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| step_error(queries::SELECT, key, year, e))?;

        tx.commit()
            .await
            .map_err(|e| step_error("COMMIT", key, year, e))?;
        Ok(counter)
    }
}
