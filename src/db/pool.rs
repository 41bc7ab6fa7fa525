//! Connection pool management.
//!
//! [`ConnectionPool`] is the single shared handle to the store. It is built
//! explicitly by the composition root, cloned into every component that needs
//! store access and closed explicitly at shutdown. Internally it wraps a
//! database-specific sqlx pool (`MySqlPool` or `SqlitePool`) and adds the
//! policies sqlx does not provide itself: reject-when-exhausted, a bound on
//! queued acquirers, a cap on idle connections and lifecycle events.

use crate::db::events::{PoolEvent, PoolEvents};
use crate::error::{StoreError, StoreResult};
use crate::models::{DatabaseType, ExecutionContext, StoreConfig};
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteJournalMode;
use sqlx::{
    Connection, MySql, MySqlPool, Sqlite, SqlitePool, mysql::MySqlConnectOptions,
    mysql::MySqlPoolOptions, sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Database-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Number of open connections, idle or in use.
    pub fn size(&self) -> u32 {
        match self {
            DbPool::MySql(pool) => pool.size(),
            DbPool::SQLite(pool) => pool.size(),
        }
    }

    /// Number of idle connections.
    pub fn num_idle(&self) -> usize {
        match self {
            DbPool::MySql(pool) => pool.num_idle(),
            DbPool::SQLite(pool) => pool.num_idle(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::SQLite(pool) => pool.is_closed(),
        }
    }

    async fn acquire(&self) -> Result<PooledConnection, sqlx::Error> {
        match self {
            DbPool::MySql(pool) => pool.acquire().await.map(PooledConnection::MySql),
            DbPool::SQLite(pool) => pool.acquire().await.map(PooledConnection::SQLite),
        }
    }

    /// Take an idle connection without waiting or opening a new one.
    fn try_acquire_idle(&self) -> Option<PooledConnection> {
        match self {
            DbPool::MySql(pool) => pool.try_acquire().map(PooledConnection::MySql),
            DbPool::SQLite(pool) => pool.try_acquire().map(PooledConnection::SQLite),
        }
    }
}

/// A connection checked out of the pool.
///
/// Dropping the value returns the connection to the pool, so every exit path
/// (including `?` and panics) releases it.
#[derive(Debug)]
pub enum PooledConnection {
    MySql(PoolConnection<MySql>),
    SQLite(PoolConnection<Sqlite>),
}

impl PooledConnection {
    /// Check that the connection is still alive.
    pub async fn ping(&mut self) -> Result<(), sqlx::Error> {
        match self {
            PooledConnection::MySql(conn) => conn.ping().await,
            PooledConnection::SQLite(conn) => conn.ping().await,
        }
    }

    /// Close the physical connection instead of returning it to the pool.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        match self {
            PooledConnection::MySql(conn) => conn.close().await,
            PooledConnection::SQLite(conn) => conn.close().await,
        }
    }
}

/// Pool usage classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageLevel {
    /// Below 50%
    Low,
    /// 50% to 75%
    Medium,
    /// 75% to 90%
    High,
    /// 90% and above
    Critical,
}

impl UsageLevel {
    pub fn from_percent(percent: f64) -> Self {
        if percent < 50.0 {
            Self::Low
        } else if percent < 75.0 {
            Self::Medium
        } else if percent < 90.0 {
            Self::High
        } else {
            Self::Critical
        }
    }
}

impl std::fmt::Display for UsageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Point-in-time pool usage.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub db_type: DatabaseType,
    /// Open connections (idle + in use)
    pub size: u32,
    pub idle: usize,
    pub in_use: u32,
    pub max_connections: u32,
    /// Callers queued for a connection while the pool is at capacity
    pub waiting: usize,
    pub connections_created: u64,
    pub usage_percent: f64,
    pub usage_level: UsageLevel,
}

impl PoolStatus {
    fn compute(
        db_type: DatabaseType,
        size: u32,
        idle: usize,
        max_connections: u32,
        waiting: usize,
        connections_created: u64,
    ) -> Self {
        let in_use = size.saturating_sub(idle as u32);
        let usage_percent = if max_connections == 0 {
            100.0
        } else {
            f64::from(in_use) / f64::from(max_connections) * 100.0
        };
        Self {
            db_type,
            size,
            idle,
            in_use,
            max_connections,
            waiting,
            connections_created,
            usage_percent,
            usage_level: UsageLevel::from_percent(usage_percent),
        }
    }
}

struct PoolInner {
    pool: DbPool,
    config: StoreConfig,
    events: PoolEvents,
    /// Callers queued in `acquire` while the pool is at capacity.
    waiters: AtomicUsize,
    /// Idle reaper task. std Mutex so Drop can abort it synchronously.
    reaper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PoolInner {
    /// Close idle connections beyond `max_idle`, never dropping below `min_connections`.
    async fn reap_idle(&self) {
        let opts = &self.config.pool_options;
        let max_idle = opts.max_idle_or_default() as usize;
        let min_connections = opts.min_connections_or_default();

        while self.pool.num_idle() > max_idle && self.pool.size() > min_connections {
            let Some(conn) = self.pool.try_acquire_idle() else {
                break;
            };
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Failed to close idle connection");
                break;
            }
            let idle = self.pool.num_idle();
            debug!(idle, max_idle, "Closed surplus idle connection");
            self.events.emit(PoolEvent::IdleReaped { idle });
        }
    }

    fn abort_reaper(&self) {
        if let Ok(mut guard) = self.reaper.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.abort_reaper();
    }
}

/// Decrements the waiter count when an acquire finishes, whichever way.
struct WaiterGuard<'a>(&'a AtomicUsize);

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Shared, cloneable handle to the bounded store connection pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("pool", &self.inner.pool)
            .field("target", &self.inner.config.masked_connection_string())
            .field("waiters", &self.inner.waiters.load(Ordering::Relaxed))
            .finish()
    }
}

impl ConnectionPool {
    /// Build the pool without opening any connection.
    ///
    /// Connections are opened on first acquire. Must be called from within a
    /// tokio runtime.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        config
            .pool_options
            .validate()
            .map_err(StoreError::configuration)?;

        let events = PoolEvents::new();
        let pool = Self::create_pool(&config, &events)?;

        let acquire_timeout = config.pool_options.acquire_timeout_or_default();
        info!(
            target_db = %config.masked_connection_string(),
            db_type = %config.db_type,
            max_connections = config.pool_options.max_connections_or_default(),
            acquire_timeout_ms = acquire_timeout.as_millis() as u64,
            "Connection pool created"
        );

        let inner = Arc::new(PoolInner {
            pool,
            config,
            events,
            waiters: AtomicUsize::new(0),
            reaper: std::sync::Mutex::new(None),
        });

        let handle = Self::spawn_idle_reaper(&inner);
        if let Ok(mut guard) = inner.reaper.lock() {
            *guard = handle;
        }

        Ok(Self { inner })
    }

    /// Build the pool and verify the store is reachable.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        let pool = Self::new(config)?;
        if let Err(e) = pool.ping().await {
            pool.close().await;
            return Err(match e {
                StoreError::Connection { .. } | StoreError::Environment { .. } => e,
                other => StoreError::connection(
                    format!("Failed to connect: {}", other),
                    pool.connection_suggestion(&other.to_string()),
                ),
            });
        }
        info!("Store reachable");
        Ok(pool)
    }

    /// Check out a connection.
    ///
    /// Waits at most the configured acquire timeout. Under the reject policy
    /// (`wait_for_connections = false`) or with a full wait queue it fails
    /// immediately with [`StoreError::PoolExhausted`].
    pub async fn acquire(&self) -> StoreResult<PooledConnection> {
        self.ensure_server("acquire")?;
        let inner = &self.inner;
        if inner.pool.is_closed() {
            return Err(StoreError::connection(
                "Connection pool is closed",
                "Create a new pool",
            ));
        }

        let opts = &inner.config.pool_options;
        let max = opts.max_connections_or_default();

        if !opts.wait_for_connections_or_default() {
            let in_use = inner.pool.size().saturating_sub(inner.pool.num_idle() as u32);
            if in_use >= max {
                inner.events.emit(PoolEvent::Exhausted { waited_ms: 0 });
                return Err(StoreError::pool_exhausted(
                    0,
                    format!("all {} connections in use", max),
                ));
            }
        }

        // Only callers that find the pool at capacity queue behind it
        let at_capacity = inner.pool.size() >= max && inner.pool.num_idle() == 0;
        let _waiter = if at_capacity {
            let queue_limit = opts.queue_limit_or_default() as usize;
            let previous = inner.waiters.fetch_add(1, Ordering::AcqRel);
            let waiter = WaiterGuard(&inner.waiters);
            if queue_limit > 0 && previous >= queue_limit {
                inner.events.emit(PoolEvent::Exhausted { waited_ms: 0 });
                return Err(StoreError::pool_exhausted(
                    0,
                    format!("wait queue full ({} waiting)", previous),
                ));
            }
            Some(waiter)
        } else {
            None
        };

        let start = Instant::now();
        match inner.pool.acquire().await {
            Ok(conn) => {
                let in_use = inner.pool.size().saturating_sub(inner.pool.num_idle() as u32);
                inner.events.emit(PoolEvent::Acquired { in_use, max });
                Ok(conn)
            }
            Err(sqlx::Error::PoolTimedOut) => {
                let waited_ms = start.elapsed().as_millis() as u64;
                warn!(waited_ms, max_connections = max, "Timed out waiting for a connection");
                inner.events.emit(PoolEvent::Exhausted { waited_ms });
                Err(StoreError::pool_exhausted(
                    waited_ms,
                    format!("all {} connections in use", max),
                ))
            }
            Err(e) => {
                inner.events.connection_errored(e.to_string());
                Err(match StoreError::from(e) {
                    StoreError::Query { source, .. } => StoreError::connection(
                        format!("Failed to open connection: {}", source),
                        self.connection_suggestion(&source.to_string()),
                    ),
                    other => other,
                })
            }
        }
    }

    /// Acquire a connection and ping it.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.acquire().await?;
        conn.ping().await.map_err(|e| {
            self.inner.events.connection_errored(e.to_string());
            StoreError::connection(
                format!("Ping failed: {}", e),
                self.connection_suggestion(&e.to_string()),
            )
        })
    }

    /// Current usage of the pool.
    pub fn status(&self) -> StoreResult<PoolStatus> {
        self.ensure_server("status")?;
        let inner = &self.inner;
        Ok(PoolStatus::compute(
            inner.pool.db_type(),
            inner.pool.size(),
            inner.pool.num_idle(),
            inner.config.pool_options.max_connections_or_default(),
            inner.waiters.load(Ordering::Acquire),
            inner.events.connections_created(),
        ))
    }

    /// Subscribe to pool lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }

    /// Close every connection and stop background work. Later acquires fail.
    ///
    /// Waits until checked-out connections have been dropped.
    pub async fn close(&self) {
        self.inner.abort_reaper();
        self.inner.pool.close().await;
        self.inner.events.emit(PoolEvent::Closed);
        info!("Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }

    pub fn db_type(&self) -> DatabaseType {
        self.inner.pool.db_type()
    }

    pub fn context(&self) -> ExecutionContext {
        self.inner.config.context
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Fail with an environment error when this handle belongs to a client context.
    pub fn ensure_server(&self, operation: &str) -> StoreResult<()> {
        self.inner.config.context.ensure_server(operation)
    }

    fn spawn_idle_reaper(inner: &Arc<PoolInner>) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let idle_timeout = inner.config.pool_options.idle_timeout_or_default();
        let period = (idle_timeout / 2).max(MIN_REAP_INTERVAL);
        // Weak reference so the task never keeps the pool alive
        let weak: Weak<PoolInner> = Arc::downgrade(inner);

        Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.pool.is_closed() {
                    break;
                }
                inner.reap_idle().await;
            }
        }))
    }

    /// Create the database-specific pool for the given configuration.
    fn create_pool(config: &StoreConfig, events: &PoolEvents) -> StoreResult<DbPool> {
        let opts = &config.pool_options;
        let idle_timeout = Some(opts.idle_timeout_or_default());

        match config.db_type {
            DatabaseType::MySQL => {
                // sqlx already sets the session time zone to +00:00
                let options = MySqlConnectOptions::from_str(&config.connection_string)
                    .map_err(|e| {
                        StoreError::configuration(format!(
                            "Invalid MySQL connection string: {}",
                            e
                        ))
                    })?
                    .charset("utf8mb4");

                let events = events.clone();
                let pool = MySqlPoolOptions::new()
                    .min_connections(opts.min_connections_or_default())
                    .max_connections(opts.max_connections_or_default())
                    .acquire_timeout(opts.acquire_timeout_or_default())
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(opts.test_before_acquire_or_default())
                    .after_connect(move |_conn, _meta| {
                        let events = events.clone();
                        Box::pin(async move {
                            events.connection_created();
                            Ok(())
                        })
                    })
                    .connect_lazy_with(options);
                Ok(DbPool::MySql(pool))
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(&config.connection_string)
                    .map_err(|e| {
                        StoreError::configuration(format!(
                            "Invalid SQLite connection string: {}",
                            e
                        ))
                    })?
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(SQLITE_BUSY_TIMEOUT);

                let events = events.clone();
                let pool = SqlitePoolOptions::new()
                    .min_connections(opts.min_connections_or_default())
                    .max_connections(opts.max_connections_or_default())
                    .acquire_timeout(opts.acquire_timeout_or_default())
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(opts.test_before_acquire_or_default())
                    .after_connect(move |_conn, _meta| {
                        let events = events.clone();
                        Box::pin(async move {
                            events.connection_created();
                            Ok(())
                        })
                    })
                    .connect_lazy_with(options);
                Ok(DbPool::SQLite(pool))
            }
        }
    }

    /// Generate a helpful suggestion for connection errors.
    fn connection_suggestion(&self, error: &str) -> String {
        let error_str = error.to_lowercase();

        if error_str.contains("connection refused") {
            return format!(
                "Check that the {} server is running and accessible",
                self.db_type()
            );
        }

        if error_str.contains("access denied") || error_str.contains("password") {
            return "Verify DB_USER and DB_PASSWORD".to_string();
        }

        if error_str.contains("unknown database") {
            return "Check that DB_NAME exists".to_string();
        }

        if error_str.contains("unable to open database file") {
            return "Check that the SQLite file's directory exists and is writable".to_string();
        }

        match self.db_type() {
            DatabaseType::MySQL => "Verify DB_HOST and DB_PORT".to_string(),
            DatabaseType::SQLite => {
                "Verify the file path is accessible: sqlite:path/to/db.sqlite".to_string()
            }
        }
    }
}
