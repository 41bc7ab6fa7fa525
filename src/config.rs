//! Configuration handling for the maintenance store.
//!
//! This module provides configuration management via CLI arguments and environment variables.
//! The parsed [`Config`] is converted once at startup into the explicit library types
//! [`StoreConfig`] and [`PoolOptions`].

use crate::error::StoreResult;
use crate::models::{ExecutionContext, StoreConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 3306;
pub const DEFAULT_DB_USER: &str = "root";
pub const DEFAULT_DB_NAME: &str = "hospital_maintenance";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_MAX_IDLE: u32 = 2;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;
/// 0 means waiters are not limited
pub const DEFAULT_QUEUE_LIMIT: u32 = 0;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 5)
    pub max_connections: Option<u32>,
    /// Connections kept open even when idle (default: 0)
    pub min_connections: Option<u32>,
    /// Idle connections beyond this count are closed by the reaper (default: 2)
    pub max_idle: Option<u32>,
    /// Connection acquire timeout in milliseconds (default: 10000)
    pub acquire_timeout_ms: Option<u64>,
    /// Idle timeout in seconds (default: 30)
    pub idle_timeout_secs: Option<u64>,
    /// Maximum number of callers waiting for a connection, 0 = unbounded (default: 0)
    pub queue_limit: Option<u32>,
    /// Wait for a free connection instead of failing immediately (default: true)
    pub wait_for_connections: Option<bool>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value.
    pub fn max_connections_or_default(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get max_idle with default value.
    pub fn max_idle_or_default(&self) -> u32 {
        self.max_idle.unwrap_or(DEFAULT_MAX_IDLE)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_millis(
            self.acquire_timeout_ms
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS),
        )
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    /// Get queue_limit with default value.
    pub fn queue_limit_or_default(&self) -> u32 {
        self.queue_limit.unwrap_or(DEFAULT_QUEUE_LIMIT)
    }

    /// Get wait_for_connections with default value.
    pub fn wait_for_connections_or_default(&self) -> bool {
        self.wait_for_connections.unwrap_or(true)
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        let max = self.max_connections_or_default();
        if max == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }
        let min = self.min_connections_or_default();
        if min > max {
            return Err(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                min, max
            ));
        }
        if self.acquire_timeout_ms == Some(0) {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Commands run by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the data location guard and verify the store is reachable
    Check,
    /// Create the counter and maintenance type tables when missing
    InitSchema,
    /// Print the next sequence number for an entity type
    NextNumber {
        /// Entity type, e.g. service_orders, equipment, companies
        entity_type: String,
    },
    /// Print connection pool usage
    Status,
}

/// Configuration for the maintenance store binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "maintenance-store",
    about = "Store layer for hospital equipment maintenance tracking",
    version,
    author
)]
pub struct Config {
    /// Full connection URL; overrides the DB_HOST/DB_USER/... settings.
    /// Accepts mysql:// and sqlite: URLs.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, default_value = DEFAULT_DB_HOST, env = "DB_HOST")]
    pub db_host: String,

    #[arg(long, default_value_t = DEFAULT_DB_PORT, env = "DB_PORT")]
    pub db_port: u16,

    #[arg(long, default_value = DEFAULT_DB_USER, env = "DB_USER")]
    pub db_user: String,

    #[arg(long, default_value = "", env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: String,

    #[arg(long, default_value = DEFAULT_DB_NAME, env = "DB_NAME")]
    pub db_name: String,

    /// External data directory. Must not live inside the application directory.
    #[arg(long, env = "DB_DATA_PATH")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS, env = "DB_MAX_CONNECTIONS")]
    pub max_connections: u32,

    #[arg(long, default_value_t = DEFAULT_MIN_CONNECTIONS, env = "DB_MIN_CONNECTIONS")]
    pub min_connections: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_IDLE, env = "DB_MAX_IDLE")]
    pub max_idle: u32,

    /// Connection acquire timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_ACQUIRE_TIMEOUT_MS, env = "DB_ACQUIRE_TIMEOUT")]
    pub acquire_timeout_ms: u64,

    /// Idle connection timeout in seconds
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_SECS, env = "DB_IDLE_TIMEOUT")]
    pub idle_timeout_secs: u64,

    /// Maximum queued acquirers (0 = unbounded)
    #[arg(long, default_value_t = DEFAULT_QUEUE_LIMIT, env = "DB_QUEUE_LIMIT")]
    pub queue_limit: u32,

    /// Wait for a free connection when the pool is exhausted; `false` fails immediately
    #[arg(
        long,
        default_value_t = true,
        env = "DB_WAIT_FOR_CONNECTIONS",
        action = clap::ArgAction::Set
    )]
    pub wait_for_connections: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "LOG_JSON")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Pool options assembled from the parsed flags.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: Some(self.max_connections),
            min_connections: Some(self.min_connections),
            max_idle: Some(self.max_idle),
            acquire_timeout_ms: Some(self.acquire_timeout_ms),
            idle_timeout_secs: Some(self.idle_timeout_secs),
            queue_limit: Some(self.queue_limit),
            wait_for_connections: Some(self.wait_for_connections),
            test_before_acquire: Some(true),
        }
    }

    /// Build and validate the store configuration.
    pub fn store_config(&self) -> StoreResult<StoreConfig> {
        let pool_options = self.pool_options();
        let config = match &self.database_url {
            Some(url) => StoreConfig::new(url.clone(), pool_options)?,
            None => StoreConfig::mysql(
                &self.db_host,
                self.db_port,
                &self.db_user,
                &self.db_password,
                &self.db_name,
                pool_options,
            )?,
        };

        let config = config.with_context(ExecutionContext::detect());
        Ok(match &self.data_dir {
            Some(dir) => config.with_data_dir(dir.clone()),
            None => config,
        })
    }
}
