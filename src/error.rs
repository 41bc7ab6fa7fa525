//! Error types for the maintenance store.
//!
//! Every failure in this layer is wrapped with diagnostic context and handed
//! back to the caller. Nothing here retries or recovers on its own.

use crate::db::params::QueryParam;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Unsafe or missing startup configuration. Fatal.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Pool exhausted: no connection available after {waited_ms}ms ({reason})")]
    PoolExhausted { waited_ms: u64, reason: String },

    #[error("Query failed: {source} (sql: {sql})")]
    Query {
        sql: String,
        params: Vec<QueryParam>,
        #[source]
        source: sqlx::Error,
    },

    /// Store access attempted from a client execution context.
    #[error("Store operations are not allowed in a client context: {operation}")]
    Environment { operation: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl StoreError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a pool exhausted error.
    pub fn pool_exhausted(waited_ms: u64, reason: impl Into<String>) -> Self {
        Self::PoolExhausted {
            waited_ms,
            reason: reason.into(),
        }
    }

    /// Wrap a failed statement together with the SQL and parameters that produced it.
    pub fn query(sql: impl Into<String>, params: &[QueryParam], source: sqlx::Error) -> Self {
        Self::Query {
            sql: sql.into(),
            params: params.to_vec(),
            source,
        }
    }

    /// Create an environment error.
    pub fn environment(operation: impl Into<String>) -> Self {
        Self::Environment {
            operation: operation.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => Some("Retry with backoff or raise max_connections"),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::PoolExhausted { .. })
    }

    /// SQL text of a failed statement.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Parameters of a failed statement.
    pub fn params(&self) -> Option<&[QueryParam]> {
        match self {
            Self::Query { params, .. } => Some(params),
            _ => None,
        }
    }
}

/// Convert sqlx errors raised outside a statement (pool, handshake) to StoreError.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                StoreError::pool_exhausted(0, "timed out waiting for a free connection")
            }
            sqlx::Error::PoolClosed => {
                StoreError::connection("Connection pool is closed", "Create a new pool")
            }
            sqlx::Error::Configuration(msg) => StoreError::connection(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Io(io_err) => StoreError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => StoreError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => StoreError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            other => StoreError::query("", &[], other),
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(StoreError::pool_exhausted(100, "timeout").is_retryable());
        assert!(StoreError::connection("err", "sugg").is_retryable());
        assert!(!StoreError::configuration("bad").is_retryable());
        assert!(!StoreError::environment("query").is_retryable());
    }

    #[test]
    fn test_query_error_keeps_statement_context() {
        let params = vec![QueryParam::from("equipment"), QueryParam::from(2025)];
        let err = StoreError::query(
            "SELECT counter FROM counters WHERE entity_type = ? AND year = ?",
            &params,
            sqlx::Error::RowNotFound,
        );
        assert_eq!(
            err.sql(),
            Some("SELECT counter FROM counters WHERE entity_type = ? AND year = ?")
        );
        assert_eq!(err.params().map(<[QueryParam]>::len), Some(2));
        assert!(err.to_string().contains("counters"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_pool_timeout_maps_to_exhausted() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::PoolExhausted { .. }));
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: StoreError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, StoreError::Connection { .. }));
        assert_eq!(err.suggestion(), Some("Create a new pool"));
    }
}
