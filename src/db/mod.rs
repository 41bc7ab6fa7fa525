//! Database abstraction layer.
//!
//! This module provides store access:
//! - Connection pool management and pool events
//! - Statement execution with parameter normalization
//! - Row normalization into JSON
//! - Table bootstrap

pub mod events;
pub mod executor;
pub mod params;
pub mod pool;
pub mod schema;
pub mod types;

pub use events::{PoolEvent, PoolEvents};
pub use executor::QueryExecutor;
pub use params::{Params, QueryParam};
pub use pool::{ConnectionPool, DbPool, PoolStatus, PooledConnection, UsageLevel};
pub use schema::{ensure_schema, seed_maintenance_types};
