//! Maintenance Store Library
//!
//! Connection-pooled store access for hospital equipment maintenance tracking:
//! a bounded connection pool, a statement executor, sequential document
//! numbers (`OS-001-2025`, `EQ-07/2025`, ...) and a startup check that keeps
//! the data directory out of the application tree. Works against MySQL/MariaDB
//! and SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod maintenance;
pub mod models;
pub mod sequence;

pub use config::{Config, PoolOptions};
pub use db::{ConnectionPool, Params, QueryExecutor, QueryParam};
pub use error::{StoreError, StoreResult};
pub use guard::LocationGuard;
pub use maintenance::MaintenanceTypeRepository;
pub use models::{ExecuteResult, ExecutionContext, Row, StoreConfig};
pub use sequence::{EntityType, SequenceGenerator};
