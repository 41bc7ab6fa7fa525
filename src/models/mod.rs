//! Data models for the maintenance store.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod maintenance;
pub mod query;

// Re-export commonly used types
pub use connection::{DatabaseType, ExecutionContext, StoreConfig};
pub use maintenance::{MaintenanceType, UpdateMaintenanceType};
pub use query::{ExecuteResult, Row};
