//! Query result models.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A result row: column name to normalized JSON value, in column order.
pub type Row = serde_json::Map<String, JsonValue>;

/// Metadata returned by a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// Id generated by the statement, when the store reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<u64>,
}
