//! Maintenance type lookup records.
//!
//! Rows live in the `tipos_manutencao` table; the API shape uses English
//! field names.

use crate::error::{StoreError, StoreResult};
use crate::models::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A maintenance type (preventive, corrective, calibration, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceType {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub category: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl MaintenanceType {
    /// Build a record from a normalized row selected with English aliases.
    pub fn from_row(row: &Row) -> StoreResult<Self> {
        let id = row
            .get("id")
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| StoreError::invalid_input("maintenance type row has no id"))?;
        let name = row
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| StoreError::invalid_input("maintenance type row has no name"))?
            .to_string();

        Ok(Self {
            id,
            name,
            is_active: row.get("isActive").map(truthy).unwrap_or(true),
            category: optional_text(row, "category"),
            description: optional_text(row, "description"),
            created_at: optional_text(row, "createdAt"),
            updated_at: optional_text(row, "updatedAt"),
        })
    }
}

/// Fields a caller may change on an existing maintenance type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMaintenanceType {
    pub name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl UpdateMaintenanceType {
    /// Reject updates the store would accept but the application must not.
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::invalid_input("name is required"));
        }
        Ok(())
    }
}

/// Active flags come back as BOOLEAN, TINYINT(1) or INTEGER depending on the store.
fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_i64().is_some_and(|v| v != 0),
        JsonValue::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn optional_text(row: &Row, key: &str) -> Option<String> {
    match row.get(key) {
        Some(JsonValue::String(s)) => Some(s.clone()),
        Some(JsonValue::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_row_with_integer_flag() {
        let record = MaintenanceType::from_row(&row(json!({
            "id": 3,
            "name": "Preditiva",
            "isActive": 0,
            "category": "preditiva",
            "description": null
        })))
        .unwrap();
        assert_eq!(record.id, 3);
        assert_eq!(record.name, "Preditiva");
        assert!(!record.is_active);
        assert_eq!(record.category.as_deref(), Some("preditiva"));
        assert!(record.description.is_none());
    }

    #[test]
    fn test_from_row_requires_id() {
        let result = MaintenanceType::from_row(&row(json!({"name": "Corretiva"})));
        assert!(matches!(result, Err(StoreError::InvalidInput { .. })));
    }

    #[test]
    fn test_update_validation() {
        let update = UpdateMaintenanceType {
            name: "  ".to_string(),
            is_active: true,
        };
        assert!(update.validate().is_err());

        let update: UpdateMaintenanceType =
            serde_json::from_value(json!({"name": "Calibração"})).unwrap();
        assert!(update.is_active);
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_serializes_camel_case() {
        let record = MaintenanceType {
            id: 1,
            name: "Preventiva".to_string(),
            is_active: true,
            category: None,
            description: None,
            created_at: None,
            updated_at: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["isActive"], json!(true));
    }
}
