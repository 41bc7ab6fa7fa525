//! Statement parameters.
//!
//! Callers hand parameters over in whatever shape they have: a vector, nothing
//! at all, or a JSON value lifted straight from a request body. Everything is
//! normalized into [`Params`], an ordered (possibly empty) sequence. Shapes
//! that are not a sequence become the empty sequence instead of an error.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Sqlite};

/// A single bound value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    /// Stored as i64 for maximum range
    Int(i64),
    Float(f64),
    String(String),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for QueryParam {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

impl From<JsonValue> for QueryParam {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            JsonValue::String(s) => Self::String(s),
            // Nested structures are bound as their JSON text
            other => Self::String(other.to_string()),
        }
    }
}

/// Ordered statement parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<QueryParam>);

impl Params {
    /// The empty parameter sequence.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_slice(&self) -> &[QueryParam] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_vec(self) -> Vec<QueryParam> {
        self.0
    }
}

impl From<Vec<QueryParam>> for Params {
    fn from(v: Vec<QueryParam>) -> Self {
        Self(v)
    }
}

impl From<&[QueryParam]> for Params {
    fn from(v: &[QueryParam]) -> Self {
        Self(v.to_vec())
    }
}

impl<const N: usize> From<[QueryParam; N]> for Params {
    fn from(v: [QueryParam; N]) -> Self {
        Self(v.into())
    }
}

impl From<Option<Vec<QueryParam>>> for Params {
    fn from(v: Option<Vec<QueryParam>>) -> Self {
        Self(v.unwrap_or_default())
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

/// Only a JSON array is a parameter sequence; every other shape is empty.
impl From<JsonValue> for Params {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Array(items) => Self(items.into_iter().map(QueryParam::from).collect()),
            _ => Self::empty(),
        }
    }
}

impl From<Option<JsonValue>> for Params {
    fn from(v: Option<JsonValue>) -> Self {
        v.map(Self::from).unwrap_or_default()
    }
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
    }
}
