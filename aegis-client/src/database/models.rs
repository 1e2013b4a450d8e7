//! Storage rows

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A key of the origin's storage area with its value and last write time
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
