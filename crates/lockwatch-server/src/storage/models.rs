//! Data models for Lockwatch server storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Token {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: i64,
    pub revoked: i64,
    pub created_at: i64,
}

/// Persisted device identity. One row per `pc_id`; `name` is the merge key
/// used by identity reconciliation and is not unique.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub ip: Option<String>,
    pub last_seen: i64,
    pub last_status: String,
    pub last_status_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockPeriod {
    pub id: String,
    pub owner_id: String,
    pub from_time: String,
    pub to_time: String,
    /// Comma-joined weekday tokens; empty means every day.
    pub days: String,
}

impl BlockPeriod {
    /// Split the stored day list into tokens, dropping empties.
    pub fn day_tokens(&self) -> Vec<String> {
        self.days
            .split(',')
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect()
    }
}
