//! Persistent key-value collaborator.
//!
//! Rows are JSON objects keyed by `userId`. The middleware only ever needs
//! point lookups, merge-patches and inserts, so that is all the port offers.

pub mod json_file;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{domain::UserId, errors::Error, Result};

pub use json_file::JsonFileDatabase;
pub use memory::MemoryDatabase;

/// Primary key column shared by every table.
pub const KEY_FIELD: &str = "userId";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    /// `userId`, `context` (turn array), `updatedAt` (epoch millis).
    ChatModelContext,
    /// `userId`, `dailyCount`, `lastResetDate` (`YYYY-MM-DD`).
    ChatModelUsage,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::ChatModelContext => "chatModelContext",
            Table::ChatModelUsage => "chatModelUsage",
        }
    }

    pub fn all() -> [Table; 2] {
        [Table::ChatModelContext, Table::ChatModelUsage]
    }
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn get(&self, table: Table, user_id: &UserId) -> Result<Option<Value>>;

    /// Merge `patch` into the row keyed by `user_id`. Returns affected rows.
    async fn set(&self, table: Table, user_id: &UserId, patch: Value) -> Result<u64>;

    /// Insert `record`, which must carry a string `userId`.
    async fn create(&self, table: Table, record: Value) -> Result<()>;
}

pub(crate) fn record_key(record: &Value) -> Result<String> {
    record
        .get(KEY_FIELD)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Storage(format!("record is missing a string `{KEY_FIELD}`")))
}

pub(crate) fn merge_patch(row: &mut Map<String, Value>, patch: Value) -> Result<()> {
    let Value::Object(fields) = patch else {
        return Err(Error::Storage("patch must be a JSON object".to_string()));
    };
    for (k, v) in fields {
        if k == KEY_FIELD {
            continue;
        }
        row.insert(k, v);
    }
    Ok(())
}
