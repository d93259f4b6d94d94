use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{merge_patch, record_key, Database, Table};
use crate::{domain::UserId, errors::Error, Result};

type Rows = HashMap<String, Map<String, Value>>;

/// In-process database. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<HashMap<Table, Rows>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_tables(tables: HashMap<Table, Rows>) -> Self {
        Self {
            tables: Mutex::new(tables),
        }
    }

    pub(crate) async fn snapshot(&self) -> HashMap<Table, Rows> {
        self.tables.lock().await.clone()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get(&self, table: Table, user_id: &UserId) -> Result<Option<Value>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(&table)
            .and_then(|rows| rows.get(&user_id.0))
            .cloned()
            .map(Value::Object))
    }

    async fn set(&self, table: Table, user_id: &UserId, patch: Value) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables
            .get_mut(&table)
            .and_then(|rows| rows.get_mut(&user_id.0))
        else {
            return Ok(0);
        };
        merge_patch(row, patch)?;
        Ok(1)
    }

    async fn create(&self, table: Table, record: Value) -> Result<()> {
        let key = record_key(&record)?;
        let Value::Object(row) = record else {
            return Err(Error::Storage("record must be a JSON object".to_string()));
        };

        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table).or_default();
        if rows.contains_key(&key) {
            return Err(Error::Storage(format!(
                "duplicate key {key} in {}",
                table.name()
            )));
        }
        rows.insert(key, row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_patches_only_existing_rows() {
        let db = MemoryDatabase::new();
        let user = UserId("u1".to_string());

        assert_eq!(
            db.set(Table::ChatModelUsage, &user, json!({"dailyCount": 1}))
                .await
                .unwrap(),
            0
        );

        db.create(
            Table::ChatModelUsage,
            json!({"userId": "u1", "dailyCount": 1, "lastResetDate": "2026-01-01"}),
        )
        .await
        .unwrap();

        let affected = db
            .set(Table::ChatModelUsage, &user, json!({"dailyCount": 2}))
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let row = db.get(Table::ChatModelUsage, &user).await.unwrap().unwrap();
        assert_eq!(row["dailyCount"], 2);
        assert_eq!(row["lastResetDate"], "2026-01-01");
        assert_eq!(row["userId"], "u1");
    }

    #[tokio::test]
    async fn tables_are_independent() {
        let db = MemoryDatabase::new();
        db.create(Table::ChatModelContext, json!({"userId": "u1", "context": []}))
            .await
            .unwrap();
        let user = UserId("u1".to_string());
        assert!(db.get(Table::ChatModelUsage, &user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_rejects_duplicates_and_missing_keys() {
        let db = MemoryDatabase::new();
        db.create(Table::ChatModelContext, json!({"userId": "u1"}))
            .await
            .unwrap();
        assert!(db
            .create(Table::ChatModelContext, json!({"userId": "u1"}))
            .await
            .is_err());
        assert!(db
            .create(Table::ChatModelContext, json!({"context": []}))
            .await
            .is_err());
    }
}
