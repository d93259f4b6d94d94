use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{Database, MemoryDatabase, Table};
use crate::{domain::UserId, errors::Error, Result};

/// Single-file JSON database.
///
/// Every table is kept in memory and the whole file is rewritten after each
/// mutation (write to a sibling temp file, then rename over the original).
///
/// File shape: `{ "<table>": { "<userId>": { ...row... } } }`.
pub struct JsonFileDatabase {
    path: PathBuf,
    inner: MemoryDatabase,
    write_lock: Mutex<()>,
}

impl JsonFileDatabase {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => parse_tables(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        tracing::debug!(path = %path.display(), "opened json database");

        Ok(Self {
            path,
            inner: MemoryDatabase::from_tables(tables),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.inner.snapshot().await;

        let mut root = Map::new();
        for table in Table::all() {
            let rows = snapshot
                .get(&table)
                .map(|rows| {
                    rows.iter()
                        .map(|(k, v)| (k.clone(), Value::Object(v.clone())))
                        .collect::<Map<_, _>>()
                })
                .unwrap_or_default();
            root.insert(table.name().to_string(), Value::Object(rows));
        }
        let body = serde_json::to_string_pretty(&Value::Object(root))?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn parse_tables(raw: &str) -> Result<HashMap<Table, HashMap<String, Map<String, Value>>>> {
    let root: Value = serde_json::from_str(raw)?;
    let mut out = HashMap::new();

    for table in Table::all() {
        let Some(rows) = root.get(table.name()) else {
            continue;
        };
        let Value::Object(rows) = rows else {
            return Err(Error::Storage(format!(
                "table {} is not a JSON object",
                table.name()
            )));
        };

        let mut parsed = HashMap::new();
        for (key, row) in rows {
            let Value::Object(row) = row else {
                return Err(Error::Storage(format!(
                    "row {key} in {} is not a JSON object",
                    table.name()
                )));
            };
            parsed.insert(key.clone(), row.clone());
        }
        out.insert(table, parsed);
    }

    Ok(out)
}

#[async_trait]
impl Database for JsonFileDatabase {
    async fn get(&self, table: Table, user_id: &UserId) -> Result<Option<Value>> {
        self.inner.get(table, user_id).await
    }

    async fn set(&self, table: Table, user_id: &UserId, patch: Value) -> Result<u64> {
        let affected = self.inner.set(table, user_id, patch).await?;
        if affected > 0 {
            self.flush().await?;
        }
        Ok(affected)
    }

    async fn create(&self, table: Table, record: Value) -> Result<()> {
        self.inner.create(table, record).await?;
        self.flush().await
    }
}
