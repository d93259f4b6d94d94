use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    conversation::ConversationTurn,
    domain::UserId,
    errors::Error,
    storage::{Database, Table},
    Result,
};

/// Row shape of the `chatModelContext` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRecord {
    pub user_id: String,
    #[serde(default)]
    pub context: Vec<ConversationTurn>,
    #[serde(default)]
    pub updated_at: i64,
}

/// Per-user conversation history backed by the storage collaborator.
#[derive(Clone)]
pub struct ContextStore {
    db: Arc<dyn Database>,
}

impl ContextStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn load(&self, user_id: &UserId) -> Result<Vec<ConversationTurn>> {
        let Some(row) = self.db.get(Table::ChatModelContext, user_id).await? else {
            return Ok(Vec::new());
        };
        let record: ContextRecord = serde_json::from_value(row).map_err(|e| {
            Error::Storage(format!("corrupt context row for user {user_id}: {e}"))
        })?;
        Ok(record.context)
    }

    /// Replace the stored turns for `user_id` (update if present, else insert).
    pub async fn save(&self, user_id: &UserId, turns: &[ConversationTurn]) -> Result<()> {
        let updated_at = Utc::now().timestamp_millis();
        let patch = json!({
            "context": serde_json::to_value(turns)?,
            "updatedAt": updated_at,
        });

        let affected = self
            .db
            .set(Table::ChatModelContext, user_id, patch)
            .await?;
        if affected == 0 {
            let record = ContextRecord {
                user_id: user_id.0.clone(),
                context: turns.to_vec(),
                updated_at,
            };
            self.db
                .create(Table::ChatModelContext, serde_json::to_value(record)?)
                .await?;
        }

        tracing::debug!(user = %user_id, turns = turns.len(), "saved context");
        Ok(())
    }

    /// Empty the stored turns. The row itself is kept.
    pub async fn clear(&self, user_id: &UserId) -> Result<()> {
        self.save(user_id, &[]).await
    }
}
