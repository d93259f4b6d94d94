//! Per-user daily message quota.
//!
//! Resets are lazy: a record whose `lastResetDate` is not today counts as zero
//! the next time it is looked at. The day boundary is the local calendar date,
//! compared as a `YYYY-MM-DD` string.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::UsageLimitSettings,
    domain::UserId,
    errors::Error,
    storage::{Database, Table},
    Result,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Row shape of the `chatModelUsage` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub user_id: String,
    pub daily_count: u32,
    pub last_reset_date: String,
}

#[derive(Clone)]
pub struct UsageLimiter {
    db: Arc<dyn Database>,
}

impl UsageLimiter {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Check the quota and, when allowed, count this use.
    ///
    /// Always allowed when limits are disabled; nothing is recorded then.
    pub async fn check_and_consume(
        &self,
        user_id: &UserId,
        settings: &UsageLimitSettings,
    ) -> Result<bool> {
        self.check_and_consume_on(user_id, settings, today()).await
    }

    pub async fn check_and_consume_on(
        &self,
        user_id: &UserId,
        settings: &UsageLimitSettings,
        date: NaiveDate,
    ) -> Result<bool> {
        if !settings.enabled {
            return Ok(true);
        }
        if !self
            .is_allowed_on(user_id, settings.max_messages_per_user, date)
            .await?
        {
            tracing::info!(user = %user_id, max = settings.max_messages_per_user, "daily limit reached");
            return Ok(false);
        }
        self.record_use_on(user_id, date).await?;
        Ok(true)
    }

    pub async fn is_allowed(&self, user_id: &UserId, max_per_day: u32) -> Result<bool> {
        self.is_allowed_on(user_id, max_per_day, today()).await
    }

    pub async fn is_allowed_on(
        &self,
        user_id: &UserId,
        max_per_day: u32,
        date: NaiveDate,
    ) -> Result<bool> {
        let Some(record) = self.get(user_id).await? else {
            return Ok(true);
        };

        let today = format_date(date);
        if record.last_reset_date != today {
            self.db
                .set(
                    Table::ChatModelUsage,
                    user_id,
                    json!({ "dailyCount": 0, "lastResetDate": today }),
                )
                .await?;
            return Ok(true);
        }

        Ok(record.daily_count < max_per_day)
    }

    pub async fn record_use(&self, user_id: &UserId) -> Result<()> {
        self.record_use_on(user_id, today()).await
    }

    pub async fn record_use_on(&self, user_id: &UserId, date: NaiveDate) -> Result<()> {
        let today = format_date(date);

        let Some(record) = self.get(user_id).await? else {
            let record = UsageRecord {
                user_id: user_id.0.clone(),
                daily_count: 1,
                last_reset_date: today,
            };
            return self
                .db
                .create(Table::ChatModelUsage, serde_json::to_value(record)?)
                .await;
        };

        let daily_count = if record.last_reset_date == today {
            record.daily_count.saturating_add(1)
        } else {
            1
        };
        self.db
            .set(
                Table::ChatModelUsage,
                user_id,
                json!({ "dailyCount": daily_count, "lastResetDate": today }),
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, user_id: &UserId) -> Result<Option<UsageRecord>> {
        let Some(row) = self.db.get(Table::ChatModelUsage, user_id).await? else {
            return Ok(None);
        };
        serde_json::from_value(row)
            .map(Some)
            .map_err(|e| Error::Storage(format!("corrupt usage row for user {user_id}: {e}")))
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDatabase;
    use chrono::NaiveTime;

    fn limiter() -> UsageLimiter {
        UsageLimiter::new(Arc::new(MemoryDatabase::new()))
    }

    fn settings(enabled: bool, max: u32) -> UsageLimitSettings {
        UsageLimitSettings {
            enabled,
            max_messages_per_user: max,
            reset_time: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn fourth_use_on_the_same_day_is_denied() {
        let limiter = limiter();
        let user = UserId("u1".to_string());
        let cfg = settings(true, 3);

        for _ in 0..3 {
            assert!(limiter.check_and_consume_on(&user, &cfg, day(1)).await.unwrap());
        }
        assert!(!limiter.check_and_consume_on(&user, &cfg, day(1)).await.unwrap());

        let record = limiter.get(&user).await.unwrap().unwrap();
        assert_eq!(record.daily_count, 3);
        assert_eq!(record.last_reset_date, "2026-03-01");
    }

    #[tokio::test]
    async fn next_day_resets_before_increment() {
        let limiter = limiter();
        let user = UserId("u1".to_string());
        let cfg = settings(true, 3);
        for _ in 0..3 {
            limiter.check_and_consume_on(&user, &cfg, day(1)).await.unwrap();
        }

        assert!(limiter.is_allowed_on(&user, 3, day(2)).await.unwrap());
        let reset = limiter.get(&user).await.unwrap().unwrap();
        assert_eq!(reset.daily_count, 0);
        assert_eq!(reset.last_reset_date, "2026-03-02");

        limiter.record_use_on(&user, day(2)).await.unwrap();
        assert_eq!(limiter.get(&user).await.unwrap().unwrap().daily_count, 1);
    }

    #[tokio::test]
    async fn record_use_rolls_over_stale_dates() {
        let limiter = limiter();
        let user = UserId("u1".to_string());
        limiter.record_use_on(&user, day(1)).await.unwrap();
        limiter.record_use_on(&user, day(1)).await.unwrap();
        limiter.record_use_on(&user, day(5)).await.unwrap();

        let record = limiter.get(&user).await.unwrap().unwrap();
        assert_eq!(record.daily_count, 1);
        assert_eq!(record.last_reset_date, "2026-03-05");
    }

    #[tokio::test]
    async fn disabled_limits_always_permit_and_record_nothing() {
        let limiter = limiter();
        let user = UserId("u1".to_string());
        let cfg = settings(false, 0);
        for _ in 0..5 {
            assert!(limiter.check_and_consume_on(&user, &cfg, day(1)).await.unwrap());
        }
        assert!(limiter.get(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_user_is_allowed() {
        let limiter = limiter();
        assert!(limiter
            .is_allowed_on(&UserId("x".to_string()), 1, day(1))
            .await
            .unwrap());
    }
}
