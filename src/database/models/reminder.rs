use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::datetime::{from_db_timestamp, to_db_timestamp};

const REMINDER_COLUMNS: &str = "id, user_id, title, description, remind_at, status, created_at, updated_at";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    /// UTC instant, RFC3339
    pub remind_at: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl ReminderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Completed => "completed",
            ReminderStatus::Cancelled => "cancelled",
        }
    }
}

impl Reminder {
    pub async fn create(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        title: &str,
        description: Option<&str>,
        remind_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        let now = to_db_timestamp(&Utc::now());

        let id = sqlx::query(
            r#"
            INSERT INTO reminders (user_id, title, description, remind_at, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(description)
        .bind(to_db_timestamp(&remind_at))
        .bind(ReminderStatus::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?
        .last_insert_rowid();

        Self::find_by_id(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(pool: &sqlx::SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Reminder>(&format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Looks a reminder up only if it belongs to `user_id`.
    pub async fn find_for_user(
        pool: &sqlx::SqlitePool,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Reminder>(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_pending(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Reminder>(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE user_id = ? AND status = ? ORDER BY remind_at LIMIT ?"
        ))
        .bind(user_id)
        .bind(ReminderStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Every pending reminder, used to restore jobs after a restart.
    pub async fn all_pending(pool: &sqlx::SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Reminder>(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE status = ? ORDER BY remind_at"
        ))
        .bind(ReminderStatus::Pending.as_str())
        .fetch_all(pool)
        .await
    }

    /// Moves a pending or completed reminder and makes it pending again.
    ///
    /// Cancelled reminders stay cancelled; returns `false` for them.
    pub async fn update_remind_at(
        pool: &sqlx::SqlitePool,
        id: i64,
        remind_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE reminders SET remind_at = ?, status = ?, updated_at = ? WHERE id = ? AND status != ?")
            .bind(to_db_timestamp(&remind_at))
            .bind(ReminderStatus::Pending.as_str())
            .bind(to_db_timestamp(&Utc::now()))
            .bind(id)
            .bind(ReminderStatus::Cancelled.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Moves a reminder from pending to completed.
    ///
    /// Returns `false` when it was not pending, so a reminder can only be
    /// claimed for delivery once.
    pub async fn mark_completed(pool: &sqlx::SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        Self::transition(pool, id, ReminderStatus::Completed).await
    }

    pub async fn cancel(pool: &sqlx::SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        Self::transition(pool, id, ReminderStatus::Cancelled).await
    }

    async fn transition(pool: &sqlx::SqlitePool, id: i64, to: ReminderStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE reminders SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(to_db_timestamp(&Utc::now()))
            .bind(id)
            .bind(ReminderStatus::Pending.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(pool: &sqlx::SqlitePool, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count_pending(pool: &sqlx::SqlitePool, user_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reminders WHERE user_id = ? AND status = ?")
            .bind(user_id)
            .bind(ReminderStatus::Pending.as_str())
            .fetch_one(pool)
            .await
    }

    pub async fn count_created_since(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reminders WHERE user_id = ? AND created_at >= ?")
            .bind(user_id)
            .bind(to_db_timestamp(&since))
            .fetch_one(pool)
            .await
    }

    pub async fn count_completed_since(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM reminders WHERE user_id = ? AND status = ? AND updated_at >= ?",
        )
        .bind(user_id)
        .bind(ReminderStatus::Completed.as_str())
        .bind(to_db_timestamp(&since))
        .fetch_one(pool)
        .await
    }

    pub fn remind_at_utc(&self) -> Option<DateTime<Utc>> {
        from_db_timestamp(&self.remind_at)
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReminderStatus::Pending.as_str()
    }
}
