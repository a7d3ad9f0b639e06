use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::services::timezone::UserTimezone;
use crate::utils::datetime::to_db_timestamp;

const USER_COLUMNS: &str = "id, telegram_id, username, first_name, last_name, language_code, timezone, \
     status, reminder_notifications, habit_reminders, task_deadlines, weekly_summaries, created_at, updated_at";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: String,
    pub timezone: String,
    pub status: String,
    pub reminder_notifications: bool,
    pub habit_reminders: bool,
    pub task_deadlines: bool,
    pub weekly_summaries: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// What Telegram tells us about the person behind an update.
#[derive(Debug, Clone, Default)]
pub struct TelegramProfile {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    Inactive,
    Banned,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Banned => "banned",
        }
    }
}

/// The four per-user notification switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationPreference {
    Reminders,
    HabitReminders,
    TaskDeadlines,
    WeeklySummaries,
}

impl NotificationPreference {
    pub const ALL: [NotificationPreference; 4] = [
        NotificationPreference::Reminders,
        NotificationPreference::HabitReminders,
        NotificationPreference::TaskDeadlines,
        NotificationPreference::WeeklySummaries,
    ];

    fn column(self) -> &'static str {
        match self {
            NotificationPreference::Reminders => "reminder_notifications",
            NotificationPreference::HabitReminders => "habit_reminders",
            NotificationPreference::TaskDeadlines => "task_deadlines",
            NotificationPreference::WeeklySummaries => "weekly_summaries",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NotificationPreference::Reminders => "Reminder notifications",
            NotificationPreference::HabitReminders => "Daily habit check-in",
            NotificationPreference::TaskDeadlines => "Task deadline alerts",
            NotificationPreference::WeeklySummaries => "Weekly summary",
        }
    }

    /// Short name used in callback data.
    pub fn token(self) -> &'static str {
        match self {
            NotificationPreference::Reminders => "reminders",
            NotificationPreference::HabitReminders => "habits",
            NotificationPreference::TaskDeadlines => "tasks",
            NotificationPreference::WeeklySummaries => "summaries",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|pref| pref.token() == token)
    }
}

impl User {
    pub async fn find_by_id(pool: &sqlx::SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_telegram_id(
        pool: &sqlx::SqlitePool,
        telegram_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_id = ?"))
            .bind(telegram_id)
            .fetch_optional(pool)
            .await
    }

    /// Returns the stored user, refreshing profile fields, or creates one.
    ///
    /// The flag is `true` when the row was created by this call.
    pub async fn get_or_create(
        pool: &sqlx::SqlitePool,
        profile: &TelegramProfile,
        default_timezone: &str,
    ) -> Result<(Self, bool), sqlx::Error> {
        let now = to_db_timestamp(&Utc::now());

        if Self::find_by_telegram_id(pool, profile.telegram_id).await?.is_some() {
            sqlx::query(
                "UPDATE users SET username = ?, first_name = ?, last_name = ?, updated_at = ? WHERE telegram_id = ?",
            )
            .bind(&profile.username)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&now)
            .bind(profile.telegram_id)
            .execute(pool)
            .await?;

            let user = Self::find_by_telegram_id(pool, profile.telegram_id)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            return Ok((user, false));
        }

        sqlx::query(
            r#"
            INSERT INTO users (telegram_id, username, first_name, last_name, language_code, timezone, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(profile.telegram_id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.language_code.as_deref().unwrap_or("en"))
        .bind(default_timezone)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        let user = Self::find_by_telegram_id(pool, profile.telegram_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        Ok((user, true))
    }

    pub async fn find_active(pool: &sqlx::SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE status = 'active' ORDER BY id"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn set_timezone(pool: &sqlx::SqlitePool, id: i64, timezone: &UserTimezone) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET timezone = ?, updated_at = ? WHERE id = ?")
            .bind(timezone.name())
            .bind(to_db_timestamp(&Utc::now()))
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_status(pool: &sqlx::SqlitePool, id: i64, status: UserStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(to_db_timestamp(&Utc::now()))
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Flips one switch and returns its new value.
    pub async fn toggle_preference(
        pool: &sqlx::SqlitePool,
        id: i64,
        preference: NotificationPreference,
    ) -> Result<bool, sqlx::Error> {
        let column = preference.column();
        sqlx::query(&format!(
            "UPDATE users SET {column} = NOT {column}, updated_at = ? WHERE id = ?"
        ))
        .bind(to_db_timestamp(&Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;

        sqlx::query_scalar::<_, bool>(&format!("SELECT {column} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub fn preference(&self, preference: NotificationPreference) -> bool {
        match preference {
            NotificationPreference::Reminders => self.reminder_notifications,
            NotificationPreference::HabitReminders => self.habit_reminders,
            NotificationPreference::TaskDeadlines => self.task_deadlines,
            NotificationPreference::WeeklySummaries => self.weekly_summaries,
        }
    }

    pub fn timezone(&self) -> UserTimezone {
        UserTimezone::resolve_or_utc(&self.timezone)
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active.as_str()
    }

    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned.as_str()
    }

    pub fn display_name(&self) -> String {
        self.first_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| format!("user {}", self.telegram_id))
    }
}
