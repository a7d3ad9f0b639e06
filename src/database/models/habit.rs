use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::datetime::to_db_timestamp;

const HABIT_COLUMNS: &str = "id, user_id, name, description, target_value, unit, is_active, \
     streak_count, best_streak, created_at, updated_at";

/// Date format of `habit_logs.log_date`.
pub const LOG_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Habit {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub target_value: i64,
    pub unit: Option<String>,
    pub is_active: bool,
    pub streak_count: i64,
    pub best_streak: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HabitLog {
    pub id: i64,
    pub user_id: i64,
    pub habit_id: i64,
    /// The user's local calendar date, `YYYY-MM-DD`
    pub log_date: String,
    pub value: i64,
    pub notes: Option<String>,
    pub created_at: String,
}

impl Habit {
    pub async fn create(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        name: &str,
        target_value: i64,
        unit: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let now = to_db_timestamp(&Utc::now());

        let id = sqlx::query(
            r#"
            INSERT INTO habits (user_id, name, target_value, unit, is_active, streak_count, best_streak, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, 0, 0, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(target_value)
        .bind(unit)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?
        .last_insert_rowid();

        Self::find_for_user(pool, id, user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_for_user(
        pool: &sqlx::SqlitePool,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Habit>(&format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ? AND user_id = ?"))
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_active(pool: &sqlx::SqlitePool, user_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Habit>(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = ? AND is_active = 1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Active habits with no log on `date`.
    pub async fn unlogged_on(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Habit>(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits h WHERE h.user_id = ? AND h.is_active = 1 \
             AND NOT EXISTS (SELECT 1 FROM habit_logs l WHERE l.habit_id = h.id AND l.log_date = ?) \
             ORDER BY h.id"
        ))
        .bind(user_id)
        .bind(date.format(LOG_DATE_FORMAT).to_string())
        .fetch_all(pool)
        .await
    }

    /// Records `value` for `date` (replacing any earlier entry that day)
    /// and recomputes the streak. Returns the refreshed habit.
    pub async fn log_progress(
        pool: &sqlx::SqlitePool,
        habit: &Habit,
        date: NaiveDate,
        value: i64,
    ) -> Result<Habit, sqlx::Error> {
        let now = to_db_timestamp(&Utc::now());

        sqlx::query(
            r#"
            INSERT INTO habit_logs (user_id, habit_id, log_date, value, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(habit_id, log_date) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(habit.user_id)
        .bind(habit.id)
        .bind(date.format(LOG_DATE_FORMAT).to_string())
        .bind(value)
        .bind(&now)
        .execute(pool)
        .await?;

        let met_dates: Vec<NaiveDate> = sqlx::query_scalar::<_, String>(
            "SELECT log_date FROM habit_logs WHERE habit_id = ? AND value >= ? ORDER BY log_date DESC",
        )
        .bind(habit.id)
        .bind(habit.target_value)
        .fetch_all(pool)
        .await?
        .iter()
        .filter_map(|raw| NaiveDate::parse_from_str(raw, LOG_DATE_FORMAT).ok())
        .collect();

        let streak = compute_streak(&met_dates, date);
        let best = habit.best_streak.max(streak);

        sqlx::query("UPDATE habits SET streak_count = ?, best_streak = ?, updated_at = ? WHERE id = ?")
            .bind(streak)
            .bind(best)
            .bind(&now)
            .bind(habit.id)
            .execute(pool)
            .await?;

        Self::find_for_user(pool, habit.id, habit.user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Hides a habit from lists and check-ins; its history is kept.
    pub async fn archive(pool: &sqlx::SqlitePool, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE habits SET is_active = 0, updated_at = ? WHERE id = ? AND user_id = ?")
            .bind(to_db_timestamp(&Utc::now()))
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count_active(pool: &sqlx::SqlitePool, user_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM habits WHERE user_id = ? AND is_active = 1")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    pub fn unit_label(&self) -> &str {
        self.unit.as_deref().unwrap_or("times")
    }
}

impl HabitLog {
    pub async fn list_for_habit(
        pool: &sqlx::SqlitePool,
        habit_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, HabitLog>(
            "SELECT id, user_id, habit_id, log_date, value, notes, created_at FROM habit_logs \
             WHERE habit_id = ? ORDER BY log_date DESC LIMIT ?",
        )
        .bind(habit_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Logs of active habits on or after `since`.
    pub async fn count_since(pool: &sqlx::SqlitePool, user_id: i64, since: NaiveDate) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM habit_logs l JOIN habits h ON h.id = l.habit_id \
             WHERE l.user_id = ? AND h.is_active = 1 AND l.log_date >= ?",
        )
        .bind(user_id)
        .bind(since.format(LOG_DATE_FORMAT).to_string())
        .fetch_one(pool)
        .await
    }
}

/// Consecutive met days ending on `anchor`.
///
/// `met_dates` must be sorted newest first; dates after `anchor` are ignored.
/// If `anchor` itself was not met the streak is zero.
pub fn compute_streak(met_dates: &[NaiveDate], anchor: NaiveDate) -> i64 {
    let mut expected = anchor;
    let mut streak = 0;

    for date in met_dates.iter().copied().filter(|date| *date <= anchor) {
        if date != expected {
            break;
        }
        streak += 1;
        match expected.pred_opt() {
            Some(previous) => expected = previous,
            None => break,
        }
    }

    streak
}
