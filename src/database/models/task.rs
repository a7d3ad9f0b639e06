use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::datetime::{from_db_timestamp, to_db_timestamp};

const TASK_COLUMNS: &str = "id, user_id, title, description, status, priority, due_date, completed_at, \
     project_name, created_at, updated_at";

/// Urgent first, then by due date with undated tasks last.
const OPEN_TASK_ORDER: &str = "ORDER BY CASE priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 \
     WHEN 'medium' THEN 2 ELSE 3 END, due_date IS NULL, due_date, id";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub due_date: Option<String>,
    pub completed_at: Option<String>,
    pub project_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(TaskPriority::Low),
            "medium" | "normal" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "urgent" => Some(TaskPriority::Urgent),
            _ => None,
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            TaskPriority::Low => "🟢",
            TaskPriority::Medium => "🟡",
            TaskPriority::High => "🟠",
            TaskPriority::Urgent => "🔴",
        }
    }
}

/// Fields for a task about to be inserted.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub project_name: Option<String>,
}

/// Per-project task counts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_name: String,
    pub task_count: i64,
    pub completed_count: i64,
}

impl Task {
    pub async fn create(pool: &sqlx::SqlitePool, user_id: i64, new_task: &NewTask) -> Result<Self, sqlx::Error> {
        let now = to_db_timestamp(&Utc::now());

        let id = sqlx::query(
            r#"
            INSERT INTO tasks (user_id, title, description, status, priority, due_date, project_name, created_at, updated_at)
            VALUES (?, ?, ?, 'todo', ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&new_task.title)
        .bind(&new_task.description)
        .bind(new_task.priority.as_str())
        .bind(new_task.due_date.as_ref().map(to_db_timestamp))
        .bind(&new_task.project_name)
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
        sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND user_id = ?"))
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Tasks still to do, most pressing first.
    pub async fn list_open(pool: &sqlx::SqlitePool, user_id: i64, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? AND status IN ('todo', 'in_progress') {OPEN_TASK_ORDER} LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn list_by_project(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        project_name: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? AND project_name = ? {OPEN_TASK_ORDER}"
        ))
        .bind(user_id)
        .bind(project_name)
        .fetch_all(pool)
        .await
    }

    /// Open tasks due inside `[from, to]`.
    pub async fn due_between(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? AND status IN ('todo', 'in_progress') \
             AND due_date IS NOT NULL AND due_date >= ? AND due_date <= ? ORDER BY due_date"
        ))
        .bind(user_id)
        .bind(to_db_timestamp(&from))
        .bind(to_db_timestamp(&to))
        .fetch_all(pool)
        .await
    }

    pub async fn complete(pool: &sqlx::SqlitePool, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let now = to_db_timestamp(&Utc::now());
        let result = sqlx::query(
            "UPDATE tasks SET status = 'completed', completed_at = ?, updated_at = ? \
             WHERE id = ? AND user_id = ? AND status != 'completed'",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(pool: &sqlx::SqlitePool, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn projects(pool: &sqlx::SqlitePool, user_id: i64) -> Result<Vec<ProjectSummary>, sqlx::Error> {
        sqlx::query_as::<_, ProjectSummary>(
            r#"
            SELECT project_name,
                   COUNT(*) AS task_count,
                   COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed_count
            FROM tasks
            WHERE user_id = ? AND project_name IS NOT NULL AND project_name != ''
            GROUP BY project_name
            ORDER BY project_name
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Renames a project across all of its tasks; returns how many moved.
    pub async fn rename_project(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        old_name: &str,
        new_name: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET project_name = ?, updated_at = ? WHERE user_id = ? AND project_name = ?",
        )
        .bind(new_name)
        .bind(to_db_timestamp(&Utc::now()))
        .bind(user_id)
        .bind(old_name)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Deletes a project together with its tasks.
    pub async fn delete_project(pool: &sqlx::SqlitePool, user_id: i64, name: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE user_id = ? AND project_name = ?")
            .bind(user_id)
            .bind(name)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_open(pool: &sqlx::SqlitePool, user_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tasks WHERE user_id = ? AND status IN ('todo', 'in_progress')",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn count_created_since(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks WHERE user_id = ? AND created_at >= ?")
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
            "SELECT COUNT(*) FROM tasks WHERE user_id = ? AND status = 'completed' AND completed_at >= ?",
        )
        .bind(user_id)
        .bind(to_db_timestamp(&since))
        .fetch_one(pool)
        .await
    }

    pub fn priority(&self) -> TaskPriority {
        TaskPriority::parse(&self.priority).unwrap_or_default()
    }

    pub fn due_date_utc(&self) -> Option<DateTime<Utc>> {
        self.due_date.as_deref().and_then(from_db_timestamp)
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed.as_str()
    }
}
