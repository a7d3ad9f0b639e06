use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::datetime::to_db_timestamp;
use crate::utils::text::parse_tags;

const NOTE_COLUMNS: &str = "id, user_id, title, content, category, tags, is_pinned, created_at, updated_at";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    /// Comma separated
    pub tags: Option<String>,
    pub is_pinned: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A note attribute `/note edit` can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteField {
    Title,
    Content,
    Category,
    Tags,
}

impl NoteField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "title" => Some(NoteField::Title),
            "content" | "text" | "body" => Some(NoteField::Content),
            "category" => Some(NoteField::Category),
            "tags" | "tag" => Some(NoteField::Tags),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            NoteField::Title => "title",
            NoteField::Content => "content",
            NoteField::Category => "category",
            NoteField::Tags => "tags",
        }
    }

    /// Category and tags can be removed; title and content cannot.
    pub fn is_clearable(self) -> bool {
        matches!(self, NoteField::Category | NoteField::Tags)
    }
}

impl Note {
    pub async fn create(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        title: &str,
        content: &str,
        category: Option<&str>,
        tags: &[String],
    ) -> Result<Self, sqlx::Error> {
        let now = to_db_timestamp(&Utc::now());
        let tags = if tags.is_empty() { None } else { Some(tags.join(",")) };

        let id = sqlx::query(
            r#"
            INSERT INTO notes (user_id, title, content, category, tags, is_pinned, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(content)
        .bind(category)
        .bind(tags)
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
        sqlx::query_as::<_, Note>(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ? AND user_id = ?"))
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Pinned notes first, then newest.
    pub async fn list(pool: &sqlx::SqlitePool, user_id: i64, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Note>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE user_id = ? ORDER BY is_pinned DESC, created_at DESC, id DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Case-insensitive substring search over title, content and tags.
    pub async fn search(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        query: &str,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let needle = query.trim().to_lowercase();
        sqlx::query_as::<_, Note>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE user_id = ? AND (\
             instr(lower(title), ?) > 0 OR instr(lower(content), ?) > 0 OR instr(lower(COALESCE(tags, '')), ?) > 0) \
             ORDER BY is_pinned DESC, created_at DESC, id DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(&needle)
        .bind(&needle)
        .bind(&needle)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Flips the pin; `None` when the note does not belong to the user.
    pub async fn toggle_pin(pool: &sqlx::SqlitePool, id: i64, user_id: i64) -> Result<Option<bool>, sqlx::Error> {
        let result = sqlx::query("UPDATE notes SET is_pinned = NOT is_pinned, updated_at = ? WHERE id = ? AND user_id = ?")
            .bind(to_db_timestamp(&Utc::now()))
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let pinned = sqlx::query_scalar::<_, bool>("SELECT is_pinned FROM notes WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(Some(pinned))
    }

    /// Replaces one field. `None` clears it; tags are stored normalized.
    ///
    /// Returns the updated note, or `None` when it does not belong to the user.
    pub async fn update_field(
        pool: &sqlx::SqlitePool,
        id: i64,
        user_id: i64,
        field: NoteField,
        value: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let value = match field {
            NoteField::Tags => value.map(parse_tags).filter(|tags| !tags.is_empty()).map(|tags| tags.join(",")),
            _ => value.map(|value| value.trim().to_string()),
        };

        let result = sqlx::query(&format!(
            "UPDATE notes SET {} = ?, updated_at = ? WHERE id = ? AND user_id = ?",
            field.column()
        ))
        .bind(value)
        .bind(to_db_timestamp(&Utc::now()))
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::find_for_user(pool, id, user_id).await
    }

    pub async fn delete(pool: &sqlx::SqlitePool, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count(pool: &sqlx::SqlitePool, user_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notes WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    pub async fn count_created_since(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notes WHERE user_id = ? AND created_at >= ?")
            .bind(user_id)
            .bind(to_db_timestamp(&since))
            .fetch_one(pool)
            .await
    }

    pub fn tag_list(&self) -> Vec<String> {
        self.tags.as_deref().map(parse_tags).unwrap_or_default()
    }
}
