use anyhow::{anyhow, Result};

use crate::services::timezone::UserTimezone;

/// Longest reminder or task title accepted.
pub const MAX_TITLE_LEN: usize = 255;
/// Longest reminder or task description accepted.
pub const MAX_DESCRIPTION_LEN: usize = 1000;
/// Longest habit name accepted.
pub const MAX_HABIT_NAME_LEN: usize = 100;
/// Longest note body accepted.
pub const MAX_NOTE_CONTENT_LEN: usize = 4000;
/// Longest project name accepted.
pub const MAX_PROJECT_NAME_LEN: usize = 255;
/// Longest note category accepted.
pub const MAX_CATEGORY_LEN: usize = 100;
/// Longest raw tag list accepted.
pub const MAX_TAGS_LEN: usize = 500;
/// Largest progress value one habit log may record.
pub const MAX_HABIT_LOG_VALUE: i64 = 100_000;

fn validate_text(field: &str, value: &str, max_len: usize) -> Result<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(anyhow!("{} cannot be empty", field));
    }

    if value.chars().count() > max_len {
        return Err(anyhow!("{} cannot be longer than {} characters", field, max_len));
    }

    Ok(())
}

pub fn validate_title(title: &str) -> Result<()> {
    validate_text("Title", title, MAX_TITLE_LEN)?;

    if title.contains('\n') || title.contains('\r') {
        return Err(anyhow!("Title cannot contain line breaks"));
    }

    Ok(())
}

pub fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(anyhow!(
            "Description cannot be longer than {} characters",
            MAX_DESCRIPTION_LEN
        ));
    }
    Ok(())
}

pub fn validate_habit_name(name: &str) -> Result<()> {
    validate_text("Habit name", name, MAX_HABIT_NAME_LEN)
}

pub fn validate_note_content(content: &str) -> Result<()> {
    validate_text("Note content", content, MAX_NOTE_CONTENT_LEN)
}

pub fn validate_project_name(name: &str) -> Result<()> {
    validate_text("Project name", name, MAX_PROJECT_NAME_LEN)
}

pub fn validate_category(category: &str) -> Result<()> {
    validate_text("Category", category, MAX_CATEGORY_LEN)
}

pub fn validate_tags(tags: &str) -> Result<()> {
    validate_text("Tags", tags, MAX_TAGS_LEN)
}

/// Logged progress may be zero (a missed day) but never negative.
pub fn validate_habit_log_value(value: i64) -> Result<()> {
    if !(0..=MAX_HABIT_LOG_VALUE).contains(&value) {
        return Err(anyhow!("Progress must be between 0 and {}", MAX_HABIT_LOG_VALUE));
    }
    Ok(())
}

/// Habit targets are small positive counts (pages, glasses, minutes).
pub fn validate_habit_target(target: i64) -> Result<()> {
    if !(1..=10_000).contains(&target) {
        return Err(anyhow!("Target must be between 1 and 10000"));
    }
    Ok(())
}

pub fn validate_timezone(raw: &str) -> Result<UserTimezone> {
    UserTimezone::parse(raw).ok_or_else(|| {
        anyhow!("Unknown timezone '{}'. Use a name like Europe/Berlin or an offset like UTC:+5:30", raw.trim())
    })
}
