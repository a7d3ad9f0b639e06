#![allow(clippy::unwrap_used)]

use anyhow::Result;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use productivity_bot::database::{connection::DatabaseManager, models::*};
use productivity_bot::services::timezone::UserTimezone;
use tempfile::{tempdir, TempDir};
use tokio_test::assert_ok;

async fn setup_test_db() -> Result<(DatabaseManager, TempDir)> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("test.db");
    let database_url = format!("sqlite:{}", db_path.display());

    let db_manager = DatabaseManager::new(&database_url).await?;
    db_manager.run_migrations().await?;

    Ok((db_manager, temp_dir))
}

fn profile(telegram_id: i64, first_name: &str) -> TelegramProfile {
    TelegramProfile {
        telegram_id,
        username: Some(format!("{}_tg", first_name.to_lowercase())),
        first_name: Some(first_name.to_string()),
        last_name: None,
        language_code: None,
    }
}

async fn create_user(db: &DatabaseManager, telegram_id: i64) -> Result<User> {
    let (user, _) = User::get_or_create(&db.pool, &profile(telegram_id, "Alice"), "UTC").await?;
    Ok(user)
}

#[tokio::test]
async fn test_schema_tables_exist() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;

    let tables = db.table_names().await?;
    for table in ["habit_logs", "habits", "notes", "reminders", "tasks", "users"] {
        assert!(tables.iter().any(|name| name == table), "missing table {table}");
    }

    Ok(())
}

#[tokio::test]
async fn test_user_get_or_create() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;

    let (user, created) = User::get_or_create(&db.pool, &profile(1001, "Alice"), "Europe/Berlin").await?;
    assert!(created);
    assert_eq!(user.telegram_id, 1001);
    assert_eq!(user.timezone, "Europe/Berlin");
    assert_eq!(user.language_code, "en");
    assert!(user.is_active());
    for preference in NotificationPreference::ALL {
        assert!(user.preference(preference), "{} should start enabled", preference.label());
    }

    // Second contact refreshes the profile instead of inserting
    let (again, created) = User::get_or_create(&db.pool, &profile(1001, "Alicia"), "UTC").await?;
    assert!(!created);
    assert_eq!(again.id, user.id);
    assert_eq!(again.display_name(), "Alicia");
    assert_eq!(again.timezone, "Europe/Berlin");

    Ok(())
}

#[tokio::test]
async fn test_user_preferences_and_status() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;
    let user = create_user(&db, 1002).await?;

    let enabled = User::toggle_preference(&db.pool, user.id, NotificationPreference::WeeklySummaries).await?;
    assert!(!enabled);
    let enabled = User::toggle_preference(&db.pool, user.id, NotificationPreference::WeeklySummaries).await?;
    assert!(enabled);

    User::set_timezone(&db.pool, user.id, &UserTimezone::parse("UTC:+5:30").unwrap()).await?;
    User::set_status(&db.pool, user.id, UserStatus::Inactive).await?;

    let stored = User::find_by_id(&db.pool, user.id).await?.unwrap();
    assert_eq!(stored.timezone, "UTC+05:30");
    assert_eq!(stored.timezone(), UserTimezone::parse("UTC:+5:30").unwrap());
    assert!(!stored.is_active());
    assert!(User::find_active(&db.pool).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_reminder_lifecycle() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;
    let user = create_user(&db, 1003).await?;
    let remind_at = Utc.with_ymd_and_hms(2030, 6, 27, 14, 30, 0).unwrap();

    let reminder = Reminder::create(&db.pool, user.id, "Call mom", Some("about Sunday"), remind_at).await?;
    assert!(reminder.is_pending());
    assert_eq!(reminder.remind_at, "2030-06-27T14:30:00Z");
    assert_eq!(reminder.remind_at_utc(), Some(remind_at));

    assert_eq!(Reminder::list_pending(&db.pool, user.id, 10).await?.len(), 1);
    assert_eq!(Reminder::all_pending(&db.pool).await?.len(), 1);

    // Claiming for delivery succeeds exactly once
    assert!(Reminder::mark_completed(&db.pool, reminder.id).await?);
    assert!(!Reminder::mark_completed(&db.pool, reminder.id).await?);
    assert!(Reminder::all_pending(&db.pool).await?.is_empty());

    // Rescheduling makes it pending again
    let later = remind_at + Duration::hours(2);
    assert!(Reminder::update_remind_at(&db.pool, reminder.id, later).await?);
    let moved = Reminder::find_by_id(&db.pool, reminder.id).await?.unwrap();
    assert!(moved.is_pending());
    assert_eq!(moved.remind_at_utc(), Some(later));

    assert!(Reminder::cancel(&db.pool, reminder.id).await?);
    assert!(!Reminder::cancel(&db.pool, reminder.id).await?);
    let cancelled = Reminder::find_by_id(&db.pool, reminder.id).await?.unwrap();
    assert_eq!(cancelled.status, "cancelled");

    // Cancelled reminders stay cancelled
    assert!(!Reminder::update_remind_at(&db.pool, reminder.id, later + Duration::hours(1)).await?);
    let still = Reminder::find_by_id(&db.pool, reminder.id).await?.unwrap();
    assert_eq!(still.status, "cancelled");
    assert_eq!(still.remind_at_utc(), Some(later));

    Ok(())
}

#[tokio::test]
async fn test_reminder_ownership() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;
    let owner = create_user(&db, 1004).await?;
    let stranger = create_user(&db, 1005).await?;
    let remind_at = Utc::now() + Duration::hours(1);

    let reminder = Reminder::create(&db.pool, owner.id, "Private", None, remind_at).await?;

    assert!(Reminder::find_for_user(&db.pool, reminder.id, stranger.id).await?.is_none());
    assert!(!Reminder::delete(&db.pool, reminder.id, stranger.id).await?);
    assert!(Reminder::delete(&db.pool, reminder.id, owner.id).await?);
    assert!(Reminder::find_by_id(&db.pool, reminder.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_task_lifecycle_and_projects() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;
    let user = create_user(&db, 1006).await?;
    let now = Utc::now();

    let report = Task::create(
        &db.pool,
        user.id,
        &NewTask {
            title: "Write report".to_string(),
            description: None,
            priority: TaskPriority::High,
            due_date: Some(now + Duration::hours(5)),
            project_name: Some("Work".to_string()),
        },
    )
    .await?;
    let groceries = Task::create(
        &db.pool,
        user.id,
        &NewTask {
            title: "Groceries".to_string(),
            description: None,
            priority: TaskPriority::Low,
            due_date: Some(now + Duration::days(3)),
            project_name: None,
        },
    )
    .await?;

    assert_eq!(report.priority(), TaskPriority::High);
    assert!(!report.is_completed());

    let due_soon = Task::due_between(&db.pool, user.id, now, now + Duration::days(1)).await?;
    assert_eq!(due_soon.len(), 1);
    assert_eq!(due_soon[0].id, report.id);

    let projects = Task::projects(&db.pool, user.id).await?;
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].project_name, "Work");
    assert_eq!(projects[0].task_count, 1);

    assert_eq!(Task::rename_project(&db.pool, user.id, "Work", "Office").await?, 1);
    assert_eq!(Task::list_by_project(&db.pool, user.id, "Office").await?.len(), 1);

    assert!(Task::complete(&db.pool, report.id, user.id).await?);
    assert!(!Task::complete(&db.pool, report.id, user.id).await?);
    assert!(Task::due_between(&db.pool, user.id, now, now + Duration::days(1)).await?.is_empty());

    let open = Task::list_open(&db.pool, user.id, 20).await?;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, groceries.id);

    assert!(Task::delete(&db.pool, groceries.id, user.id).await?);

    Ok(())
}

#[test]
fn test_task_priority_parsing() {
    assert_eq!(TaskPriority::parse("HIGH"), Some(TaskPriority::High));
    assert_eq!(TaskPriority::parse(" low "), Some(TaskPriority::Low));
    assert_eq!(TaskPriority::parse("whenever"), None);
    assert_eq!(TaskPriority::Urgent.as_str(), "urgent");
}

#[tokio::test]
async fn test_habit_logging_and_streaks() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;
    let user = create_user(&db, 1007).await?;
    let day = |d: u32| NaiveDate::from_ymd_opt(2025, 1, d).unwrap();

    let habit = Habit::create(&db.pool, user.id, "Read", 20, Some("pages")).await?;
    assert_eq!(habit.unit_label(), "pages");
    assert_eq!(Habit::unlogged_on(&db.pool, user.id, day(1)).await?.len(), 1);

    let habit = Habit::log_progress(&db.pool, &habit, day(1), 20).await?;
    let habit = Habit::log_progress(&db.pool, &habit, day(2), 25).await?;
    assert_eq!(habit.streak_count, 2);
    assert_eq!(habit.best_streak, 2);
    assert!(Habit::unlogged_on(&db.pool, user.id, day(2)).await?.is_empty());

    // Below target on day 3 breaks the streak but keeps the best
    let habit = Habit::log_progress(&db.pool, &habit, day(3), 5).await?;
    assert_eq!(habit.streak_count, 0);
    assert_eq!(habit.best_streak, 2);

    // Logging the same day again replaces the value
    let habit = Habit::log_progress(&db.pool, &habit, day(3), 30).await?;
    assert_eq!(habit.streak_count, 3);
    let logs = HabitLog::list_for_habit(&db.pool, habit.id, 10).await?;
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].log_date, "2025-01-03");
    assert_eq!(logs[0].value, 30);
    assert_eq!(HabitLog::count_since(&db.pool, user.id, day(2)).await?, 2);

    assert!(Habit::archive(&db.pool, habit.id, user.id).await?);
    assert_eq!(Habit::count_active(&db.pool, user.id).await?, 0);
    assert!(Habit::unlogged_on(&db.pool, user.id, day(4)).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_notes_search_and_pin() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;
    let user = create_user(&db, 1008).await?;
    let other = create_user(&db, 1009).await?;

    let milk = Note::create(&db.pool, user.id, "Shopping", "Buy oat milk", None, &["groceries".to_string()]).await?;
    let idea = Note::create(&db.pool, user.id, "Idea", "A bot for habits", Some("ideas"), &[]).await?;
    Note::create(&db.pool, other.id, "Shopping", "Buy oat milk", None, &[]).await?;

    assert_eq!(milk.tag_list(), vec!["groceries".to_string()]);
    assert!(idea.tag_list().is_empty());

    let found = Note::search(&db.pool, user.id, "OAT", 10).await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, milk.id);
    assert_eq!(Note::search(&db.pool, user.id, "groceries", 10).await?.len(), 1);

    assert_eq!(Note::toggle_pin(&db.pool, idea.id, user.id).await?, Some(true));
    assert_eq!(Note::toggle_pin(&db.pool, idea.id, other.id).await?, None);
    let listed = Note::list(&db.pool, user.id, 10).await?;
    assert_eq!(listed[0].id, idea.id);

    assert!(Note::delete(&db.pool, milk.id, user.id).await?);
    assert!(!Note::delete(&db.pool, milk.id, user.id).await?);

    Ok(())
}

#[tokio::test]
async fn test_note_field_edits() -> Result<()> {
    let (db, _temp_dir) = setup_test_db().await?;
    let user = create_user(&db, 1010).await?;
    let other = create_user(&db, 1011).await?;

    let note = Note::create(&db.pool, user.id, "Books", "Piranesi", Some("reading"), &["fiction".to_string()]).await?;

    let note = Note::update_field(&db.pool, note.id, user.id, NoteField::Title, Some("  Reading list ")).await?.unwrap();
    assert_eq!(note.title, "Reading list");

    let note = Note::update_field(&db.pool, note.id, user.id, NoteField::Tags, Some("#Books, , wishlist")).await?.unwrap();
    assert_eq!(note.tag_list(), vec!["Books".to_string(), "wishlist".to_string()]);
    assert_eq!(Note::search(&db.pool, user.id, "wishlist", 10).await?.len(), 1);

    let note = Note::update_field(&db.pool, note.id, user.id, NoteField::Category, None).await?.unwrap();
    assert_eq!(note.category, None);
    assert_eq!(note.content, "Piranesi");

    // Someone else's note is left alone
    assert!(Note::update_field(&db.pool, note.id, other.id, NoteField::Content, Some("mine now")).await?.is_none());
    let unchanged = Note::find_for_user(&db.pool, note.id, user.id).await?.unwrap();
    assert_eq!(unchanged.content, "Piranesi");

    assert_eq!(NoteField::parse(" Tags "), Some(NoteField::Tags));
    assert_eq!(NoteField::parse("body"), Some(NoteField::Content));
    assert_eq!(NoteField::parse("colour"), None);
    assert!(NoteField::Category.is_clearable());
    assert!(!NoteField::Title.is_clearable());

    Ok(())
}

#[tokio::test]
async fn test_database_url_without_directory() {
    let temp_dir = tempdir().unwrap();
    let nested = temp_dir.path().join("nested").join("dir").join("bot.db");

    let db = assert_ok!(DatabaseManager::new(&format!("sqlite:{}", nested.display())).await);
    assert_ok!(db.run_migrations().await);
    assert!(nested.exists());
}
