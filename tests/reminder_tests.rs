#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use productivity_bot::database::{connection::DatabaseManager, models::*};
use productivity_bot::services::delivery::{MessageSender, Messenger, OutboundMessage, SenderFactory};
use productivity_bot::services::notification::NotificationService;
use productivity_bot::services::reminder::{ReminderError, ReminderPlanner};
use productivity_bot::services::scheduler::{JobKey, JobRegistry};
use tempfile::{tempdir, TempDir};

struct Discard;

#[async_trait]
impl MessageSender for Discard {
    async fn send(&self, _message: &OutboundMessage) -> Result<()> {
        Ok(())
    }
}

async fn setup() -> Result<(ReminderPlanner, Arc<NotificationService>, Arc<DatabaseManager>, TempDir)> {
    let temp_dir = tempdir()?;
    let database_url = format!("sqlite:{}", temp_dir.path().join("test.db").display());
    let db = DatabaseManager::new(&database_url).await?;
    db.run_migrations().await?;
    let db = Arc::new(db);

    let fresh: SenderFactory = Arc::new(|| {
        let sender: Arc<dyn MessageSender> = Arc::new(Discard);
        sender
    });
    let messenger = Messenger::new(Arc::new(Discard), fresh);
    let (registry, _fired_rx) = JobRegistry::new().await.map_err(|e| anyhow!(e.to_string()))?;
    let notifications = Arc::new(NotificationService::new(db.clone(), Arc::new(registry), messenger));

    let planner = ReminderPlanner::new(db.clone(), notifications.clone(), 15);
    Ok((planner, notifications, db, temp_dir))
}

async fn user(db: &DatabaseManager, telegram_id: i64) -> Result<User> {
    let profile = TelegramProfile {
        telegram_id,
        username: Some("planner".to_string()),
        first_name: None,
        last_name: None,
        language_code: Some("en".to_string()),
    };
    let (user, _) = User::get_or_create(&db.pool, &profile, "UTC").await?;
    Ok(user)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_create_stores_and_schedules() -> Result<()> {
    let (planner, notifications, db, _temp_dir) = setup().await?;
    let owner = user(&db, 1).await?;
    let now = Utc::now();

    let created = planner
        .create(&owner, "  Call mom  ", Some("about Sunday"), "in 2 hours", now)
        .await?;

    assert!(created.scheduled);
    assert_eq!(created.reminder.title, "Call mom");
    assert_eq!(created.reminder.description.as_deref(), Some("about Sunday"));
    assert!(created.reminder.is_pending());
    assert_eq!(
        notifications.jobs().scheduled_at(JobKey::Reminder(created.reminder.id)).await,
        Some(now + Duration::hours(2))
    );
    assert_eq!(planner.list_pending(&owner, 10).await?.len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_create_rejects_bad_input() -> Result<()> {
    let (planner, notifications, db, _temp_dir) = setup().await?;
    let owner = user(&db, 2).await?;
    let now = Utc::now();

    let err = planner.create(&owner, "Call mom", None, "whenever", now).await.unwrap_err();
    assert!(matches!(err, ReminderError::UnrecognizedTime(ref input) if input == "whenever"));

    let err = planner
        .create(&owner, "Call mom", None, "01-01-2020 at 08:00", now)
        .await
        .unwrap_err();
    assert!(matches!(err, ReminderError::NotInFuture(_)));
    assert!(err.to_string().contains("01-01-2020 at 08:00"));

    let err = planner.create(&owner, "   ", None, "in 5 minutes", now).await.unwrap_err();
    assert!(matches!(err, ReminderError::Invalid(_)));

    assert!(planner.list_pending(&owner, 10).await?.is_empty());
    assert!(notifications.jobs().is_empty().await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reschedule_and_snooze_move_the_job() -> Result<()> {
    let (planner, notifications, db, _temp_dir) = setup().await?;
    let owner = user(&db, 3).await?;
    let now = Utc::now();
    let created = planner.create(&owner, "Stretch", None, "in 10 minutes", now).await?;
    let key = JobKey::Reminder(created.reminder.id);

    let moved = planner.reschedule(&owner, created.reminder.id, "in 3 hours", now).await?;
    assert_eq!(moved.remind_at, now + Duration::hours(3));
    assert_eq!(notifications.jobs().scheduled_at(key).await, Some(moved.remind_at));
    assert_eq!(notifications.jobs().len().await, 1);

    // Snoozing a delivered reminder brings it back
    Reminder::mark_completed(&db.pool, created.reminder.id).await?;
    let snoozed = planner.snooze(&owner, created.reminder.id, now).await?;
    assert_eq!(planner.snooze_minutes(), 15);
    assert_eq!(snoozed.remind_at, now + Duration::minutes(15));
    assert!(snoozed.reminder.is_pending());
    assert_eq!(notifications.jobs().scheduled_at(key).await, Some(snoozed.remind_at));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_complete_and_cancel_drop_the_job() -> Result<()> {
    let (planner, notifications, db, _temp_dir) = setup().await?;
    let owner = user(&db, 4).await?;
    let now = Utc::now();

    let first = planner.create(&owner, "Water plants", None, "in 1 hour", now).await?;
    let second = planner.create(&owner, "Pay rent", None, "tomorrow at 9am", now).await?;

    let completed = planner.complete(&owner, first.reminder.id).await?;
    assert_eq!(completed.status, "completed");
    assert!(!notifications.jobs().is_scheduled(JobKey::Reminder(first.reminder.id)).await);

    let cancelled = planner.cancel(&owner, second.reminder.id).await?;
    assert_eq!(cancelled.status, "cancelled");
    assert!(!notifications.jobs().is_scheduled(JobKey::Reminder(second.reminder.id)).await);

    let err = planner.cancel(&owner, second.reminder.id).await.unwrap_err();
    assert!(matches!(err, ReminderError::Invalid(_)));
    assert!(planner.list_pending(&owner, 10).await?.is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_other_users_reminders_are_off_limits() -> Result<()> {
    let (planner, notifications, db, _temp_dir) = setup().await?;
    let owner = user(&db, 5).await?;
    let stranger = user(&db, 6).await?;
    let now = Utc::now();
    let created = planner.create(&owner, "Secret", None, "in 1 hour", now).await?;
    let id = created.reminder.id;

    assert!(matches!(planner.complete(&stranger, id).await, Err(ReminderError::NotFound)));
    assert!(matches!(planner.cancel(&stranger, id).await, Err(ReminderError::NotFound)));
    assert!(matches!(planner.snooze(&stranger, id, now).await, Err(ReminderError::NotFound)));
    assert!(matches!(
        planner.reschedule(&stranger, id, "in 2 hours", now).await,
        Err(ReminderError::NotFound)
    ));
    assert!(matches!(planner.delete(&stranger, id).await, Err(ReminderError::NotFound)));
    assert!(notifications.jobs().is_scheduled(JobKey::Reminder(id)).await);

    planner.delete(&owner, id).await?;
    assert!(!notifications.jobs().is_scheduled(JobKey::Reminder(id)).await);
    assert!(matches!(planner.delete(&owner, id).await, Err(ReminderError::NotFound)));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_reminder_stays_cancelled() -> Result<()> {
    let (planner, notifications, db, _temp_dir) = setup().await?;
    let owner = user(&db, 7).await?;
    let now = Utc::now();
    let created = planner.create(&owner, "Gym", None, "in 1 hour", now).await?;
    let id = created.reminder.id;
    planner.cancel(&owner, id).await?;

    let err = planner.reschedule(&owner, id, "in 3 hours", now).await.unwrap_err();
    assert!(matches!(err, ReminderError::Invalid(_)));
    assert!(matches!(planner.snooze(&owner, id, now).await, Err(ReminderError::Invalid(_))));
    assert!(matches!(planner.complete(&owner, id).await, Err(ReminderError::Invalid(_))));

    let stored = Reminder::find_by_id(&db.pool, id).await?.unwrap();
    assert_eq!(stored.status, "cancelled");
    assert_eq!(stored.remind_at, created.reminder.remind_at);
    assert!(!notifications.jobs().is_scheduled(JobKey::Reminder(id)).await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completing_a_delivered_reminder_is_harmless() -> Result<()> {
    let (planner, _notifications, db, _temp_dir) = setup().await?;
    let owner = user(&db, 8).await?;
    let created = planner.create(&owner, "Stand up", None, "in 1 hour", Utc::now()).await?;

    Reminder::mark_completed(&db.pool, created.reminder.id).await?;
    let again = planner.complete(&owner, created.reminder.id).await?;
    assert_eq!(again.status, "completed");

    Ok(())
}
