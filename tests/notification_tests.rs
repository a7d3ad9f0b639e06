#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use productivity_bot::database::{connection::DatabaseManager, models::*};
use productivity_bot::services::delivery::{MessageSender, Messenger, OutboundMessage, SenderFactory};
use productivity_bot::services::notification::{NotificationService, RecurringKind};
use productivity_bot::services::scheduler::{FiredJob, JobKey, JobRegistry};
use productivity_bot::services::timezone::UserTimezone;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

#[derive(Default)]
struct Outbox {
    fail: bool,
    sent: Mutex<Vec<OutboundMessage>>,
}

#[async_trait]
impl MessageSender for Outbox {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        if self.fail {
            return Err(anyhow!("telegram unreachable"));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct Harness {
    db: Arc<DatabaseManager>,
    service: Arc<NotificationService>,
    outbox: Arc<Outbox>,
    _temp_dir: TempDir,
}

impl Harness {
    async fn new() -> Result<Self> {
        Self::with_outbox(Outbox::default()).await
    }

    async fn with_outbox(outbox: Outbox) -> Result<Self> {
        let temp_dir = tempdir()?;
        let database_url = format!("sqlite:{}", temp_dir.path().join("test.db").display());
        let db = DatabaseManager::new(&database_url).await?;
        db.run_migrations().await?;
        let db = Arc::new(db);

        let outbox = Arc::new(outbox);
        let retry = outbox.clone();
        let fresh: SenderFactory = Arc::new(move || {
            let sender: Arc<dyn MessageSender> = retry.clone();
            sender
        });
        let messenger = Messenger::new(outbox.clone(), fresh);

        let (registry, _fired_rx) = JobRegistry::new().await.map_err(|e| anyhow!(e.to_string()))?;
        let service = Arc::new(NotificationService::new(db.clone(), Arc::new(registry), messenger));

        Ok(Self {
            db,
            service,
            outbox,
            _temp_dir: temp_dir,
        })
    }

    async fn user(&self, telegram_id: i64) -> Result<User> {
        let profile = TelegramProfile {
            telegram_id,
            username: None,
            first_name: Some("Sam".to_string()),
            last_name: None,
            language_code: None,
        };
        let (user, _) = User::get_or_create(&self.db.pool, &profile, "UTC").await?;
        Ok(user)
    }

    async fn reload(&self, user: &User) -> Result<User> {
        Ok(User::find_by_id(&self.db.pool, user.id).await?.unwrap())
    }

    fn sent(&self) -> Vec<OutboundMessage> {
        self.outbox.sent.lock().unwrap().clone()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_setup_registers_enabled_jobs_and_pending_reminders() -> Result<()> {
    let h = Harness::new().await?;
    let alice = h.user(1).await?;
    let bob = h.user(2).await?;
    let carol = h.user(3).await?;

    User::toggle_preference(&h.db.pool, bob.id, NotificationPreference::WeeklySummaries).await?;
    User::set_status(&h.db.pool, carol.id, UserStatus::Inactive).await?;

    let pending = Reminder::create(&h.db.pool, alice.id, "Call mom", None, Utc::now() + Duration::hours(1)).await?;
    let done = Reminder::create(&h.db.pool, alice.id, "Old", None, Utc::now() + Duration::hours(1)).await?;
    Reminder::mark_completed(&h.db.pool, done.id).await?;

    let report = h.service.setup_notifications().await;

    assert_eq!(report.users, 2);
    assert_eq!(report.recurring, 5);
    assert_eq!(report.reminders, 1);
    assert_eq!(report.failed, 0);

    let jobs = h.service.jobs();
    for kind in RecurringKind::ALL {
        assert!(jobs.is_scheduled(kind.key(alice.id)).await);
        assert!(!jobs.is_scheduled(kind.key(carol.id)).await);
    }
    assert!(!jobs.is_scheduled(JobKey::WeeklySummary(bob.id)).await);
    assert!(jobs.is_scheduled(JobKey::Reminder(pending.id)).await);
    assert!(!jobs.is_scheduled(JobKey::Reminder(done.id)).await);

    // Running it again replaces instead of duplicating
    h.service.setup_notifications().await;
    assert_eq!(jobs.len().await, 6);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recurring_jobs_fire_at_local_times() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(10).await?;
    User::set_timezone(&h.db.pool, user.id, &UserTimezone::parse("Asia/Kolkata").unwrap()).await?;
    let user = h.reload(&user).await?;

    h.service.ensure_user_jobs(&user).await;

    let habit_at = h.service.jobs().scheduled_at(JobKey::HabitReminder(user.id)).await.unwrap();
    let deadline_at = h.service.jobs().scheduled_at(JobKey::TaskDeadline(user.id)).await.unwrap();
    let summary_at = h.service.jobs().scheduled_at(JobKey::WeeklySummary(user.id)).await.unwrap();

    // Kolkata is UTC+5:30 all year.
    assert_eq!(habit_at.format("%H:%M").to_string(), "03:30");
    assert_eq!(deadline_at.format("%H:%M").to_string(), "02:30");
    assert_eq!(summary_at.format("%H:%M").to_string(), "04:30");
    assert!(habit_at > Utc::now());
    assert!(habit_at <= Utc::now() + Duration::days(1));
    assert!(summary_at <= Utc::now() + Duration::days(7));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_preference_switch_cancels_and_restores() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(20).await?;
    h.service.ensure_user_jobs(&user).await;
    let key = JobKey::TaskDeadline(user.id);
    assert!(h.service.jobs().is_scheduled(key).await);

    let enabled = User::toggle_preference(&h.db.pool, user.id, NotificationPreference::TaskDeadlines).await?;
    let user = h.reload(&user).await?;
    h.service.apply_preference(&user, NotificationPreference::TaskDeadlines, enabled).await;
    assert!(!h.service.jobs().is_scheduled(key).await);

    // Re-syncing keeps the disabled kind off
    h.service.ensure_user_jobs(&user).await;
    assert!(!h.service.jobs().is_scheduled(key).await);
    assert!(h.service.jobs().is_scheduled(JobKey::HabitReminder(user.id)).await);

    let enabled = User::toggle_preference(&h.db.pool, user.id, NotificationPreference::TaskDeadlines).await?;
    let user = h.reload(&user).await?;
    h.service.apply_preference(&user, NotificationPreference::TaskDeadlines, enabled).await;
    assert!(h.service.jobs().is_scheduled(key).await);

    // The reminder switch has no recurring job of its own
    let before = h.service.jobs().len().await;
    h.service.apply_preference(&user, NotificationPreference::Reminders, false).await;
    assert_eq!(h.service.jobs().len().await, before);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reminder_is_delivered_once() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(30).await?;
    let reminder = Reminder::create(&h.db.pool, user.id, "Call mom", Some("Sunday plans"), Utc::now()).await?;

    h.service.send_reminder_notification_job(reminder.id).await;
    h.service.send_reminder_notification_job(reminder.id).await;

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, 30);
    assert!(sent[0].text.contains("Call mom"));
    assert_eq!(sent[0].buttons[0][0].callback_data, format!("reminder_done_{}", reminder.id));
    assert_eq!(sent[0].buttons[0][1].callback_data, format!("reminder_snooze_{}", reminder.id));

    let stored = Reminder::find_by_id(&h.db.pool, reminder.id).await?.unwrap();
    assert_eq!(stored.status, "completed");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reminder_respects_switch_and_status() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(31).await?;

    let cancelled = Reminder::create(&h.db.pool, user.id, "Cancelled", None, Utc::now()).await?;
    Reminder::cancel(&h.db.pool, cancelled.id).await?;
    h.service.send_reminder_notification_job(cancelled.id).await;

    User::toggle_preference(&h.db.pool, user.id, NotificationPreference::Reminders).await?;
    let muted = Reminder::create(&h.db.pool, user.id, "Muted", None, Utc::now()).await?;
    h.service.send_reminder_notification_job(muted.id).await;

    // Missing reminder is a no-op
    h.service.send_reminder_notification_job(9999).await;

    assert!(h.sent().is_empty());
    assert!(Reminder::find_by_id(&h.db.pool, muted.id).await?.unwrap().is_pending());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fired_job_dispatch_skips_stale_fires() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(40).await?;
    let reminder = Reminder::create(&h.db.pool, user.id, "Stretch", None, Utc::now() + Duration::hours(1)).await?;
    let key = JobKey::Reminder(reminder.id);

    assert!(h.service.schedule_reminder_notification(reminder.id, Utc::now() + Duration::hours(1)).await);
    let job_id = h.service.jobs().job_id(key).await.unwrap();

    h.service.handle_fired(FiredJob { key, job_id: Uuid::new_v4() }).await;
    assert!(h.sent().is_empty());
    assert!(h.service.jobs().is_scheduled(key).await);

    h.service.handle_fired(FiredJob { key, job_id }).await;
    assert_eq!(h.sent().len(), 1);
    assert!(!h.service.jobs().is_scheduled(key).await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_reminder_notification() -> Result<()> {
    let h = Harness::new().await?;

    assert!(h.service.schedule_reminder_notification(77, Utc::now() + Duration::hours(3)).await);
    assert!(h.service.cancel_reminder_notification(77).await);
    assert!(!h.service.cancel_reminder_notification(77).await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_habit_check_in_lists_unlogged_habits_and_reschedules() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(50).await?;
    let read = Habit::create(&h.db.pool, user.id, "Read", 20, Some("pages")).await?;
    let water = Habit::create(&h.db.pool, user.id, "Water", 8, Some("glasses")).await?;
    let today = user.timezone().local_date(Utc::now());
    Habit::log_progress(&h.db.pool, &read, today, 20).await?;

    h.service.send_habit_reminder_job(user.id).await;

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Water"));
    assert!(!sent[0].text.contains("Read"));
    assert_eq!(sent[0].buttons[0][0].callback_data, format!("habit_log_{}", water.id));
    assert_eq!(sent[0].buttons.last().unwrap()[0].callback_data, "show_habits");
    assert!(h.service.jobs().is_scheduled(JobKey::HabitReminder(user.id)).await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recurring_job_without_content_still_reschedules() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(51).await?;

    h.service.send_habit_reminder_job(user.id).await;
    h.service.send_task_deadline_job(user.id).await;

    assert!(h.sent().is_empty());
    assert!(h.service.jobs().is_scheduled(JobKey::HabitReminder(user.id)).await);
    assert!(h.service.jobs().is_scheduled(JobKey::TaskDeadline(user.id)).await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_task_deadline_sweep() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(60).await?;
    let now = Utc::now();

    for (title, due) in [("Submit invoice", now + Duration::hours(3)), ("Plan trip", now + Duration::days(4))] {
        Task::create(
            &h.db.pool,
            user.id,
            &NewTask {
                title: title.to_string(),
                due_date: Some(due),
                ..NewTask::default()
            },
        )
        .await?;
    }

    h.service.send_task_deadline_job(user.id).await;

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Submit invoice"));
    assert!(!sent[0].text.contains("Plan trip"));
    assert_eq!(sent[0].buttons[0][0].callback_data, "show_tasks");
    assert!(h.service.jobs().is_scheduled(JobKey::TaskDeadline(user.id)).await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_weekly_summary() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(70).await?;
    Note::create(&h.db.pool, user.id, "Idea", "Write more tests", None, &[]).await?;

    h.service.send_weekly_summary_job(user.id).await;

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Weekly Summary"));
    assert!(sent[0].text.contains("1 written"));
    assert!(h.service.jobs().is_scheduled(JobKey::WeeklySummary(user.id)).await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_opted_out_or_missing_user_gets_nothing() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(80).await?;
    User::toggle_preference(&h.db.pool, user.id, NotificationPreference::WeeklySummaries).await?;

    h.service.send_weekly_summary_job(user.id).await;
    h.service.send_habit_reminder_job(424242).await;

    assert!(h.sent().is_empty());
    assert!(!h.service.jobs().is_scheduled(JobKey::WeeklySummary(user.id)).await);
    assert!(!h.service.jobs().is_scheduled(JobKey::HabitReminder(424242)).await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delivery_failure_keeps_the_chain_alive() -> Result<()> {
    let h = Harness::with_outbox(Outbox {
        fail: true,
        ..Outbox::default()
    })
    .await?;
    let user = h.user(90).await?;
    Note::create(&h.db.pool, user.id, "Idea", "Anything", None, &[]).await?;

    h.service.send_weekly_summary_job(user.id).await;
    assert!(h.sent().is_empty());
    assert!(h.service.jobs().is_scheduled(JobKey::WeeklySummary(user.id)).await);

    assert!(!h.service.send_custom_notification(user.id, "hello", Vec::new()).await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_custom_notification() -> Result<()> {
    let h = Harness::new().await?;
    let user = h.user(100).await?;

    assert!(h.service.send_custom_notification(user.id, "📣 Maintenance tonight", Vec::new()).await);
    assert!(!h.service.send_custom_notification(9999, "nobody", Vec::new()).await);

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, 100);

    Ok(())
}

#[test]
fn test_next_occurrence_is_stable_for_the_same_instant() {
    let kolkata = UserTimezone::parse("Asia/Kolkata").unwrap();
    let now = chrono::DateTime::parse_from_rfc3339("2025-01-01T20:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    for kind in RecurringKind::ALL {
        let first = kind.next_occurrence(now, &kolkata);
        let second = kind.next_occurrence(now, &kolkata);
        assert!(first.is_some());
        assert_eq!(first, second, "{kind:?}");
    }

    assert_eq!(
        RecurringKind::HabitReminder.next_occurrence(now, &kolkata),
        Some(chrono::DateTime::parse_from_rfc3339("2025-01-02T03:30:00Z").unwrap().with_timezone(&Utc))
    );
}
