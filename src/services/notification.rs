//! Per-user notification scheduling and the fired-job handlers.
//!
//! Recurring notifications chain themselves: each handler does its work and
//! then registers the next occurrence under the same key. A failing body
//! never breaks the chain, and a failure for one user never touches another.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::database::connection::DatabaseManager;
use crate::database::models::{Habit, NotificationPreference, Reminder, Task, User};
use crate::services::delivery::{InlineButton, Messenger, OutboundMessage};
use crate::services::digest::{compose_habit_check_in, compose_reminder, compose_task_deadlines, WeeklyDigest};
use crate::services::scheduler::{FiredJob, JobKey, JobRegistry};
use crate::services::timezone::UserTimezone;
use crate::utils::datetime::localize;
use crate::utils::logging::{log_database_error, log_job_error, log_job_event, log_system_event};

/// Next `hour:minute` local time strictly after `now`.
pub fn next_daily_occurrence<T: TimeZone>(
    now: DateTime<Utc>,
    tz: &T,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Utc>> {
    let local_now = now.with_timezone(tz);
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let today = local_now.date_naive();

    let candidate = localize(tz, today.and_time(time))?;
    let next = if candidate > local_now {
        candidate
    } else {
        localize(tz, today.succ_opt()?.and_time(time))?
    };
    Some(next.with_timezone(&Utc))
}

/// Next `weekday` at `hour:minute` local time strictly after `now`.
///
/// On the target weekday itself the occurrence is today until the target
/// time is reached, and a week later from then on.
pub fn next_weekly_occurrence<T: TimeZone>(
    now: DateTime<Utc>,
    tz: &T,
    weekday: Weekday,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Utc>> {
    let local_now = now.with_timezone(tz);
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;

    let mut days_ahead = (7 + weekday.num_days_from_monday() - local_now.weekday().num_days_from_monday()) % 7;
    if days_ahead == 0 && local_now.time() >= time {
        days_ahead = 7;
    }

    let date = local_now.date_naive() + Duration::days(i64::from(days_ahead));
    let mut next = localize(tz, date.and_time(time))?;
    if next <= local_now {
        next = localize(tz, (date + Duration::days(7)).and_time(time))?;
    }
    Some(next.with_timezone(&Utc))
}

/// The three notifications that repeat for every opted-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurringKind {
    /// Daily at 09:00 local
    HabitReminder,
    /// Sundays at 10:00 local
    WeeklySummary,
    /// Daily at 08:00 local
    TaskDeadline,
}

impl RecurringKind {
    pub const ALL: [RecurringKind; 3] = [
        RecurringKind::HabitReminder,
        RecurringKind::WeeklySummary,
        RecurringKind::TaskDeadline,
    ];

    pub fn key(self, user_id: i64) -> JobKey {
        match self {
            RecurringKind::HabitReminder => JobKey::HabitReminder(user_id),
            RecurringKind::WeeklySummary => JobKey::WeeklySummary(user_id),
            RecurringKind::TaskDeadline => JobKey::TaskDeadline(user_id),
        }
    }

    pub fn preference(self) -> NotificationPreference {
        match self {
            RecurringKind::HabitReminder => NotificationPreference::HabitReminders,
            RecurringKind::WeeklySummary => NotificationPreference::WeeklySummaries,
            RecurringKind::TaskDeadline => NotificationPreference::TaskDeadlines,
        }
    }

    /// `None` for one-off reminders, which are not recurring.
    pub fn from_preference(preference: NotificationPreference) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.preference() == preference)
    }

    pub fn next_occurrence(self, now: DateTime<Utc>, timezone: &UserTimezone) -> Option<DateTime<Utc>> {
        match timezone {
            UserTimezone::Named(tz) => self.next_in(now, tz),
            UserTimezone::Fixed(offset) => self.next_in(now, offset),
        }
    }

    fn next_in<T: TimeZone>(self, now: DateTime<Utc>, tz: &T) -> Option<DateTime<Utc>> {
        match self {
            RecurringKind::HabitReminder => next_daily_occurrence(now, tz, 9, 0),
            RecurringKind::WeeklySummary => next_weekly_occurrence(now, tz, Weekday::Sun, 10, 0),
            RecurringKind::TaskDeadline => next_daily_occurrence(now, tz, 8, 0),
        }
    }
}

/// What startup scheduling managed to register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub users: usize,
    pub recurring: usize,
    pub reminders: usize,
    pub failed: usize,
}

pub struct NotificationService {
    db: Arc<DatabaseManager>,
    jobs: Arc<JobRegistry>,
    messenger: Messenger,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseManager>, jobs: Arc<JobRegistry>, messenger: Messenger) -> Self {
        Self { db, jobs, messenger }
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Consumes fired jobs for the life of the process.
    ///
    /// Each job runs on its own task so a slow or failing handler cannot
    /// hold up the others.
    pub fn spawn_dispatcher(self: Arc<Self>, mut fired_rx: mpsc::UnboundedReceiver<FiredJob>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(fired) = fired_rx.recv().await {
                let service = Arc::clone(&self);
                tokio::spawn(async move {
                    service.handle_fired(fired).await;
                });
            }
            log_system_event("Notification dispatcher stopped", None);
        })
    }

    pub async fn handle_fired(&self, fired: FiredJob) {
        if !self.jobs.complete(&fired).await {
            log_job_event("skipped stale", &fired.key.to_string(), None);
            return;
        }
        log_job_event("fired", &fired.key.to_string(), None);

        match fired.key {
            JobKey::Reminder(reminder_id) => self.send_reminder_notification_job(reminder_id).await,
            JobKey::HabitReminder(user_id) => self.send_habit_reminder_job(user_id).await,
            JobKey::WeeklySummary(user_id) => self.send_weekly_summary_job(user_id).await,
            JobKey::TaskDeadline(user_id) => self.send_task_deadline_job(user_id).await,
        }
    }

    /// Registers recurring jobs for every active user and restores pending
    /// reminders. Runs once at startup.
    pub async fn setup_notifications(&self) -> SetupReport {
        let now = Utc::now();
        let mut report = SetupReport::default();

        match User::find_active(&self.db.pool).await {
            Ok(users) => {
                report.users = users.len();
                for user in &users {
                    for kind in RecurringKind::ALL {
                        if !user.preference(kind.preference()) {
                            continue;
                        }
                        if self.schedule_recurring(kind, user, now).await {
                            report.recurring += 1;
                        } else {
                            report.failed += 1;
                        }
                    }
                }
            }
            Err(e) => log_database_error("select", "users", &e.to_string(), Some("startup scheduling")),
        }

        match Reminder::all_pending(&self.db.pool).await {
            Ok(reminders) => {
                for reminder in reminders {
                    let Some(remind_at) = reminder.remind_at_utc() else {
                        warn!("Reminder {} has unreadable time '{}'", reminder.id, reminder.remind_at);
                        report.failed += 1;
                        continue;
                    };
                    if self.schedule_reminder_notification(reminder.id, remind_at).await {
                        report.reminders += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
            Err(e) => log_database_error("select", "reminders", &e.to_string(), Some("startup restore")),
        }

        log_system_event(
            "Notifications scheduled",
            Some(&format!(
                "{} users, {} recurring jobs, {} reminders, {} failures",
                report.users, report.recurring, report.reminders, report.failed
            )),
        );
        report
    }

    /// Registers the next occurrence of `kind` for `user` after `now`.
    ///
    /// Errors are logged and reported as `false`.
    pub async fn schedule_recurring(&self, kind: RecurringKind, user: &User, now: DateTime<Utc>) -> bool {
        let key = kind.key(user.id);

        let Some(fire_at) = kind.next_occurrence(now, &user.timezone()) else {
            log_job_error("compute", &key.to_string(), "no valid local time");
            return false;
        };

        match self.jobs.schedule_at(key, fire_at).await {
            Ok(_) => true,
            Err(e) => {
                log_job_error("register", &key.to_string(), &e.to_string());
                false
            }
        }
    }

    pub async fn schedule_next_habit_reminder(&self, user: &User) -> bool {
        self.schedule_recurring(RecurringKind::HabitReminder, user, Utc::now()).await
    }

    pub async fn schedule_next_weekly_summary(&self, user: &User) -> bool {
        self.schedule_recurring(RecurringKind::WeeklySummary, user, Utc::now()).await
    }

    pub async fn schedule_next_task_deadline(&self, user: &User) -> bool {
        self.schedule_recurring(RecurringKind::TaskDeadline, user, Utc::now()).await
    }

    /// Brings a user's recurring jobs in line with their switches: enabled
    /// kinds are (re)registered, disabled ones cancelled. Used for new users
    /// and after a timezone change.
    pub async fn ensure_user_jobs(&self, user: &User) {
        let now = Utc::now();
        for kind in RecurringKind::ALL {
            if user.preference(kind.preference()) {
                self.schedule_recurring(kind, user, now).await;
            } else {
                self.cancel_job(kind.key(user.id)).await;
            }
        }
    }

    /// Reacts to a switch being flipped.
    ///
    /// Turning a recurring kind off cancels its job at once; the reminder
    /// switch is checked when each reminder fires.
    pub async fn apply_preference(&self, user: &User, preference: NotificationPreference, enabled: bool) {
        let Some(kind) = RecurringKind::from_preference(preference) else {
            return;
        };

        if enabled {
            self.schedule_recurring(kind, user, Utc::now()).await;
        } else {
            self.cancel_job(kind.key(user.id)).await;
        }
    }

    /// Registers a one-off reminder; a past time fires immediately.
    pub async fn schedule_reminder_notification(&self, reminder_id: i64, remind_at: DateTime<Utc>) -> bool {
        let key = JobKey::Reminder(reminder_id);
        match self.jobs.schedule_at(key, remind_at).await {
            Ok(_) => true,
            Err(e) => {
                log_job_error("register", &key.to_string(), &e.to_string());
                false
            }
        }
    }

    pub async fn cancel_reminder_notification(&self, reminder_id: i64) -> bool {
        self.cancel_job(JobKey::Reminder(reminder_id)).await
    }

    async fn cancel_job(&self, key: JobKey) -> bool {
        match self.jobs.cancel(key).await {
            Ok(removed) => removed,
            Err(e) => {
                log_job_error("cancel", &key.to_string(), &e.to_string());
                false
            }
        }
    }

    /// Loads the recipient of a notification, or `None` when it must not be sent.
    async fn load_recipient(&self, user_id: i64, preference: NotificationPreference) -> Option<User> {
        match User::find_by_id(&self.db.pool, user_id).await {
            Ok(Some(user)) if user.is_active() && user.preference(preference) => Some(user),
            Ok(Some(_)) => {
                info!("User {} is inactive or opted out of {}", user_id, preference.label());
                None
            }
            Ok(None) => {
                warn!("User {} no longer exists", user_id);
                None
            }
            Err(e) => {
                log_database_error("select", "users", &e.to_string(), Some(&format!("user {user_id}")));
                None
            }
        }
    }

    pub async fn send_habit_reminder_job(&self, user_id: i64) {
        let Some(user) = self.load_recipient(user_id, NotificationPreference::HabitReminders).await else {
            return;
        };

        let now = Utc::now();
        let today = user.timezone().local_date(now);
        match Habit::unlogged_on(&self.db.pool, user.id, today).await {
            Ok(habits) if habits.is_empty() => info!("User {} has no habits left for today", user.id),
            Ok(habits) => {
                self.messenger
                    .deliver(&compose_habit_check_in(user.telegram_id, &habits))
                    .await;
            }
            Err(e) => error!("Habit check-in for user {} failed: {}", user.id, e),
        }

        self.schedule_next_habit_reminder(&user).await;
    }

    pub async fn send_weekly_summary_job(&self, user_id: i64) {
        let Some(user) = self.load_recipient(user_id, NotificationPreference::WeeklySummaries).await else {
            return;
        };

        let now = Utc::now();
        match WeeklyDigest::collect(&self.db.pool, user.id, now).await {
            Ok(digest) => {
                self.messenger.deliver(&digest.to_message(user.telegram_id)).await;
            }
            Err(e) => error!("Weekly summary for user {} failed: {}", user.id, e),
        }

        self.schedule_next_weekly_summary(&user).await;
    }

    pub async fn send_task_deadline_job(&self, user_id: i64) {
        let Some(user) = self.load_recipient(user_id, NotificationPreference::TaskDeadlines).await else {
            return;
        };

        let now = Utc::now();
        match Task::due_between(&self.db.pool, user.id, now, now + Duration::days(1)).await {
            Ok(tasks) if tasks.is_empty() => info!("User {} has no deadlines in the next day", user.id),
            Ok(tasks) => {
                self.messenger
                    .deliver(&compose_task_deadlines(user.telegram_id, &tasks, now))
                    .await;
            }
            Err(e) => error!("Deadline sweep for user {} failed: {}", user.id, e),
        }

        self.schedule_next_task_deadline(&user).await;
    }

    /// Delivers a one-off reminder at most once.
    ///
    /// The reminder is claimed (pending to completed) before sending, so a
    /// duplicate fire or a restart finds nothing left to deliver.
    pub async fn send_reminder_notification_job(&self, reminder_id: i64) {
        let reminder = match Reminder::find_by_id(&self.db.pool, reminder_id).await {
            Ok(Some(reminder)) => reminder,
            Ok(None) => {
                warn!("Reminder {} no longer exists", reminder_id);
                return;
            }
            Err(e) => {
                log_database_error("select", "reminders", &e.to_string(), Some(&format!("reminder {reminder_id}")));
                return;
            }
        };

        if !reminder.is_pending() {
            info!("Reminder {} is {}, nothing to send", reminder.id, reminder.status);
            return;
        }

        let Some(user) = self.load_recipient(reminder.user_id, NotificationPreference::Reminders).await else {
            return;
        };

        match Reminder::mark_completed(&self.db.pool, reminder.id).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Reminder {} was already delivered", reminder.id);
                return;
            }
            Err(e) => {
                log_database_error("update", "reminders", &e.to_string(), Some(&format!("reminder {}", reminder.id)));
                return;
            }
        }

        let message = compose_reminder(user.telegram_id, &reminder, &user.timezone());
        if self.messenger.deliver(&message).await {
            log_job_event("delivered", &JobKey::Reminder(reminder.id).to_string(), None);
        } else {
            error!("Reminder {} could not be delivered to user {}", reminder.id, user.id);
        }
    }

    /// Sends an ad-hoc MarkdownV2 message to a user by internal id.
    pub async fn send_custom_notification(&self, user_id: i64, text: &str, buttons: Vec<Vec<InlineButton>>) -> bool {
        match User::find_by_id(&self.db.pool, user_id).await {
            Ok(Some(user)) => {
                let message = OutboundMessage::new(user.telegram_id, text).with_buttons(buttons);
                self.messenger.deliver(&message).await
            }
            Ok(None) => {
                warn!("Cannot notify missing user {}", user_id);
                false
            }
            Err(e) => {
                log_database_error("select", "users", &e.to_string(), Some(&format!("user {user_id}")));
                false
            }
        }
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.jobs.shutdown().await {
            error!("Scheduler shutdown failed: {}", e);
        }
        log_system_event("Notification scheduler stopped", None);
    }
}
