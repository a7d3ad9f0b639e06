use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::database::{connection::DatabaseManager, models::*};
use crate::services::notification::NotificationService;
use crate::services::timezone::UserTimezone;
use crate::utils::logging::log_database_operation;
use crate::utils::validation::{validate_description, validate_title};

/// Snooze length when none is configured.
pub const DEFAULT_SNOOZE_MINUTES: i64 = 15;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("I couldn't understand '{0}' as a time")]
    UnrecognizedTime(String),
    #[error("{0} is not in the future")]
    NotInFuture(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Reminder not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A stored reminder and whether its job made it into the scheduler.
#[derive(Debug, Clone)]
pub struct ScheduledReminder {
    pub reminder: Reminder,
    pub remind_at: DateTime<Utc>,
    /// `false` leaves the row pending; the next startup restore picks it up.
    pub scheduled: bool,
}

/// Parses `input` for `timezone` and insists on a future instant.
pub fn resolve_future_time(
    timezone: &UserTimezone,
    input: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ReminderError> {
    let local = timezone
        .parse_time_input(input, now)
        .ok_or_else(|| ReminderError::UnrecognizedTime(input.trim().to_string()))?;
    let at = local.with_timezone(&Utc);

    if at <= now {
        return Err(ReminderError::NotInFuture(timezone.format(&at)));
    }
    Ok(at)
}

/// Reminder lifecycle: storage plus the matching `reminder_<id>` job.
pub struct ReminderPlanner {
    db: Arc<DatabaseManager>,
    notifications: Arc<NotificationService>,
    snooze: Duration,
}

impl ReminderPlanner {
    pub fn new(db: Arc<DatabaseManager>, notifications: Arc<NotificationService>, snooze_minutes: i64) -> Self {
        Self {
            db,
            notifications,
            snooze: Duration::minutes(snooze_minutes),
        }
    }

    pub fn snooze_minutes(&self) -> i64 {
        self.snooze.num_minutes()
    }

    pub async fn create(
        &self,
        user: &User,
        title: &str,
        description: Option<&str>,
        when: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduledReminder, ReminderError> {
        let title = title.trim();
        validate_title(title).map_err(|e| ReminderError::Invalid(e.to_string()))?;
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        if let Some(description) = description {
            validate_description(description).map_err(|e| ReminderError::Invalid(e.to_string()))?;
        }

        let remind_at = resolve_future_time(&user.timezone(), when, now)?;
        let reminder = Reminder::create(&self.db.pool, user.id, title, description, remind_at).await?;
        log_database_operation("insert", "reminders", Some(&format!("reminder {} for user {}", reminder.id, user.id)));
        let scheduled = self
            .notifications
            .schedule_reminder_notification(reminder.id, remind_at)
            .await;

        if !scheduled {
            tracing::warn!("Reminder {} stored but not scheduled", reminder.id);
        }

        Ok(ScheduledReminder {
            reminder,
            remind_at,
            scheduled,
        })
    }

    /// Moves a reminder to a new time; completed reminders become pending again.
    /// Cancelled reminders are refused.
    pub async fn reschedule(
        &self,
        user: &User,
        reminder_id: i64,
        when: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduledReminder, ReminderError> {
        let remind_at = resolve_future_time(&user.timezone(), when, now)?;
        self.move_to(user, reminder_id, remind_at).await
    }

    pub async fn snooze(&self, user: &User, reminder_id: i64, now: DateTime<Utc>) -> Result<ScheduledReminder, ReminderError> {
        self.move_to(user, reminder_id, now + self.snooze).await
    }

    async fn move_to(
        &self,
        user: &User,
        reminder_id: i64,
        remind_at: DateTime<Utc>,
    ) -> Result<ScheduledReminder, ReminderError> {
        self.owned(user, reminder_id).await?;

        if !Reminder::update_remind_at(&self.db.pool, reminder_id, remind_at).await? {
            return Err(ReminderError::Invalid(
                "This reminder was cancelled. Create a new one with /remind".to_string(),
            ));
        }
        let scheduled = self
            .notifications
            .schedule_reminder_notification(reminder_id, remind_at)
            .await;
        let reminder = self.owned(user, reminder_id).await?;

        Ok(ScheduledReminder {
            reminder,
            remind_at,
            scheduled,
        })
    }

    /// Marks a reminder done and drops any job still waiting for it.
    ///
    /// Completing a delivered reminder again is a no-op; cancelled ones are refused.
    pub async fn complete(&self, user: &User, reminder_id: i64) -> Result<Reminder, ReminderError> {
        let current = self.owned(user, reminder_id).await?;
        if current.status == ReminderStatus::Completed.as_str() {
            return Ok(current);
        }

        if !Reminder::mark_completed(&self.db.pool, reminder_id).await? {
            return Err(ReminderError::Invalid("This reminder was cancelled".to_string()));
        }
        self.notifications.cancel_reminder_notification(reminder_id).await;
        self.owned(user, reminder_id).await
    }

    /// Stops a pending reminder from firing while keeping its row.
    pub async fn cancel(&self, user: &User, reminder_id: i64) -> Result<Reminder, ReminderError> {
        self.owned(user, reminder_id).await?;

        if !Reminder::cancel(&self.db.pool, reminder_id).await? {
            return Err(ReminderError::Invalid("Only pending reminders can be cancelled".to_string()));
        }
        self.notifications.cancel_reminder_notification(reminder_id).await;
        self.owned(user, reminder_id).await
    }

    pub async fn delete(&self, user: &User, reminder_id: i64) -> Result<(), ReminderError> {
        self.owned(user, reminder_id).await?;

        self.notifications.cancel_reminder_notification(reminder_id).await;
        if Reminder::delete(&self.db.pool, reminder_id, user.id).await? {
            log_database_operation("delete", "reminders", Some(&format!("reminder {reminder_id}")));
            Ok(())
        } else {
            Err(ReminderError::NotFound)
        }
    }

    pub async fn list_pending(&self, user: &User, limit: i64) -> Result<Vec<Reminder>, ReminderError> {
        Ok(Reminder::list_pending(&self.db.pool, user.id, limit).await?)
    }

    async fn owned(&self, user: &User, reminder_id: i64) -> Result<Reminder, ReminderError> {
        Reminder::find_for_user(&self.db.pool, reminder_id, user.id)
            .await?
            .ok_or(ReminderError::NotFound)
    }
}
