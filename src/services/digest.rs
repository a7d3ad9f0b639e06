//! Notification bodies and the weekly productivity digest.
//!
//! Everything here renders MarkdownV2; user-supplied text is escaped.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};

use crate::database::models::{Habit, HabitLog, Note, Reminder, Task};
use crate::services::delivery::{InlineButton, OutboundMessage};
use crate::services::timezone::UserTimezone;
use crate::utils::markdown::{bold, escape_markdown};
use crate::utils::text::percentage;

/// Most habits offered as one-tap buttons in a check-in.
const CHECK_IN_BUTTONS: usize = 5;

/// Monday 00:00 UTC of the week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date_naive() - Duration::days(days_since_monday);
    monday.and_time(NaiveTime::MIN).and_utc()
}

/// Counts behind the Sunday summary and `/stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyDigest {
    pub week_start: DateTime<Utc>,
    pub tasks_created: i64,
    pub tasks_completed: i64,
    pub reminders_created: i64,
    pub reminders_completed: i64,
    pub active_habits: i64,
    pub habit_logs: i64,
    pub notes_created: i64,
}

impl WeeklyDigest {
    pub async fn collect(pool: &sqlx::SqlitePool, user_id: i64, now: DateTime<Utc>) -> Result<Self, sqlx::Error> {
        let since = week_start(now);

        Ok(Self {
            week_start: since,
            tasks_created: Task::count_created_since(pool, user_id, since).await?,
            tasks_completed: Task::count_completed_since(pool, user_id, since).await?,
            reminders_created: Reminder::count_created_since(pool, user_id, since).await?,
            reminders_completed: Reminder::count_completed_since(pool, user_id, since).await?,
            active_habits: Habit::count_active(pool, user_id).await?,
            habit_logs: HabitLog::count_since(pool, user_id, since.date_naive()).await?,
            notes_created: Note::count_created_since(pool, user_id, since).await?,
        })
    }

    pub fn task_rate(&self) -> f64 {
        percentage(self.tasks_completed, self.tasks_created)
    }

    /// Logged habit-days against one log per active habit per day.
    pub fn habit_rate(&self) -> f64 {
        percentage(self.habit_logs, self.active_habits * 7)
    }

    /// Average of the task and habit rates.
    pub fn overall_score(&self) -> f64 {
        (self.task_rate() + self.habit_rate()) / 2.0
    }

    pub fn performance(&self) -> (&'static str, &'static str) {
        let score = self.overall_score();
        if score >= 80.0 {
            ("🔥", "Excellent")
        } else if score >= 60.0 {
            ("👍", "Good job")
        } else if score >= 40.0 {
            ("💪", "Keep going")
        } else {
            ("📈", "Room for improvement")
        }
    }

    /// The Sunday notification.
    pub fn render_summary(&self) -> String {
        let week_of = self.week_start.format("%B %d, %Y").to_string();
        let (emoji, verdict) = self.performance();

        let mut text = format!("📊 *Weekly Summary*\n_Week of {}_\n\n", escape_markdown(&week_of));
        text.push_str(&format!(
            "✅ *Tasks:* {}/{} completed {}\n",
            self.tasks_completed,
            self.tasks_created,
            escape_markdown(&format!("({:.1}%)", self.task_rate()))
        ));
        text.push_str(&format!(
            "🎯 *Habits:* {}/{} check\\-ins {}\n",
            self.habit_logs,
            self.active_habits * 7,
            escape_markdown(&format!("({:.1}%)", self.habit_rate()))
        ));
        text.push_str(&format!(
            "⏰ *Reminders:* {} set, {} done\n",
            self.reminders_created, self.reminders_completed
        ));
        text.push_str(&format!("📝 *Notes:* {} written\n\n", self.notes_created));
        text.push_str(&format!("{} {}\\!", emoji, bold(verdict)));
        text
    }

    /// The longer `/stats` view.
    pub fn render_report(&self, display_name: &str) -> String {
        let (emoji, verdict) = self.performance();

        let mut text = format!("📈 *Statistics for {}*\n\n", escape_markdown(display_name));
        text.push_str("*This week*\n");
        text.push_str(&format!(
            "• Tasks created: {}\n• Tasks completed: {}\n",
            self.tasks_created, self.tasks_completed
        ));
        text.push_str(&format!(
            "• Reminders set: {}\n• Reminders done: {}\n",
            self.reminders_created, self.reminders_completed
        ));
        text.push_str(&format!(
            "• Habit check\\-ins: {} of {}\n• Notes written: {}\n\n",
            self.habit_logs,
            self.active_habits * 7,
            self.notes_created
        ));
        text.push_str(&format!(
            "*Score:* {}\n{} {}",
            escape_markdown(&format!("{:.1}%", self.overall_score())),
            emoji,
            escape_markdown(verdict)
        ));
        text
    }

    pub fn to_message(&self, chat_id: i64) -> OutboundMessage {
        OutboundMessage::new(chat_id, self.render_summary())
            .with_buttons(vec![vec![InlineButton::new("📈 Full stats", "show_stats")]])
    }
}

/// Daily nudge listing habits not yet logged today.
pub fn compose_habit_check_in(chat_id: i64, habits: &[Habit]) -> OutboundMessage {
    let mut text = String::from("🌅 *Good morning\\!* Time for your daily habits:\n\n");
    for habit in habits {
        text.push_str(&format!(
            "• {} {}\n",
            bold(&habit.name),
            escape_markdown(&format!("({} {})", habit.target_value, habit.unit_label()))
        ));
    }
    text.push_str("\nTap a habit once it's done\\.");

    let mut rows: Vec<Vec<InlineButton>> = habits
        .iter()
        .take(CHECK_IN_BUTTONS)
        .map(|habit| vec![InlineButton::new(format!("✅ {}", habit.name), format!("habit_log_{}", habit.id))])
        .collect();
    rows.push(vec![InlineButton::new("🎯 All habits", "show_habits")]);

    OutboundMessage::new(chat_id, text).with_buttons(rows)
}

/// "Due now!" inside the hour, otherwise whole hours left.
pub fn describe_time_left(due: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = (due - now).num_hours();
    match hours {
        h if h <= 0 => "Due now!".to_string(),
        1 => "Due in 1 hour".to_string(),
        h => format!("Due in {h} hours"),
    }
}

/// Morning list of open tasks due within the next day.
pub fn compose_task_deadlines(chat_id: i64, tasks: &[Task], now: DateTime<Utc>) -> OutboundMessage {
    let mut text = String::from("⏰ *Upcoming deadlines*\n\n");
    for task in tasks {
        let when = task
            .due_date_utc()
            .map(|due| describe_time_left(due, now))
            .unwrap_or_default();
        text.push_str(&format!(
            "{} {} \\- {}\n",
            task.priority().emoji(),
            bold(&task.title),
            escape_markdown(&when)
        ));
    }

    OutboundMessage::new(chat_id, text)
        .with_buttons(vec![vec![InlineButton::new("📋 View tasks", "show_tasks")]])
}

/// The message a one-off reminder fires with.
pub fn compose_reminder(chat_id: i64, reminder: &Reminder, timezone: &UserTimezone) -> OutboundMessage {
    let mut text = format!("🔔 *Reminder*\n\n{}", bold(&reminder.title));
    if let Some(description) = reminder.description.as_deref().filter(|d| !d.trim().is_empty()) {
        text.push_str(&format!("\n{}", escape_markdown(description)));
    }
    if let Some(at) = reminder.remind_at_utc() {
        text.push_str(&format!("\n\n🕐 {}", escape_markdown(&timezone.format(&at))));
    }

    OutboundMessage::new(chat_id, text).with_buttons(vec![vec![
        InlineButton::new("✅ Done", format!("reminder_done_{}", reminder.id)),
        InlineButton::new("⏰ Snooze", format!("reminder_snooze_{}", reminder.id)),
    ]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn digest(tasks: (i64, i64), habits: (i64, i64)) -> WeeklyDigest {
        WeeklyDigest {
            week_start: Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap(),
            tasks_created: tasks.0,
            tasks_completed: tasks.1,
            reminders_created: 0,
            reminders_completed: 0,
            active_habits: habits.0,
            habit_logs: habits.1,
            notes_created: 0,
        }
    }

    #[test]
    fn test_week_start_is_monday_midnight() {
        let sunday = Utc.with_ymd_and_hms(2025, 1, 12, 10, 0, 0).unwrap();
        assert_eq!(week_start(sunday), Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap());

        let monday = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn test_performance_levels() {
        assert_eq!(digest((10, 10), (1, 7)).performance().1, "Excellent");
        assert_eq!(digest((10, 6), (1, 5)).performance().1, "Good job");
        assert_eq!(digest((10, 5), (1, 3)).performance().1, "Keep going");
        assert_eq!(digest((0, 0), (0, 0)).performance().1, "Room for improvement");
    }

    #[test]
    fn test_summary_escapes_percentages() {
        let text = digest((4, 2), (1, 7)).render_summary();
        assert!(text.contains("2/4 completed \\(50\\.0%\\)"));
        assert!(text.contains("_Week of January 06, 2025_"));
    }

    #[test]
    fn test_time_left() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(describe_time_left(now + Duration::minutes(30), now), "Due now!");
        assert_eq!(describe_time_left(now + Duration::minutes(90), now), "Due in 1 hour");
        assert_eq!(describe_time_left(now + Duration::hours(5), now), "Due in 5 hours");
    }
}
