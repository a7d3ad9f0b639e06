use chrono::Utc;
use teloxide::prelude::*;

use crate::bot::commands::settings::notifications_keyboard;
use crate::bot::commands::{habits, stats, tasks};
use crate::bot::handlers::{BotHandler, HandlerResult};
use crate::database::models::{Habit, Note, NotificationPreference, Task, User};
use crate::services::reminder::ReminderError;
use crate::utils::logging::log_command_error;

/// Everything an inline button can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    ReminderDone(i64),
    ReminderSnooze(i64),
    ReminderDelete(i64),
    TaskComplete(i64),
    TaskDelete(i64),
    HabitLog(i64),
    NotePin(i64),
    NoteDelete(i64),
    ToggleNotification(NotificationPreference),
    ShowHabits,
    ShowTasks,
    ShowStats,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "show_habits" => return Some(Self::ShowHabits),
            "show_tasks" => return Some(Self::ShowTasks),
            "show_stats" => return Some(Self::ShowStats),
            _ => {}
        }

        if let Some(token) = data.strip_prefix("notif_") {
            return NotificationPreference::from_token(token).map(Self::ToggleNotification);
        }

        let (action, id) = data.rsplit_once('_')?;
        let id: i64 = id.parse().ok().filter(|id| *id > 0)?;
        match action {
            "reminder_done" => Some(Self::ReminderDone(id)),
            "reminder_snooze" => Some(Self::ReminderSnooze(id)),
            "reminder_delete" => Some(Self::ReminderDelete(id)),
            "task_complete" => Some(Self::TaskComplete(id)),
            "task_delete" => Some(Self::TaskDelete(id)),
            "habit_log" => Some(Self::HabitLog(id)),
            "note_pin" => Some(Self::NotePin(id)),
            "note_delete" => Some(Self::NoteDelete(id)),
            _ => None,
        }
    }
}

pub async fn callback_handler(bot: Bot, q: CallbackQuery, ctx: BotHandler) -> HandlerResult {
    let data = q.data.clone().unwrap_or_default();
    tracing::info!("Callback received: '{}' from user {}", data, q.from.id.0);

    let Some(action) = CallbackAction::parse(&data) else {
        bot.answer_callback_query(q.id).text("Unknown action").await?;
        return Ok(());
    };

    let user = match ctx.resolve_user(&q.from).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            bot.answer_callback_query(q.id).await?;
            return Ok(());
        }
        Err(e) => {
            log_command_error("callback", &q.from.first_name, q.from.id.0 as i64, &e.to_string());
            bot.answer_callback_query(q.id).text("Something went wrong").await?;
            return Ok(());
        }
    };

    let chat_id = q
        .message
        .as_ref()
        .map(|message| message.chat.id)
        .unwrap_or(ChatId(user.telegram_id));

    let answer = match action {
        CallbackAction::ShowHabits => {
            habits::handle_habits(bot.clone(), chat_id, &user, &ctx).await?;
            String::new()
        }
        CallbackAction::ShowTasks => {
            tasks::handle_tasks(bot.clone(), chat_id, &user, &ctx).await?;
            String::new()
        }
        CallbackAction::ShowStats => {
            stats::handle_stats(bot.clone(), chat_id, &user, &ctx).await?;
            String::new()
        }
        CallbackAction::ToggleNotification(preference) => {
            toggle_notification(&bot, &q, &user, preference, &ctx).await?
        }
        other => apply_action(other, &user, &ctx).await,
    };

    let mut request = bot.answer_callback_query(q.id);
    if !answer.is_empty() {
        request = request.text(answer);
    }
    request.await?;
    Ok(())
}

/// Runs a data-changing action and returns the toast shown to the user.
async fn apply_action(action: CallbackAction, user: &User, ctx: &BotHandler) -> String {
    let pool = &ctx.db.pool;
    let now = Utc::now();

    let outcome: anyhow::Result<String> = match action {
        CallbackAction::ReminderDone(id) => {
            reminder_toast(ctx.planner.complete(user, id).await.map(|_| "✅ Marked as done".to_string()))
        }
        CallbackAction::ReminderSnooze(id) => reminder_toast(
            ctx.planner
                .snooze(user, id, now)
                .await
                .map(|outcome| format!("⏰ Snoozed until {}", user.timezone().format(&outcome.remind_at))),
        ),
        CallbackAction::ReminderDelete(id) => {
            reminder_toast(ctx.planner.delete(user, id).await.map(|_| "🗑 Reminder deleted".to_string()))
        }
        CallbackAction::TaskComplete(id) => Task::complete(pool, id, user.id)
            .await
            .map(|done| if done { "✅ Task completed" } else { "Task already done or gone" }.to_string())
            .map_err(Into::into),
        CallbackAction::TaskDelete(id) => Task::delete(pool, id, user.id)
            .await
            .map(|deleted| if deleted { "🗑 Task deleted" } else { "Task not found" }.to_string())
            .map_err(Into::into),
        CallbackAction::HabitLog(id) => log_habit(pool, user, id, now).await,
        CallbackAction::NotePin(id) => Note::toggle_pin(pool, id, user.id)
            .await
            .map(|pinned| match pinned {
                Some(true) => "📌 Pinned",
                Some(false) => "Unpinned",
                None => "Note not found",
            }
            .to_string())
            .map_err(Into::into),
        CallbackAction::NoteDelete(id) => Note::delete(pool, id, user.id)
            .await
            .map(|deleted| if deleted { "🗑 Note deleted" } else { "Note not found" }.to_string())
            .map_err(Into::into),
        CallbackAction::ShowHabits
        | CallbackAction::ShowTasks
        | CallbackAction::ShowStats
        | CallbackAction::ToggleNotification(_) => Ok(String::new()),
    };

    outcome.unwrap_or_else(|e| {
        log_command_error("callback", &user.display_name(), user.id, &e.to_string());
        "Something went wrong, please try again".to_string()
    })
}

/// User-facing reminder failures become toasts; only database errors propagate.
fn reminder_toast(result: Result<String, ReminderError>) -> anyhow::Result<String> {
    match result {
        Ok(toast) => Ok(toast),
        Err(ReminderError::Database(e)) => Err(e.into()),
        Err(other) => Ok(other.to_string()),
    }
}

async fn log_habit(
    pool: &sqlx::SqlitePool,
    user: &User,
    habit_id: i64,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<String> {
    let Some(habit) = Habit::find_for_user(pool, habit_id, user.id).await? else {
        return Ok("Habit not found".to_string());
    };

    let today = user.timezone().local_date(now);
    let updated = Habit::log_progress(pool, &habit, today, habit.target_value).await?;
    Ok(format!("✅ {} logged! Streak: {} 🔥", updated.name, updated.streak_count))
}

async fn toggle_notification(
    bot: &Bot,
    q: &CallbackQuery,
    user: &User,
    preference: NotificationPreference,
    ctx: &BotHandler,
) -> HandlerResult<String> {
    let pool = &ctx.db.pool;

    let enabled = match User::toggle_preference(pool, user.id, preference).await {
        Ok(enabled) => enabled,
        Err(e) => {
            log_command_error("notifications", &user.display_name(), user.id, &e.to_string());
            return Ok("Could not update the setting".to_string());
        }
    };

    let updated = User::find_by_id(pool, user.id).await?.unwrap_or_else(|| user.clone());
    ctx.notifications.apply_preference(&updated, preference, enabled).await;

    if let Some(message) = &q.message {
        bot.edit_message_reply_markup(message.chat.id, message.id)
            .reply_markup(notifications_keyboard(&updated))
            .await?;
    }

    Ok(format!("{}: {}", preference.label(), if enabled { "on" } else { "off" }))
}
