use chrono::Utc;
use teloxide::prelude::*;

use crate::bot::commands::{optional_field, parse_id};
use crate::bot::handlers::BotHandler;
use crate::database::models::User;
use crate::services::delivery::{inline_keyboard, InlineButton};
use crate::services::reminder::{ReminderError, ScheduledReminder};
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_command_start, log_command_success, log_validation_error};
use crate::utils::markdown::{bold, escape_markdown};
use crate::utils::text::split_fields;

const TIME_FORMATS_HINT: &str =
    "Try 'in 30 minutes', '14:30', '6:30 pm tomorrow', 'tomorrow at 9am', 'next friday at 18:00' or '27-06-2025 at 14:30'.";

/// Shown in /reminders.
const PENDING_LIMIT: i64 = 10;

pub async fn handle_remind(
    bot: Bot,
    msg: Message,
    args: String,
    user: &User,
    ctx: &BotHandler,
) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let fields = split_fields(&args);

    let (Some(title), Some(when)) = (optional_field(&fields, 0), optional_field(&fields, 1)) else {
        feedback
            .usage(
                "/remind",
                "Set a one-off reminder. Separate the parts with |.",
                &[
                    "/remind Call mom | tomorrow at 6pm",
                    "/remind Stand-up | 09:30",
                    "/remind Pay rent | 01-02-2026 at 10:00 | transfer to landlord",
                ],
            )
            .await?;
        return Ok(());
    };
    let description = optional_field(&fields, 2);

    log_command_start("remind", &user.display_name(), user.id, Some(when));

    match ctx.planner.create(user, title, description, when, Utc::now()).await {
        Ok(outcome) => {
            log_command_success(
                "remind",
                &user.display_name(),
                user.id,
                Some(&format!("reminder {}", outcome.reminder.id)),
            );
            let keyboard = inline_keyboard(&[vec![InlineButton::new(
                "🗑 Delete",
                format!("reminder_delete_{}", outcome.reminder.id),
            )]]);
            feedback
                .rich(confirmation_text("Reminder set", user, &outcome), Some(keyboard))
                .await?;
        }
        Err(e) => report_error(&feedback, "remind", user, when, e).await?,
    }

    Ok(())
}

pub async fn handle_reminders(bot: Bot, chat_id: ChatId, user: &User, ctx: &BotHandler) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, chat_id);

    let reminders = match ctx.planner.list_pending(user, PENDING_LIMIT).await {
        Ok(reminders) => reminders,
        Err(e) => {
            log_command_error("reminders", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not load your reminders. Please try again.").await?;
            return Ok(());
        }
    };

    if reminders.is_empty() {
        feedback
            .info("You have no pending reminders. Use /remind to add one.")
            .await?;
        return Ok(());
    }

    let timezone = user.timezone();
    let mut text = String::from("⏰ *Pending reminders*\n\n");
    let mut rows = Vec::new();

    for reminder in &reminders {
        let when = reminder
            .remind_at_utc()
            .map(|at| timezone.format(&at))
            .unwrap_or_else(|| reminder.remind_at.clone());
        text.push_str(&format!(
            "`#{}` {}\n    🕐 {}\n",
            reminder.id,
            bold(&reminder.title),
            escape_markdown(&when)
        ));
        rows.push(vec![
            InlineButton::new(format!("✅ #{}", reminder.id), format!("reminder_done_{}", reminder.id)),
            InlineButton::new(format!("🗑 #{}", reminder.id), format!("reminder_delete_{}", reminder.id)),
        ]);
    }
    text.push_str(&format!("\n_Times shown in {}_", escape_markdown(&timezone.name())));

    feedback.rich(text, Some(inline_keyboard(&rows))).await?;
    Ok(())
}

pub async fn handle_reschedule(
    bot: Bot,
    msg: Message,
    args: String,
    user: &User,
    ctx: &BotHandler,
) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let fields = split_fields(&args);

    let (Some(id), Some(when)) = (
        optional_field(&fields, 0).and_then(parse_id),
        optional_field(&fields, 1),
    ) else {
        feedback
            .usage(
                "/reschedule",
                "Move a reminder to a new time. Find ids with /reminders.",
                &["/reschedule 12 | in 2 hours", "/reschedule 12 | next monday at 9am"],
            )
            .await?;
        return Ok(());
    };

    log_command_start("reschedule", &user.display_name(), user.id, Some(&format!("{id} -> {when}")));

    match ctx.planner.reschedule(user, id, when, Utc::now()).await {
        Ok(outcome) => {
            log_command_success("reschedule", &user.display_name(), user.id, None);
            feedback
                .rich(confirmation_text("Reminder moved", user, &outcome), None)
                .await?;
        }
        Err(e) => report_error(&feedback, "reschedule", user, when, e).await?,
    }

    Ok(())
}

pub async fn handle_cancel(
    bot: Bot,
    msg: Message,
    args: String,
    user: &User,
    ctx: &BotHandler,
) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);

    let Some(id) = parse_id(&args) else {
        feedback
            .usage("/cancel", "Stop a pending reminder from firing.", &["/cancel 12"])
            .await?;
        return Ok(());
    };

    match ctx.planner.cancel(user, id).await {
        Ok(reminder) => {
            log_command_success("cancel", &user.display_name(), user.id, Some(&format!("reminder {id}")));
            feedback
                .success(&format!("Cancelled reminder '{}'", reminder.title))
                .await?;
        }
        Err(e) => report_error(&feedback, "cancel", user, &args, e).await?,
    }

    Ok(())
}

fn confirmation_text(heading: &str, user: &User, outcome: &ScheduledReminder) -> String {
    let mut text = format!(
        "✅ {}\n\n{}\n🕐 {}",
        bold(heading),
        bold(&outcome.reminder.title),
        escape_markdown(&user.timezone().format(&outcome.remind_at))
    );
    if !outcome.scheduled {
        text.push_str(&format!(
            "\n\n⚠️ {}",
            escape_markdown("Saved, but I couldn't schedule it right now. It will be picked up on the next restart.")
        ));
    }
    text
}

async fn report_error(
    feedback: &CommandFeedback,
    command: &str,
    user: &User,
    input: &str,
    error: ReminderError,
) -> ResponseResult<()> {
    match error {
        ReminderError::UnrecognizedTime(_) => {
            log_validation_error(command, "time", input, &error.to_string(), user.id);
            feedback.validation_error(&error.to_string(), TIME_FORMATS_HINT).await?;
        }
        ReminderError::NotInFuture(_) => {
            log_validation_error(command, "time", input, &error.to_string(), user.id);
            feedback
                .validation_error(&error.to_string(), "Pick a time later than now.")
                .await?;
        }
        ReminderError::Invalid(ref reason) => {
            log_validation_error(command, "reminder", input, reason, user.id);
            feedback.error(reason).await?;
        }
        ReminderError::NotFound => {
            feedback
                .validation_error("Reminder not found", "Use /reminders to see your reminder ids.")
                .await?;
        }
        ReminderError::Database(ref e) => {
            log_command_error(command, &user.display_name(), user.id, &e.to_string());
            feedback.error("Something went wrong saving your reminder. Please try again.").await?;
        }
    }
    Ok(())
}
