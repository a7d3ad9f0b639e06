use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::bot::handlers::BotHandler;
use crate::database::models::{NotificationPreference, User};
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_command_success, log_validation_error};
use crate::utils::markdown::{bold, escape_markdown};
use crate::utils::validation::validate_timezone;

pub async fn handle_start(bot: Bot, msg: Message, user: &User) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);

    let text = format!(
        "👋 Welcome, {}\\!\n\n\
        I keep track of your reminders, tasks, habits and notes\\.\n\n\
        ⏰ /remind Call mom \\| tomorrow at 6pm\n\
        📋 /task Write report \\| high \\| next friday\n\
        🎯 /habit Read \\| 20 \\| pages\n\
        📝 /note Buy oat milk\n\n\
        Your timezone is {}\\. Change it with /timezone\\.\n\
        Use /help to see every command\\.",
        escape_markdown(&user.display_name()),
        bold(&user.timezone().name())
    );

    feedback.rich(text, None).await?;
    Ok(())
}

pub async fn handle_timezone(
    bot: Bot,
    msg: Message,
    args: String,
    user: &User,
    ctx: &BotHandler,
) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let raw = args.trim();

    if raw.is_empty() {
        let timezone = user.timezone();
        let text = format!(
            "🌍 Your timezone is {}\nLocal time: {}\n\nChange it with `/timezone Europe/Berlin` or `/timezone UTC:+5:30`",
            bold(&timezone.name()),
            escape_markdown(&timezone.format(&Utc::now()))
        );
        feedback.rich(text, None).await?;
        return Ok(());
    }

    let timezone = match validate_timezone(raw) {
        Ok(timezone) => timezone,
        Err(e) => {
            log_validation_error("timezone", "timezone", raw, &e.to_string(), user.id);
            feedback
                .validation_error(&e.to_string(), "Examples: America/New_York, Asia/Kolkata, UTC:-3")
                .await?;
            return Ok(());
        }
    };

    if let Err(e) = User::set_timezone(&ctx.db.pool, user.id, &timezone).await {
        log_command_error("timezone", &user.display_name(), user.id, &e.to_string());
        feedback.error("Could not save your timezone. Please try again.").await?;
        return Ok(());
    }

    // Recurring notifications follow the new local clock.
    match User::find_by_id(&ctx.db.pool, user.id).await {
        Ok(Some(updated)) => ctx.notifications.ensure_user_jobs(&updated).await,
        Ok(None) => {}
        Err(e) => tracing::warn!("Timezone saved but jobs not refreshed for user {}: {}", user.id, e),
    }

    log_command_success("timezone", &user.display_name(), user.id, Some(&timezone.name()));
    feedback
        .success(&format!(
            "Timezone set to {}. Local time is now {}.",
            timezone.name(),
            timezone.format(&Utc::now())
        ))
        .await?;
    Ok(())
}

pub async fn handle_notifications(bot: Bot, msg: Message, user: &User) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);

    let text = String::from("🔔 *Notifications*\n\nTap a switch to turn it on or off\\.");
    feedback.rich(text, Some(notifications_keyboard(user))).await?;
    Ok(())
}

/// One toggle button per notification switch, showing its current state.
pub fn notifications_keyboard(user: &User) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(NotificationPreference::ALL.into_iter().map(|preference| {
        let state = if user.preference(preference) { "✅" } else { "❌" };
        vec![InlineKeyboardButton::callback(
            format!("{} {}", state, preference.label()),
            format!("notif_{}", preference.token()),
        )]
    }))
}
