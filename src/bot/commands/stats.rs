use chrono::Utc;
use teloxide::prelude::*;

use crate::bot::handlers::BotHandler;
use crate::database::models::User;
use crate::services::digest::WeeklyDigest;
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_command_start, log_command_success};
use crate::utils::markdown::escape_markdown;

pub async fn handle_stats(bot: Bot, chat_id: ChatId, user: &User, ctx: &BotHandler) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, chat_id);

    let digest = match WeeklyDigest::collect(&ctx.db.pool, user.id, Utc::now()).await {
        Ok(digest) => digest,
        Err(e) => {
            log_command_error("stats", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not compute your statistics. Please try again.").await?;
            return Ok(());
        }
    };

    let mut text = digest.render_report(&user.display_name());
    if ctx.config.is_admin(user.telegram_id) {
        let jobs = ctx.notifications.jobs().len().await;
        text.push_str(&format!("\n\n🛠 Scheduled jobs: {jobs}"));
    }

    feedback.rich(text, None).await?;
    Ok(())
}

/// Sends `text` to every active user. Admin only.
pub async fn handle_broadcast(
    bot: Bot,
    msg: Message,
    text: String,
    user: &User,
    ctx: &BotHandler,
) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);

    if !ctx.config.is_admin(user.telegram_id) {
        feedback.error("This command is for the bot administrator.").await?;
        return Ok(());
    }

    let text = text.trim();
    if text.is_empty() {
        feedback
            .usage("/broadcast", "Message every active user.", &["/broadcast Maintenance tonight at 22:00 UTC"])
            .await?;
        return Ok(());
    }

    log_command_start("broadcast", &user.display_name(), user.id, None);

    let recipients = match User::find_active(&ctx.db.pool).await {
        Ok(users) => users,
        Err(e) => {
            log_command_error("broadcast", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not load recipients.").await?;
            return Ok(());
        }
    };

    let body = format!("📣 {}", escape_markdown(text));
    let mut delivered = 0;
    for recipient in &recipients {
        if ctx
            .notifications
            .send_custom_notification(recipient.id, &body, Vec::new())
            .await
        {
            delivered += 1;
        }
    }

    let summary = format!("{} of {} users", delivered, recipients.len());
    log_command_success("broadcast", &user.display_name(), user.id, Some(&summary));
    feedback.success(&format!("Broadcast delivered to {summary}")).await?;
    Ok(())
}
