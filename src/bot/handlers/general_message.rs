use teloxide::prelude::*;

use crate::bot::handlers::HandlerResult;
use crate::utils::datetime::classify;
use crate::utils::feedback::CommandFeedback;

pub async fn handle_general_message(bot: Bot, msg: Message) -> HandlerResult {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let lowered = text.to_lowercase();

    // Check if it looks like a malformed command
    if text.starts_with('/') {
        let command = text.split_whitespace().next().unwrap_or(text);
        feedback
            .validation_error(
                &format!("Unknown command: {command}"),
                "Use /help to see all available commands, or check your command syntax.",
            )
            .await?;
    } else if classify(text).is_some() {
        // A bare time expression, probably meant for /remind
        feedback
            .info(&format!("Looks like a time. To set a reminder, try: /remind Title | {}", text.trim()))
            .await?;
    } else if lowered.contains("remind") {
        feedback
            .info("Want a reminder? Try: /remind Call mom | tomorrow at 6pm")
            .await?;
    } else if lowered.contains("help") {
        feedback
            .info("Use /help to see all available commands and examples!")
            .await?;
    }
    // For other messages, we don't respond to avoid spam

    Ok(())
}
