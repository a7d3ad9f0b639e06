use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::ChatAction;

use crate::bot::handlers::BotHandler;
use crate::database::models::User;
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_command_start, log_command_success};

pub async fn handle_ask(bot: Bot, msg: Message, query: String, user: &User, ctx: &BotHandler) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot.clone(), msg.chat.id);

    let Some(assistant) = ctx.assistant.as_ref() else {
        feedback
            .info("The AI assistant is not configured on this bot. Ask the admin to set OPENAI_API_KEY or DEEPSEEK_API_KEY.")
            .await?;
        return Ok(());
    };

    let query = query.trim();
    if query.is_empty() {
        feedback
            .usage(
                "/ask",
                "Ask a productivity question, or describe something to create.",
                &[
                    "/ask how do I stop procrastinating?",
                    "/ask remind me to call mom tomorrow at 6pm",
                    "/ask add task finish the slides by next friday, high priority",
                    "/ask how many tasks do I have?",
                ],
            )
            .await?;
        return Ok(());
    }

    log_command_start("ask", &user.display_name(), user.id, None);
    if let Err(e) = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await {
        tracing::debug!("Typing indicator failed: {}", e);
    }

    match assistant.respond(user, query, Utc::now()).await {
        Ok(reply) => {
            let details = format!("{:?}, created: {}", reply.intent, reply.created);
            log_command_success("ask", &user.display_name(), user.id, Some(&details));
            bot.send_message(msg.chat.id, reply.text).await?;
        }
        Err(e) => {
            log_command_error("ask", &user.display_name(), user.id, &e.to_string());
            feedback
                .error("The assistant is unavailable right now. Please try again later.")
                .await?;
        }
    }

    Ok(())
}
