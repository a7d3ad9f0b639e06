use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::bot::commands::{assistant, habits, notes, reminders, settings, stats, tasks, Command};
use crate::bot::handlers::{BotHandler, HandlerResult};
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::log_command_error;

pub async fn command_handler(bot: Bot, msg: Message, cmd: Command, ctx: BotHandler) -> HandlerResult {
    let Some(from) = msg.from() else {
        return Ok(());
    };

    if !msg.chat.is_private() {
        bot.send_message(msg.chat.id, "👋 I work in private chats only. Message me directly!")
            .await?;
        return Ok(());
    }

    let user = match ctx.resolve_user(from).await {
        Ok(Some(user)) => user,
        Ok(None) => return Ok(()),
        Err(e) => {
            let name = from.username.clone().unwrap_or_else(|| from.first_name.clone());
            log_command_error("resolve_user", &name, from.id.0 as i64, &e.to_string());
            CommandFeedback::new(bot, msg.chat.id)
                .error("Something went wrong loading your profile. Please try again.")
                .await?;
            return Ok(());
        }
    };

    match cmd {
        Command::Start => settings::handle_start(bot, msg, &user).await?,
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
        }
        Command::Remind(args) => reminders::handle_remind(bot, msg, args, &user, &ctx).await?,
        Command::Reminders => reminders::handle_reminders(bot, msg.chat.id, &user, &ctx).await?,
        Command::Reschedule(args) => reminders::handle_reschedule(bot, msg, args, &user, &ctx).await?,
        Command::Cancel(args) => reminders::handle_cancel(bot, msg, args, &user, &ctx).await?,
        Command::Task(args) => tasks::handle_task(bot, msg, args, &user, &ctx).await?,
        Command::Tasks => tasks::handle_tasks(bot, msg.chat.id, &user, &ctx).await?,
        Command::Projects(args) => tasks::handle_projects(bot, msg, args, &user, &ctx).await?,
        Command::Habit(args) => habits::handle_habit(bot, msg, args, &user, &ctx).await?,
        Command::Habits => habits::handle_habits(bot, msg.chat.id, &user, &ctx).await?,
        Command::Note(args) => notes::handle_note(bot, msg, args, &user, &ctx).await?,
        Command::Notes => notes::handle_notes(bot, msg, &user, &ctx).await?,
        Command::Search(query) => notes::handle_search(bot, msg, query, &user, &ctx).await?,
        Command::Timezone(args) => settings::handle_timezone(bot, msg, args, &user, &ctx).await?,
        Command::Notifications => settings::handle_notifications(bot, msg, &user).await?,
        Command::Stats => stats::handle_stats(bot, msg.chat.id, &user, &ctx).await?,
        Command::Ask(query) => assistant::handle_ask(bot, msg, query, &user, &ctx).await?,
        Command::Broadcast(text) => stats::handle_broadcast(bot, msg, text, &user, &ctx).await?,
    }

    Ok(())
}
