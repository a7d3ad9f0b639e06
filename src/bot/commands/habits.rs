use chrono::Utc;
use teloxide::prelude::*;

use crate::bot::commands::{optional_field, parse_id, subcommand};
use crate::bot::handlers::BotHandler;
use crate::database::models::{Habit, User};
use crate::services::delivery::{inline_keyboard, InlineButton};
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_command_success, log_validation_error};
use crate::utils::markdown::{bold, escape_markdown};
use crate::utils::text::split_fields;
use crate::utils::validation::{validate_habit_log_value, validate_habit_name, validate_habit_target};

/// `/habit name [| target] [| unit]` creates, `/habit log id | value` records
/// progress and `/habit archive | id` retires one.
pub async fn handle_habit(bot: Bot, msg: Message, args: String, user: &User, ctx: &BotHandler) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let fields = split_fields(&args);

    let Some(name) = optional_field(&fields, 0) else {
        feedback
            .usage(
                "/habit",
                "Track a daily habit with an optional target and unit.",
                &[
                    "/habit Meditate",
                    "/habit Read | 20 | pages",
                    "/habit log 3 | 12",
                    "/habit archive | 3",
                ],
            )
            .await?;
        return Ok(());
    };

    if let Some((id, rest)) = subcommand(&fields, "log") {
        return log_value(&feedback, id, optional_field(rest, 0), user, ctx).await;
    }

    if name.eq_ignore_ascii_case("archive") {
        let Some(id) = optional_field(&fields, 1).and_then(parse_id) else {
            feedback
                .usage("/habit archive", "Stop tracking a habit.", &["/habit archive | 3"])
                .await?;
            return Ok(());
        };
        match Habit::archive(&ctx.db.pool, id, user.id).await {
            Ok(true) => {
                feedback.success("Habit archived. Its history is kept.").await?;
            }
            Ok(false) => {
                feedback.warning("Habit not found. Use /habits to see ids.").await?;
            }
            Err(e) => {
                log_command_error("habit", &user.display_name(), user.id, &e.to_string());
                feedback.error("Could not archive the habit.").await?;
            }
        }
        return Ok(());
    }

    if let Err(e) = validate_habit_name(name) {
        log_validation_error("habit", "name", name, &e.to_string(), user.id);
        feedback.error(&e.to_string()).await?;
        return Ok(());
    }

    let target = match optional_field(&fields, 1) {
        Some(raw) => match raw.parse::<i64>() {
            Ok(target) if validate_habit_target(target).is_ok() => target,
            _ => {
                log_validation_error("habit", "target", raw, "not a number in range", user.id);
                feedback
                    .validation_error(&format!("Invalid target '{raw}'"), "Use a whole number from 1 to 10000.")
                    .await?;
                return Ok(());
            }
        },
        None => 1,
    };
    let unit = optional_field(&fields, 2);

    match Habit::create(&ctx.db.pool, user.id, name, target, unit).await {
        Ok(habit) => {
            log_command_success("habit", &user.display_name(), user.id, Some(&format!("habit {}", habit.id)));
            let text = format!(
                "🎯 *Habit added*\n\n{} {}\n\nI'll check in every morning at 9:00 your time\\.",
                bold(&habit.name),
                escape_markdown(&format!("({} {} a day)", habit.target_value, habit.unit_label()))
            );
            let keyboard = inline_keyboard(&[vec![InlineButton::new(
                "✅ Done today",
                format!("habit_log_{}", habit.id),
            )]]);
            feedback.rich(text, Some(keyboard)).await?;
        }
        Err(e) => {
            log_command_error("habit", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not save the habit. Please try again.").await?;
        }
    }

    Ok(())
}

/// Records today's progress. Without a value the daily target is logged.
async fn log_value(
    feedback: &CommandFeedback,
    habit_id: i64,
    raw_value: Option<&str>,
    user: &User,
    ctx: &BotHandler,
) -> ResponseResult<()> {
    let pool = &ctx.db.pool;

    let habit = match Habit::find_for_user(pool, habit_id, user.id).await {
        Ok(Some(habit)) if habit.is_active => habit,
        Ok(_) => {
            feedback.warning("Habit not found. Use /habits to see ids.").await?;
            return Ok(());
        }
        Err(e) => {
            log_command_error("habit", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not load the habit.").await?;
            return Ok(());
        }
    };

    let value = match raw_value {
        Some(raw) => match raw.parse::<i64>() {
            Ok(value) if validate_habit_log_value(value).is_ok() => value,
            _ => {
                log_validation_error("habit", "value", raw, "not a number in range", user.id);
                feedback
                    .validation_error(&format!("Invalid progress '{raw}'"), "Use a whole number from 0 to 100000.")
                    .await?;
                return Ok(());
            }
        },
        None => habit.target_value,
    };

    let today = user.timezone().local_date(Utc::now());
    match Habit::log_progress(pool, &habit, today, value).await {
        Ok(updated) => {
            let details = format!("logged {value} for habit {}", updated.id);
            log_command_success("habit", &user.display_name(), user.id, Some(&details));
            let verdict = if value >= updated.target_value {
                format!("🔥 {} day streak", updated.streak_count)
            } else {
                format!("{} to go for today's target", updated.target_value - value)
            };
            let text = format!(
                "✅ {} {}
{}",
                bold(&updated.name),
                escape_markdown(&format!("{} / {} {}", value, updated.target_value, updated.unit_label())),
                escape_markdown(&verdict)
            );
            feedback.rich(text, None).await?;
        }
        Err(e) => {
            log_command_error("habit", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not log progress. Please try again.").await?;
        }
    }

    Ok(())
}

pub async fn handle_habits(bot: Bot, chat_id: ChatId, user: &User, ctx: &BotHandler) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, chat_id);
    let pool = &ctx.db.pool;

    let habits = match Habit::list_active(pool, user.id).await {
        Ok(habits) => habits,
        Err(e) => {
            log_command_error("habits", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not load your habits.").await?;
            return Ok(());
        }
    };

    if habits.is_empty() {
        feedback.info("You're not tracking any habits yet. Start with /habit.").await?;
        return Ok(());
    }

    let today = user.timezone().local_date(Utc::now());
    let pending: Vec<i64> = match Habit::unlogged_on(pool, user.id, today).await {
        Ok(unlogged) => unlogged.iter().map(|habit| habit.id).collect(),
        Err(e) => {
            tracing::warn!("Could not load today's habit status for user {}: {}", user.id, e);
            Vec::new()
        }
    };

    let mut text = String::from("🎯 *Your habits*\n\n");
    let mut rows = Vec::new();
    for habit in &habits {
        let done_today = !pending.contains(&habit.id);
        text.push_str(&format!(
            "{} `#{}` {} {}\n    🔥 {} day streak, best {}\n",
            if done_today { "✅" } else { "⬜" },
            habit.id,
            bold(&habit.name),
            escape_markdown(&format!("({} {})", habit.target_value, habit.unit_label())),
            habit.streak_count,
            habit.best_streak
        ));
        if !done_today {
            rows.push(vec![InlineButton::new(
                format!("✅ {}", habit.name),
                format!("habit_log_{}", habit.id),
            )]);
        }
    }

    let keyboard = if rows.is_empty() { None } else { Some(inline_keyboard(&rows)) };
    feedback.rich(text, keyboard).await?;
    Ok(())
}
