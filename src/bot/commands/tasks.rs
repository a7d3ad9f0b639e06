use chrono::Utc;
use teloxide::prelude::*;

use crate::bot::commands::optional_field;
use crate::bot::handlers::BotHandler;
use crate::database::models::{NewTask, Task, TaskPriority, User};
use crate::services::delivery::{inline_keyboard, InlineButton};
use crate::services::reminder::resolve_future_time;
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_command_success, log_validation_error};
use crate::utils::markdown::{bold, escape_markdown};
use crate::utils::text::{split_fields, truncate};
use crate::utils::validation::{validate_project_name, validate_title};

const OPEN_TASK_LIMIT: i64 = 20;
/// Tasks that get complete/delete buttons in /tasks.
const TASK_BUTTONS: usize = 8;

pub async fn handle_task(bot: Bot, msg: Message, args: String, user: &User, ctx: &BotHandler) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let fields = split_fields(&args);

    let Some(title) = optional_field(&fields, 0) else {
        feedback
            .usage(
                "/task",
                "Add a task. Priority is low, medium, high or urgent; the due date takes the same formats as /remind.",
                &[
                    "/task Buy groceries",
                    "/task Write report | high | tomorrow at 17:00 | Work",
                    "/task Renew passport | | 01-03-2026",
                ],
            )
            .await?;
        return Ok(());
    };

    if let Err(e) = validate_title(title) {
        log_validation_error("task", "title", title, &e.to_string(), user.id);
        feedback.error(&e.to_string()).await?;
        return Ok(());
    }

    let priority = match optional_field(&fields, 1) {
        Some(raw) => match TaskPriority::parse(raw) {
            Some(priority) => priority,
            None => {
                log_validation_error("task", "priority", raw, "unknown priority", user.id);
                feedback
                    .validation_error(
                        &format!("Unknown priority '{raw}'"),
                        "Use low, medium, high or urgent.",
                    )
                    .await?;
                return Ok(());
            }
        },
        None => TaskPriority::default(),
    };

    let due_date = match optional_field(&fields, 2) {
        Some(raw) => match resolve_future_time(&user.timezone(), raw, Utc::now()) {
            Ok(due) => Some(due),
            Err(e) => {
                log_validation_error("task", "due", raw, &e.to_string(), user.id);
                feedback
                    .validation_error(&e.to_string(), "Due dates use the same formats as /remind.")
                    .await?;
                return Ok(());
            }
        },
        None => None,
    };

    let project_name = optional_field(&fields, 3);
    if let Some(project) = project_name {
        if let Err(e) = validate_project_name(project) {
            feedback.error(&e.to_string()).await?;
            return Ok(());
        }
    }

    let new_task = NewTask {
        title: title.to_string(),
        description: None,
        priority,
        due_date,
        project_name: project_name.map(str::to_string),
    };

    match Task::create(&ctx.db.pool, user.id, &new_task).await {
        Ok(task) => {
            log_command_success("task", &user.display_name(), user.id, Some(&format!("task {}", task.id)));
            let mut text = format!("✅ *Task added*\n\n{} {}", priority.emoji(), bold(&task.title));
            if let Some(due) = task.due_date_utc() {
                text.push_str(&format!("\n📅 Due {}", escape_markdown(&user.timezone().format(&due))));
            }
            if let Some(project) = task.project_name.as_deref() {
                text.push_str(&format!("\n📁 {}", escape_markdown(project)));
            }
            let keyboard = inline_keyboard(&[vec![
                InlineButton::new("✅ Complete", format!("task_complete_{}", task.id)),
                InlineButton::new("🗑 Delete", format!("task_delete_{}", task.id)),
            ]]);
            feedback.rich(text, Some(keyboard)).await?;
        }
        Err(e) => {
            log_command_error("task", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not save the task. Please try again.").await?;
        }
    }

    Ok(())
}

pub async fn handle_tasks(bot: Bot, chat_id: ChatId, user: &User, ctx: &BotHandler) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, chat_id);

    let tasks = match Task::list_open(&ctx.db.pool, user.id, OPEN_TASK_LIMIT).await {
        Ok(tasks) => tasks,
        Err(e) => {
            log_command_error("tasks", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not load your tasks. Please try again.").await?;
            return Ok(());
        }
    };

    if tasks.is_empty() {
        feedback.info("No open tasks. Add one with /task.").await?;
        return Ok(());
    }

    let text = format!("📋 *Open tasks*\n\n{}", render_task_lines(&tasks, user));
    let rows: Vec<Vec<InlineButton>> = tasks
        .iter()
        .take(TASK_BUTTONS)
        .map(|task| {
            vec![
                InlineButton::new(
                    format!("✅ {}", truncate(&task.title, 24)),
                    format!("task_complete_{}", task.id),
                ),
                InlineButton::new("🗑", format!("task_delete_{}", task.id)),
            ]
        })
        .collect();

    feedback.rich(text, Some(inline_keyboard(&rows))).await?;
    Ok(())
}

/// `/projects`, `/projects name`, `/projects rename | old | new`, `/projects delete | name`.
pub async fn handle_projects(
    bot: Bot,
    msg: Message,
    args: String,
    user: &User,
    ctx: &BotHandler,
) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let fields = split_fields(&args);
    let pool = &ctx.db.pool;

    match optional_field(&fields, 0) {
        None => {
            let projects = match Task::projects(pool, user.id).await {
                Ok(projects) => projects,
                Err(e) => {
                    log_command_error("projects", &user.display_name(), user.id, &e.to_string());
                    feedback.error("Could not load your projects.").await?;
                    return Ok(());
                }
            };
            if projects.is_empty() {
                feedback
                    .info("No projects yet. Add one as the fourth part of /task, e.g. /task Draft | high | | Work")
                    .await?;
                return Ok(());
            }
            let mut text = String::from("📁 *Projects*\n\n");
            for project in &projects {
                text.push_str(&format!(
                    "• {} {}\n",
                    bold(&project.project_name),
                    escape_markdown(&format!("({}/{} done)", project.completed_count, project.task_count))
                ));
            }
            feedback.rich(text, None).await?;
        }
        Some("rename") => {
            let (Some(old_name), Some(new_name)) = (optional_field(&fields, 1), optional_field(&fields, 2)) else {
                feedback
                    .usage("/projects rename", "Rename a project.", &["/projects rename | Work | Office"])
                    .await?;
                return Ok(());
            };
            if let Err(e) = validate_project_name(new_name) {
                feedback.error(&e.to_string()).await?;
                return Ok(());
            }
            match Task::rename_project(pool, user.id, old_name, new_name).await {
                Ok(0) => {
                    feedback.warning(&format!("No project named '{old_name}'")).await?;
                }
                Ok(moved) => {
                    log_command_success("projects", &user.display_name(), user.id, Some("rename"));
                    feedback
                        .success(&format!("Renamed '{old_name}' to '{new_name}' ({moved} tasks)"))
                        .await?;
                }
                Err(e) => {
                    log_command_error("projects", &user.display_name(), user.id, &e.to_string());
                    feedback.error("Could not rename the project.").await?;
                }
            }
        }
        Some("delete") => {
            let Some(name) = optional_field(&fields, 1) else {
                feedback
                    .usage("/projects delete", "Delete a project and its tasks.", &["/projects delete | Work"])
                    .await?;
                return Ok(());
            };
            match Task::delete_project(pool, user.id, name).await {
                Ok(0) => {
                    feedback.warning(&format!("No project named '{name}'")).await?;
                }
                Ok(removed) => {
                    log_command_success("projects", &user.display_name(), user.id, Some("delete"));
                    feedback
                        .success(&format!("Deleted project '{name}' and {removed} tasks"))
                        .await?;
                }
                Err(e) => {
                    log_command_error("projects", &user.display_name(), user.id, &e.to_string());
                    feedback.error("Could not delete the project.").await?;
                }
            }
        }
        Some(name) => match Task::list_by_project(pool, user.id, name).await {
            Ok(tasks) if tasks.is_empty() => {
                feedback.warning(&format!("No tasks in project '{name}'")).await?;
            }
            Ok(tasks) => {
                let text = format!("📁 {}\n\n{}", bold(name), render_task_lines(&tasks, user));
                feedback.rich(text, None).await?;
            }
            Err(e) => {
                log_command_error("projects", &user.display_name(), user.id, &e.to_string());
                feedback.error("Could not load the project.").await?;
            }
        },
    }

    Ok(())
}

fn render_task_lines(tasks: &[Task], user: &User) -> String {
    let timezone = user.timezone();
    let mut text = String::new();

    for task in tasks {
        let marker = if task.is_completed() { "✔️" } else { task.priority().emoji() };
        text.push_str(&format!("{} `#{}` {}", marker, task.id, escape_markdown(&task.title)));
        if let Some(due) = task.due_date_utc() {
            text.push_str(&format!(" · 📅 {}", escape_markdown(&timezone.format(&due))));
        }
        text.push('\n');
    }
    text
}
