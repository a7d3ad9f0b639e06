use teloxide::prelude::*;

use crate::bot::commands::{optional_field, subcommand};
use crate::bot::handlers::BotHandler;
use crate::database::models::{Note, NoteField, User};
use crate::services::delivery::{inline_keyboard, InlineButton};
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_command_success, log_validation_error};
use crate::utils::markdown::{bold, escape_markdown};
use crate::utils::text::{format_tags, parse_tags, split_fields, truncate};
use crate::utils::validation::{validate_category, validate_note_content, validate_tags, validate_title};

const NOTE_LIMIT: i64 = 10;
const PREVIEW_CHARS: usize = 120;
const DERIVED_TITLE_CHARS: usize = 50;

pub async fn handle_note(bot: Bot, msg: Message, args: String, user: &User, ctx: &BotHandler) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let fields = split_fields(&args);

    if let Some((id, rest)) = subcommand(&fields, "edit") {
        return edit_note(&feedback, id, rest, user, ctx).await;
    }

    let (title, content) = match (optional_field(&fields, 0), optional_field(&fields, 1)) {
        (Some(title), Some(content)) => (title.to_string(), content),
        // A single part is the content; the title is derived from it.
        (Some(content), None) => (truncate(content.lines().next().unwrap_or(content), DERIVED_TITLE_CHARS), content),
        _ => {
            feedback
                .usage(
                    "/note",
                    "Save a note. Parts after the content are an optional category and comma separated tags.",
                    &[
                        "/note Buy oat milk",
                        "/note Book ideas | The Dispossessed, Piranesi | reading | books, fiction",
                        "/note edit 4 | tags | books, wishlist",
                    ],
                )
                .await?;
            return Ok(());
        }
    };

    for (field, result) in [("title", validate_title(&title)), ("content", validate_note_content(content))] {
        if let Err(e) = result {
            log_validation_error("note", field, &title, &e.to_string(), user.id);
            feedback.error(&e.to_string()).await?;
            return Ok(());
        }
    }

    let category = optional_field(&fields, 2);
    let tags = optional_field(&fields, 3).map(parse_tags).unwrap_or_default();

    match Note::create(&ctx.db.pool, user.id, &title, content, category, &tags).await {
        Ok(note) => {
            log_command_success("note", &user.display_name(), user.id, Some(&format!("note {}", note.id)));
            let mut text = format!("📝 *Note saved*\n\n{}", bold(&note.title));
            if !tags.is_empty() {
                text.push_str(&format!("\n{}", escape_markdown(&format_tags(&tags))));
            }
            let keyboard = inline_keyboard(&[vec![
                InlineButton::new("📌 Pin", format!("note_pin_{}", note.id)),
                InlineButton::new("🗑 Delete", format!("note_delete_{}", note.id)),
            ]]);
            feedback.rich(text, Some(keyboard)).await?;
        }
        Err(e) => {
            log_command_error("note", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not save the note. Please try again.").await?;
        }
    }

    Ok(())
}

/// `/note edit id | field | value`. `none` or `/clear` removes a category or tags.
async fn edit_note(
    feedback: &CommandFeedback,
    id: i64,
    fields: &[String],
    user: &User,
    ctx: &BotHandler,
) -> ResponseResult<()> {
    let Some(field) = optional_field(fields, 0).and_then(NoteField::parse) else {
        feedback
            .usage(
                "/note edit",
                "Change a note's title, content, category or tags.",
                &["/note edit 4 | title | Reading list", "/note edit 4 | category | none"],
            )
            .await?;
        return Ok(());
    };

    let value = optional_field(fields, 1)
        .filter(|value| !(field.is_clearable() && (value.eq_ignore_ascii_case("none") || *value == "/clear")));

    let checked = match (field, value) {
        (NoteField::Title, Some(value)) => validate_title(value),
        (NoteField::Content, Some(value)) => validate_note_content(value),
        (NoteField::Category, Some(value)) => validate_category(value),
        (NoteField::Tags, Some(value)) => validate_tags(value),
        (NoteField::Title | NoteField::Content, None) => {
            feedback
                .validation_error("A new value is required", "Title and content cannot be cleared.")
                .await?;
            return Ok(());
        }
        (NoteField::Category | NoteField::Tags, None) => Ok(()),
    };
    if let Err(e) = checked {
        log_validation_error("note", "edit", value.unwrap_or_default(), &e.to_string(), user.id);
        feedback.error(&e.to_string()).await?;
        return Ok(());
    }

    match Note::update_field(&ctx.db.pool, id, user.id, field, value).await {
        Ok(Some(note)) => {
            log_command_success("note", &user.display_name(), user.id, Some(&format!("edited note {}", note.id)));
            feedback.success(&format!("Note #{} updated: {}", note.id, note.title)).await?;
        }
        Ok(None) => {
            feedback.warning("Note not found. Use /notes to see ids.").await?;
        }
        Err(e) => {
            log_command_error("note", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not update the note.").await?;
        }
    }

    Ok(())
}

pub async fn handle_notes(bot: Bot, msg: Message, user: &User, ctx: &BotHandler) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);

    match Note::list(&ctx.db.pool, user.id, NOTE_LIMIT).await {
        Ok(notes) if notes.is_empty() => {
            feedback.info("No notes yet. Save one with /note.").await?;
        }
        Ok(notes) => {
            let (text, keyboard) = render_notes("📝 *Your notes*", &notes);
            feedback.rich(text, Some(keyboard)).await?;
        }
        Err(e) => {
            log_command_error("notes", &user.display_name(), user.id, &e.to_string());
            feedback.error("Could not load your notes.").await?;
        }
    }

    Ok(())
}

pub async fn handle_search(bot: Bot, msg: Message, query: String, user: &User, ctx: &BotHandler) -> ResponseResult<()> {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let query = query.trim();

    if query.is_empty() {
        feedback
            .usage("/search", "Find notes by title, content or tag.", &["/search groceries", "/search #work"])
            .await?;
        return Ok(());
    }

    let needle = query.trim_start_matches('#');
    match Note::search(&ctx.db.pool, user.id, needle, NOTE_LIMIT).await {
        Ok(notes) if notes.is_empty() => {
            feedback.info(&format!("No notes match '{query}'")).await?;
        }
        Ok(notes) => {
            let heading = format!("🔎 *Results for* {}", escape_markdown(query));
            let (text, keyboard) = render_notes(&heading, &notes);
            feedback.rich(text, Some(keyboard)).await?;
        }
        Err(e) => {
            log_command_error("search", &user.display_name(), user.id, &e.to_string());
            feedback.error("Search failed. Please try again.").await?;
        }
    }

    Ok(())
}

fn render_notes(heading: &str, notes: &[Note]) -> (String, teloxide::types::InlineKeyboardMarkup) {
    let mut text = format!("{heading}\n\n");
    let mut rows = Vec::new();

    for note in notes {
        let pin = if note.is_pinned { "📌 " } else { "" };
        text.push_str(&format!("{}`#{}` {}\n", pin, note.id, bold(&note.title)));
        if note.content != note.title {
            text.push_str(&format!("{}\n", escape_markdown(&truncate(&note.content, PREVIEW_CHARS))));
        }
        let mut meta = Vec::new();
        if let Some(category) = note.category.as_deref() {
            meta.push(format!("📂 {category}"));
        }
        let tags = note.tag_list();
        if !tags.is_empty() {
            meta.push(format_tags(&tags));
        }
        if !meta.is_empty() {
            text.push_str(&format!("_{}_\n", escape_markdown(&meta.join("  "))));
        }
        text.push('\n');

        rows.push(vec![
            InlineButton::new(
                format!("{} #{}", if note.is_pinned { "Unpin" } else { "📌 Pin" }, note.id),
                format!("note_pin_{}", note.id),
            ),
            InlineButton::new(format!("🗑 #{}", note.id), format!("note_delete_{}", note.id)),
        ]);
    }

    (text, inline_keyboard(&rows))
}
