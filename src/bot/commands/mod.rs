pub mod assistant;
pub mod habits;
pub mod notes;
pub mod reminders;
pub mod settings;
pub mod stats;
pub mod tasks;

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Productivity bot commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Display this help message")]
    Help,
    #[command(description = "Set a reminder: /remind title | time [| description]")]
    Remind(String),
    #[command(description = "List pending reminders")]
    Reminders,
    #[command(description = "Move a reminder: /reschedule id | time")]
    Reschedule(String),
    #[command(description = "Cancel a pending reminder: /cancel id")]
    Cancel(String),
    #[command(description = "Add a task: /task title [| priority] [| due] [| project]")]
    Task(String),
    #[command(description = "List open tasks")]
    Tasks,
    #[command(description = "Projects: /projects [name | rename old | new | delete name]")]
    Projects(String),
    #[command(description = "Track a habit: /habit name [| daily target] [| unit]")]
    Habit(String),
    #[command(description = "Show habits and log today's progress")]
    Habits,
    #[command(description = "Save a note: /note [title |] content [| category] [| tags]")]
    Note(String),
    #[command(description = "List notes, pinned first")]
    Notes,
    #[command(description = "Search notes: /search text")]
    Search(String),
    #[command(description = "Show or set your timezone: /timezone Europe/Berlin or UTC:+5:30")]
    Timezone(String),
    #[command(description = "Turn notifications on or off")]
    Notifications,
    #[command(description = "Show this week's statistics")]
    Stats,
    #[command(description = "Ask the AI assistant: /ask remind me to call mom tomorrow at 6pm")]
    Ask(String),
    #[command(description = "Message every active user (admin only)")]
    Broadcast(String),
}

/// Reads an id argument; `#12` and `12` are both accepted.
pub fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().trim_start_matches('#').parse().ok().filter(|id: &i64| *id > 0)
}

/// Reads an optional `|` field, treating blanks as absent.
pub fn optional_field(fields: &[String], index: usize) -> Option<&str> {
    fields
        .get(index)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

/// Matches `word id | rest...` or `word | id | rest...` and returns the id
/// with the remaining fields. Anything else is not the subcommand.
pub fn subcommand<'a>(fields: &'a [String], word: &str) -> Option<(i64, &'a [String])> {
    let first = fields.first()?;
    let (head, tail) = first.split_once(char::is_whitespace).unwrap_or((first.as_str(), ""));
    if !head.eq_ignore_ascii_case(word) {
        return None;
    }

    if tail.trim().is_empty() {
        let id = fields.get(1).and_then(|raw| parse_id(raw))?;
        Some((id, fields.get(2..).unwrap_or(&[])))
    } else {
        let id = parse_id(tail)?;
        Some((id, &fields[1..]))
    }
}
