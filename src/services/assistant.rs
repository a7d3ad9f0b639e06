//! `/ask`: a chat-completions client plus the glue that turns model replies
//! into reminders, tasks, habits and notes.

use std::sync::{Arc, LazyLock};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::Config;
use crate::database::{connection::DatabaseManager, models::*};
use crate::services::reminder::{ReminderError, ReminderPlanner};
use crate::utils::logging::log_database_operation;
use crate::utils::text::truncate;
use crate::utils::validation::{
    validate_description, validate_habit_name, validate_habit_target, validate_note_content, validate_title,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
const DEEPSEEK_MODEL: &str = "deepseek-chat";
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);
const MAX_TOKENS: u32 = 500;
const DEFAULT_REMINDER_TIME: &str = "in 1 hour";
const NOTE_TITLE_CHARS: usize = 50;

const CHAT_PROMPT: &str = "You are a helpful assistant inside a productivity bot. \
You help users with reminders, tasks, habits and notes. \
Be concise, friendly and practical. Answer in plain text, not JSON.";

const REMINDER_PROMPT: &str = "Extract a reminder from the user's text and return ONLY a JSON object with the fields \
title (string), time (string such as 'dd-mm-yyyy at hh:mm', 'tomorrow at 3pm' or 'in 2 hours') and description (string). \
Use 'in 1 hour' when no time is given. \
Example: {\"title\": \"Call mom\", \"time\": \"tomorrow at 3pm\", \"description\": \"Check on her\"}";

const TASK_PROMPT: &str = "Extract a task from the user's text and return ONLY a JSON object with the fields \
title (string), description (string), priority (low, medium, high or urgent), \
deadline (string such as 'dd-mm-yyyy at hh:mm' or 'next friday', or null) and project_name (string or null). \
Use 'medium' when no priority is given. \
Example: {\"title\": \"Finish report\", \"description\": \"Quarterly numbers\", \"priority\": \"high\", \"deadline\": \"next friday\", \"project_name\": \"Work\"}";

const HABIT_PROMPT: &str = "Extract a daily habit from the user's text and return ONLY a JSON object with the fields \
name (string), description (string), target_value (number) and unit (string such as minutes, pages or times). \
Use 1 when no target is given. \
Example: {\"name\": \"Read\", \"description\": \"Read before bed\", \"target_value\": 30, \"unit\": \"minutes\"}";

const NOTE_PROMPT: &str = "Extract a note from the user's text and return ONLY a JSON object with the fields \
title (a short summary) and content (the full note text). \
Example: {\"title\": \"Meeting notes\", \"content\": \"Timeline moves to March\"}";

const OVERVIEW_PHRASES: &[&str] = &[
    "how many",
    "count",
    "show me",
    "display",
    "list my",
    "do i have",
    "any tasks",
    "any reminders",
    "any habits",
    "any notes",
];
const REMINDER_PHRASES: &[&str] = &["remind me to", "set reminder", "create reminder", "add reminder"];
const TASK_PHRASES: &[&str] = &["create task", "add task", "new task", "make task"];
const HABIT_PHRASES: &[&str] = &["create habit", "add habit", "start habit", "build habit", "new habit"];
const NOTE_PHRASES: &[&str] = &["create note", "add note", "save note", "new note", "remember this"];

#[allow(clippy::expect_used)]
static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fence pattern must compile"));

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} returned HTTP {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("{0} returned an empty reply")]
    EmptyReply(String),
    #[error("no language model is configured")]
    NotConfigured,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A chat model that answers one system + user exchange.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    /// `json_reply` asks the provider for a bare JSON object.
    async fn complete(&self, system: &str, prompt: &str, json_reply: bool) -> Result<String, AssistantError>;
}

/// Any provider speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatible {
    http: reqwest::Client,
    provider: String,
    api_key: String,
    model: String,
    chat_url: String,
}

impl OpenAiCompatible {
    pub fn new(provider: &str, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider: provider.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            chat_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        }
    }

    pub fn openai(api_key: &str, model: &str) -> Self {
        Self::new("OpenAI", OPENAI_BASE_URL, api_key, model)
    }

    pub fn deepseek(api_key: &str) -> Self {
        Self::new("DeepSeek", DEEPSEEK_BASE_URL, api_key, DEEPSEEK_MODEL)
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    pub fn request_body(&self, system: &str, prompt: &str, json_reply: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": 0.7,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });
        if json_reply {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct OaiResponse {
    choices: Vec<OaiChoice>,
}

#[derive(Debug, Deserialize)]
struct OaiChoice {
    message: OaiMessage,
}

#[derive(Debug, Deserialize)]
struct OaiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaiErrorResponse {
    error: OaiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OaiErrorDetail {
    message: String,
}

/// Text of the first choice in a chat-completions response body.
pub fn completion_text(body: &str) -> Option<String> {
    serde_json::from_str::<OaiResponse>(body)
        .ok()?
        .choices
        .into_iter()
        .next()?
        .message
        .content
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<OaiErrorResponse>(body)
        .map(|err| err.error.message)
        .unwrap_or_else(|_| truncate(body, 200))
}

#[async_trait]
impl ChatModel for OpenAiCompatible {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn complete(&self, system: &str, prompt: &str, json_reply: bool) -> Result<String, AssistantError> {
        tracing::info!(
            "{} request: model={}, prompt_len={}, json={}",
            self.provider,
            self.model,
            prompt.len(),
            json_reply
        );

        let response = self
            .http
            .post(&self.chat_url)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&self.request_body(system, prompt, json_reply))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::info!("{} response: status={}, body_len={}", self.provider, status, text.len());

        if !status.is_success() {
            return Err(AssistantError::Api {
                provider: self.provider.clone(),
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        completion_text(&text).ok_or_else(|| AssistantError::EmptyReply(self.provider.clone()))
    }
}

/// Tries each model in order and returns the first reply.
pub struct FallbackChat {
    models: Vec<Arc<dyn ChatModel>>,
}

impl FallbackChat {
    pub fn new(models: Vec<Arc<dyn ChatModel>>) -> Self {
        Self { models }
    }

    /// OpenAI first, DeepSeek second. `None` when neither key is set.
    pub fn from_config(config: &Config) -> Option<Self> {
        let mut models: Vec<Arc<dyn ChatModel>> = Vec::new();
        if let Some(key) = config.openai_api_key.as_deref() {
            models.push(Arc::new(OpenAiCompatible::openai(key, &config.openai_model)));
        }
        if let Some(key) = config.deepseek_api_key.as_deref() {
            models.push(Arc::new(OpenAiCompatible::deepseek(key)));
        }

        if models.is_empty() {
            None
        } else {
            Some(Self::new(models))
        }
    }
}

#[async_trait]
impl ChatModel for FallbackChat {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn complete(&self, system: &str, prompt: &str, json_reply: bool) -> Result<String, AssistantError> {
        let mut last_error = AssistantError::NotConfigured;
        for model in &self.models {
            match model.complete(system, prompt, json_reply).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    tracing::warn!("{} failed, trying the next model: {}", model.name(), e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

/// What a free-form question asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Overview,
    CreateReminder,
    CreateTask,
    CreateHabit,
    CreateNote,
    Chat,
}

/// Keyword routing. Questions about existing items win over creation phrases.
pub fn detect_intent(query: &str) -> Intent {
    let query = query.to_lowercase();
    let mentions = |phrases: &[&str]| phrases.iter().any(|phrase| query.contains(phrase));

    if mentions(OVERVIEW_PHRASES) {
        Intent::Overview
    } else if mentions(REMINDER_PHRASES) {
        Intent::CreateReminder
    } else if mentions(TASK_PHRASES) {
        Intent::CreateTask
    } else if mentions(HABIT_PHRASES) {
        Intent::CreateHabit
    } else if mentions(NOTE_PHRASES) {
        Intent::CreateNote
    } else {
        Intent::Chat
    }
}

/// Finds a JSON object in a model reply: the whole text, a fenced block,
/// or the first balanced `{...}` that parses.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    for captures in FENCED_JSON.captures_iter(text) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&captures[1]) {
            return Some(value);
        }
    }

    for (start, _) in text.match_indices('{') {
        if let Some(end) = matching_brace(&text[start..]) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text[start..=start + end]) {
                return Some(value);
            }
        }
    }
    None
}

/// Byte offset of the `}` closing the `{` at the start of `text`.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drops markdown emphasis and heading marks; replies go out as plain text.
pub fn clean_reply(text: &str) -> String {
    text.replace("**", "")
        .replace("__", "")
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                trimmed.trim_start_matches('#').trim_start()
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Models send numbers as `30`, `30.0` or `"30"`.
fn whole_number(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|n| n.round() as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn text_field(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReminderDraft {
    title: Option<String>,
    time: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaskDraft {
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    deadline: Option<String>,
    project_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HabitDraft {
    name: Option<String>,
    target_value: Option<Value>,
    unit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NoteDraft {
    title: Option<String>,
    content: Option<String>,
}

/// The text sent back to the user and whether anything was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub intent: Intent,
    pub text: String,
    pub created: bool,
}

impl AssistantReply {
    fn created(intent: Intent, text: String) -> Self {
        Self {
            intent,
            text,
            created: true,
        }
    }

    fn message(intent: Intent, text: impl Into<String>) -> Self {
        Self {
            intent,
            text: text.into(),
            created: false,
        }
    }
}

pub struct Assistant {
    model: Arc<dyn ChatModel>,
    db: Arc<DatabaseManager>,
    planner: Arc<ReminderPlanner>,
}

impl Assistant {
    pub fn new(model: Arc<dyn ChatModel>, db: Arc<DatabaseManager>, planner: Arc<ReminderPlanner>) -> Self {
        Self { model, db, planner }
    }

    /// `None` when no provider key is configured.
    pub fn from_config(config: &Config, db: Arc<DatabaseManager>, planner: Arc<ReminderPlanner>) -> Option<Self> {
        let chat = FallbackChat::from_config(config)?;
        Some(Self::new(Arc::new(chat), db, planner))
    }

    pub async fn respond(&self, user: &User, query: &str, now: DateTime<Utc>) -> Result<AssistantReply, AssistantError> {
        let query = query.trim();
        let intent = detect_intent(query);
        tracing::info!("Assistant query from user {} routed to {:?}", user.id, intent);

        match intent {
            Intent::Overview => self.overview(user).await,
            Intent::CreateReminder => self.create_reminder(user, query, now).await,
            Intent::CreateTask => self.create_task(user, query, now).await,
            Intent::CreateHabit => self.create_habit(user, query).await,
            Intent::CreateNote => self.create_note(user, query).await,
            Intent::Chat => {
                let system = format!("{CHAT_PROMPT}\n\nUser context: {}", self.context(user).await?);
                let answer = self.model.complete(&system, query, false).await?;
                Ok(AssistantReply::message(intent, clean_reply(&answer)))
            }
        }
    }

    /// Asks for JSON and decodes it; `None` when the reply has no usable object.
    async fn draft<T: DeserializeOwned>(&self, system: &str, query: &str) -> Result<Option<T>, AssistantError> {
        let reply = self.model.complete(system, query, true).await?;
        let draft = extract_json(&reply).and_then(|value| serde_json::from_value(value).ok());
        if draft.is_none() {
            tracing::warn!("Could not read JSON from model reply: {}", truncate(&reply, 200));
        }
        Ok(draft)
    }

    async fn create_reminder(&self, user: &User, query: &str, now: DateTime<Utc>) -> Result<AssistantReply, AssistantError> {
        let intent = Intent::CreateReminder;
        let Some(draft) = self.draft::<ReminderDraft>(REMINDER_PROMPT, query).await? else {
            return Ok(AssistantReply::message(intent, "I couldn't work out the reminder details. Try /remind instead."));
        };

        let title = text_field(draft.title).unwrap_or_else(|| "Reminder".to_string());
        let time = text_field(draft.time).unwrap_or_else(|| DEFAULT_REMINDER_TIME.to_string());
        let description = text_field(draft.description);

        match self.planner.create(user, &title, description.as_deref(), &time, now).await {
            Ok(created) => Ok(AssistantReply::created(
                intent,
                format!(
                    "⏰ Reminder set: {}\n{}",
                    created.reminder.title,
                    user.timezone().format(&created.remind_at)
                ),
            )),
            Err(ReminderError::Database(e)) => Err(e.into()),
            Err(other) => Ok(AssistantReply::message(intent, format!("⚠️ {other}"))),
        }
    }

    async fn create_task(&self, user: &User, query: &str, now: DateTime<Utc>) -> Result<AssistantReply, AssistantError> {
        let intent = Intent::CreateTask;
        let Some(draft) = self.draft::<TaskDraft>(TASK_PROMPT, query).await? else {
            return Ok(AssistantReply::message(intent, "I couldn't work out the task details. Try /task instead."));
        };

        let Some(title) = text_field(draft.title) else {
            return Ok(AssistantReply::message(intent, "The task needs a title. Try /task instead."));
        };
        let description = text_field(draft.description);
        for checked in [validate_title(&title), description.as_deref().map_or(Ok(()), validate_description)] {
            if let Err(e) = checked {
                return Ok(AssistantReply::message(intent, format!("⚠️ {e}")));
            }
        }

        let priority = draft
            .priority
            .as_deref()
            .and_then(TaskPriority::parse)
            .unwrap_or_default();
        // An unreadable deadline is dropped rather than failing the task.
        let due_date = text_field(draft.deadline)
            .and_then(|raw| user.timezone().parse_time_input(&raw, now))
            .map(|due| due.with_timezone(&Utc));

        let task = Task::create(
            &self.db.pool,
            user.id,
            &NewTask {
                title,
                description,
                priority,
                due_date,
                project_name: text_field(draft.project_name),
            },
        )
        .await?;
        log_database_operation("insert", "tasks", Some(&format!("task {} for user {}", task.id, user.id)));

        let mut text = format!("{} Task added: {}", priority.emoji(), task.title);
        if let Some(due) = task.due_date_utc() {
            text.push_str(&format!("\n📅 Due {}", user.timezone().format(&due)));
        }
        if let Some(project) = task.project_name.as_deref() {
            text.push_str(&format!("\n📁 {project}"));
        }
        Ok(AssistantReply::created(intent, text))
    }

    async fn create_habit(&self, user: &User, query: &str) -> Result<AssistantReply, AssistantError> {
        let intent = Intent::CreateHabit;
        let Some(draft) = self.draft::<HabitDraft>(HABIT_PROMPT, query).await? else {
            return Ok(AssistantReply::message(intent, "I couldn't work out the habit details. Try /habit instead."));
        };

        let Some(name) = text_field(draft.name) else {
            return Ok(AssistantReply::message(intent, "The habit needs a name. Try /habit instead."));
        };
        if let Err(e) = validate_habit_name(&name) {
            return Ok(AssistantReply::message(intent, format!("⚠️ {e}")));
        }
        let target = draft.target_value.as_ref().and_then(whole_number).unwrap_or(1);
        if let Err(e) = validate_habit_target(target) {
            return Ok(AssistantReply::message(intent, format!("⚠️ {e}")));
        }
        let unit = text_field(draft.unit);

        let habit = Habit::create(&self.db.pool, user.id, &name, target, unit.as_deref()).await?;
        log_database_operation("insert", "habits", Some(&format!("habit {} for user {}", habit.id, user.id)));
        Ok(AssistantReply::created(
            intent,
            format!(
                "🎯 Habit added: {} ({} {} a day)",
                habit.name,
                habit.target_value,
                habit.unit_label()
            ),
        ))
    }

    async fn create_note(&self, user: &User, query: &str) -> Result<AssistantReply, AssistantError> {
        let intent = Intent::CreateNote;
        let Some(draft) = self.draft::<NoteDraft>(NOTE_PROMPT, query).await? else {
            return Ok(AssistantReply::message(intent, "I couldn't work out the note. Try /note instead."));
        };

        let content = text_field(draft.content).unwrap_or_else(|| query.to_string());
        let title = text_field(draft.title)
            .unwrap_or_else(|| truncate(content.lines().next().unwrap_or(&content), NOTE_TITLE_CHARS));
        for checked in [validate_title(&title), validate_note_content(&content)] {
            if let Err(e) = checked {
                return Ok(AssistantReply::message(intent, format!("⚠️ {e}")));
            }
        }

        let note = Note::create(&self.db.pool, user.id, &title, &content, None, &[]).await?;
        log_database_operation("insert", "notes", Some(&format!("note {} for user {}", note.id, user.id)));
        Ok(AssistantReply::created(intent, format!("📝 Note saved: {}", note.title)))
    }

    async fn overview(&self, user: &User) -> Result<AssistantReply, AssistantError> {
        let counts = Counts::load(&self.db.pool, user.id).await?;
        Ok(AssistantReply::message(
            Intent::Overview,
            format!(
                "📊 Right now you have:\n⏰ {} pending reminders\n📋 {} open tasks\n🎯 {} active habits\n📝 {} notes",
                counts.reminders, counts.tasks, counts.habits, counts.notes
            ),
        ))
    }

    async fn context(&self, user: &User) -> Result<String, AssistantError> {
        let counts = Counts::load(&self.db.pool, user.id).await?;
        Ok(format!(
            "{} pending reminders, {} open tasks, {} active habits and {} notes. Timezone: {}.",
            counts.reminders,
            counts.tasks,
            counts.habits,
            counts.notes,
            user.timezone().name()
        ))
    }
}

struct Counts {
    reminders: i64,
    tasks: i64,
    habits: i64,
    notes: i64,
}

impl Counts {
    async fn load(pool: &sqlx::SqlitePool, user_id: i64) -> Result<Self, sqlx::Error> {
        Ok(Self {
            reminders: Reminder::count_pending(pool, user_id).await?,
            tasks: Task::count_open(pool, user_id).await?,
            habits: Habit::count_active(pool, user_id).await?,
            notes: Note::count(pool, user_id).await?,
        })
    }
}
