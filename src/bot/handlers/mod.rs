pub mod callback;
pub mod general_message;
pub mod message;

use std::sync::Arc;

use teloxide::{
    dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler},
    prelude::*,
};

use crate::bot::commands::Command;
use crate::config::Config;
use crate::database::connection::DatabaseManager;
use crate::database::models::{TelegramProfile, User};
use crate::services::assistant::Assistant;
use crate::services::notification::NotificationService;
use crate::services::reminder::ReminderPlanner;
use crate::utils::logging::log_system_event;

pub type HandlerResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Everything a handler needs, cloned into each endpoint.
#[derive(Clone)]
pub struct BotHandler {
    pub db: Arc<DatabaseManager>,
    pub notifications: Arc<NotificationService>,
    pub planner: Arc<ReminderPlanner>,
    /// Present only when an LLM key is configured
    pub assistant: Option<Arc<Assistant>>,
    pub config: Arc<Config>,
}

impl BotHandler {
    pub fn new(db: Arc<DatabaseManager>, notifications: Arc<NotificationService>, config: Arc<Config>) -> Self {
        let planner = Arc::new(ReminderPlanner::new(
            db.clone(),
            notifications.clone(),
            config.snooze_minutes,
        ));
        let assistant = Assistant::from_config(&config, db.clone(), planner.clone()).map(Arc::new);
        if assistant.is_some() {
            log_system_event("AI assistant enabled", None);
        }
        Self {
            db,
            notifications,
            planner,
            assistant,
            config,
        }
    }

    /// Loads the sender's account, creating it on first contact.
    ///
    /// Returns `None` for banned users; handlers drop their updates.
    pub async fn resolve_user(&self, from: &teloxide::types::User) -> anyhow::Result<Option<User>> {
        let profile = TelegramProfile {
            telegram_id: from.id.0 as i64,
            username: from.username.clone(),
            first_name: Some(from.first_name.clone()),
            last_name: from.last_name.clone(),
            language_code: from.language_code.clone(),
        };
        self.admit(&profile).await
    }

    /// Gate shared by commands and button presses.
    ///
    /// New accounts get their recurring notifications registered right away.
    pub async fn admit(&self, profile: &TelegramProfile) -> anyhow::Result<Option<User>> {
        let (user, created) = User::get_or_create(&self.db.pool, profile, &self.config.default_timezone).await?;
        if user.is_banned() {
            tracing::debug!("Ignoring update from banned user {}", user.id);
            return Ok(None);
        }
        if created {
            log_system_event("New user registered", Some(&format!("{} ({})", user.display_name(), user.id)));
            self.notifications.ensure_user_jobs(&user).await;
        }
        Ok(Some(user))
    }

    pub fn schema(&self) -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
        let command_ctx = self.clone();
        let callback_ctx = self.clone();

        dptree::entry()
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
                        let ctx = command_ctx.clone();
                        async move { message::command_handler(bot, msg, cmd, ctx).await }
                    }),
            )
            .branch(
                Update::filter_message().endpoint(|bot: Bot, msg: Message| async move {
                    general_message::handle_general_message(bot, msg).await
                }),
            )
            .branch(Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
                let ctx = callback_ctx.clone();
                async move { callback::callback_handler(bot, q, ctx).await }
            }))
    }
}
