use anyhow::{anyhow, Result};
use std::env;

use crate::services::reminder::DEFAULT_SNOOZE_MINUTES;
use crate::services::timezone::UserTimezone;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:./data/productivity.db";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub database_url: String,
    /// Telegram id allowed to run admin commands
    pub admin_user_id: Option<i64>,
    /// Timezone given to new users
    pub default_timezone: String,
    pub snooze_minutes: i64,
    /// `/ask` is enabled when either key is present; OpenAI is tried first.
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub deepseek_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| anyhow!("TELEGRAM_BOT_TOKEN must be set"))?;

        if token.trim().is_empty() {
            return Err(anyhow!("TELEGRAM_BOT_TOKEN must be set"));
        }

        let database_url = non_blank("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let admin_user_id = match non_blank("ADMIN_USER_ID") {
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|_| anyhow!("Invalid ADMIN_USER_ID: {}", raw))?,
            ),
            None => None,
        };

        let default_timezone = match non_blank("DEFAULT_TIMEZONE") {
            Some(raw) => UserTimezone::parse(&raw)
                .ok_or_else(|| anyhow!("Invalid DEFAULT_TIMEZONE: {}", raw))?
                .name(),
            None => "UTC".to_string(),
        };

        let snooze_minutes = match non_blank("SNOOZE_MINUTES") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .ok_or_else(|| anyhow!("Invalid SNOOZE_MINUTES: {}", raw))?,
            None => DEFAULT_SNOOZE_MINUTES,
        };

        Ok(Config {
            telegram_bot_token: token,
            database_url,
            admin_user_id,
            default_timezone,
            snooze_minutes,
            openai_api_key: non_blank("OPENAI_API_KEY"),
            openai_model: non_blank("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            deepseek_api_key: non_blank("DEEPSEEK_API_KEY"),
        })
    }

    pub fn is_admin(&self, telegram_id: i64) -> bool {
        self.admin_user_id == Some(telegram_id)
    }

    pub fn assistant_enabled(&self) -> bool {
        self.openai_api_key.is_some() || self.deepseek_api_key.is_some()
    }
}

fn non_blank(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
