#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use productivity_bot::bot::handlers::BotHandler;
use productivity_bot::config::Config;
use productivity_bot::database::{connection::DatabaseManager, models::*};
use productivity_bot::services::delivery::{MessageSender, Messenger, OutboundMessage, SenderFactory};
use productivity_bot::services::notification::{NotificationService, RecurringKind};
use productivity_bot::services::scheduler::JobRegistry;
use tempfile::{tempdir, TempDir};

struct Discard;

#[async_trait]
impl MessageSender for Discard {
    async fn send(&self, _message: &OutboundMessage) -> Result<()> {
        Ok(())
    }
}

fn config(database_url: &str) -> Config {
    Config {
        telegram_bot_token: "test-token".to_string(),
        database_url: database_url.to_string(),
        admin_user_id: None,
        default_timezone: "Europe/Berlin".to_string(),
        snooze_minutes: 15,
        openai_api_key: None,
        openai_model: "gpt-3.5-turbo".to_string(),
        deepseek_api_key: None,
    }
}

async fn setup() -> Result<(BotHandler, TempDir)> {
    let temp_dir = tempdir()?;
    let database_url = format!("sqlite:{}", temp_dir.path().join("test.db").display());
    let db = DatabaseManager::new(&database_url).await?;
    db.run_migrations().await?;
    let db = Arc::new(db);

    let fresh: SenderFactory = Arc::new(|| {
        let sender: Arc<dyn MessageSender> = Arc::new(Discard);
        sender
    });
    let messenger = Messenger::new(Arc::new(Discard), fresh);
    let (registry, _fired_rx) = JobRegistry::new().await.map_err(|e| anyhow!(e.to_string()))?;
    let notifications = Arc::new(NotificationService::new(db.clone(), Arc::new(registry), messenger));

    let handler = BotHandler::new(db, notifications, Arc::new(config(&database_url)));
    Ok((handler, temp_dir))
}

fn profile(telegram_id: i64) -> TelegramProfile {
    TelegramProfile {
        telegram_id,
        username: Some("gatekeeper".to_string()),
        first_name: Some("Robin".to_string()),
        last_name: None,
        language_code: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_admit_registers_new_users() -> Result<()> {
    let (handler, _temp_dir) = setup().await?;

    let user = handler.admit(&profile(77)).await?.unwrap();
    assert_eq!(user.telegram_id, 77);
    assert_eq!(user.timezone, "Europe/Berlin");

    let jobs = handler.notifications.jobs();
    for kind in RecurringKind::ALL {
        assert!(jobs.is_scheduled(kind.key(user.id)).await);
    }

    // Second contact finds the same account
    let again = handler.admit(&profile(77)).await?.unwrap();
    assert_eq!(again.id, user.id);
    assert!(handler.assistant.is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_admit_turns_away_banned_users() -> Result<()> {
    let (handler, _temp_dir) = setup().await?;

    let user = handler.admit(&profile(88)).await?.unwrap();
    User::set_status(&handler.db.pool, user.id, UserStatus::Banned).await?;
    assert!(handler.admit(&profile(88)).await?.is_none());

    // Inactive users still get through; only a ban blocks
    User::set_status(&handler.db.pool, user.id, UserStatus::Inactive).await?;
    let inactive = handler.admit(&profile(88)).await?.unwrap();
    assert!(!inactive.is_active());
    assert!(!inactive.is_banned());

    Ok(())
}
