//! # Productivity Bot Main Entry Point
//!
//! Initializes logging, loads configuration, sets up the database, starts the
//! notification scheduler and its dispatcher, and runs the Telegram bot.

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use productivity_bot::bot::handlers::BotHandler;
use productivity_bot::config::Config;
use productivity_bot::database::connection::DatabaseManager;
use productivity_bot::services::delivery::Messenger;
use productivity_bot::services::notification::NotificationService;
use productivity_bot::services::scheduler::JobRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "productivity_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    info!("Starting Productivity Bot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded - Database: {}, default timezone: {}",
        config.database_url, config.default_timezone
    );

    // Initialize database
    info!("Initializing database connection...");
    let db_manager = DatabaseManager::new(&config.database_url).await?;
    info!("Running database migrations...");
    db_manager.run_migrations().await?;
    let db = Arc::new(db_manager);
    info!("Database initialized successfully");

    let bot = Bot::new(&config.telegram_bot_token);

    // One scheduler for the process; fired jobs flow to a single dispatcher.
    info!("Initializing notification scheduler...");
    let (registry, fired_rx) = JobRegistry::new()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create scheduler: {}", e))?;
    let registry = Arc::new(registry);
    let messenger = Messenger::telegram(bot.clone(), config.telegram_bot_token.clone());
    let notifications = Arc::new(NotificationService::new(db.clone(), registry.clone(), messenger));

    registry
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start scheduler: {}", e))?;
    let dispatcher_task = notifications.clone().spawn_dispatcher(fired_rx);

    let report = notifications.setup_notifications().await;
    info!(
        "Notification scheduler started - {} recurring jobs, {} reminders restored",
        report.recurring, report.reminders
    );

    let handler = BotHandler::new(db.clone(), notifications.clone(), config.clone());
    info!("Telegram bot initialized successfully");

    Dispatcher::builder(bot, handler.schema())
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // Stop the scheduler on shutdown
    notifications.shutdown().await;
    dispatcher_task.abort();

    info!("Application stopped");
    Ok(())
}
