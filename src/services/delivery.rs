//! Outbound message delivery with a single fresh-client retry.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use tracing::{error, info, warn};

/// A callback button shown under a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// A message ready to be sent; `text` is MarkdownV2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    pub buttons: Vec<Vec<InlineButton>>,
}

impl OutboundMessage {
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(mut self, rows: Vec<Vec<InlineButton>>) -> Self {
        self.buttons = rows;
        self
    }
}

/// Builds a Telegram keyboard from button rows.
pub fn inline_keyboard(rows: &[Vec<InlineButton>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.callback_data.clone()))
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<()>;
}

pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let request = self
            .bot
            .send_message(ChatId(message.chat_id), message.text.clone())
            .parse_mode(ParseMode::MarkdownV2);

        if message.buttons.is_empty() {
            request.await?;
        } else {
            request.reply_markup(inline_keyboard(&message.buttons)).await?;
        }
        Ok(())
    }
}

/// Produces a sender that shares no connection state with earlier ones.
pub type SenderFactory = Arc<dyn Fn() -> Arc<dyn MessageSender> + Send + Sync>;

/// The delivery capability handed to everything that notifies users.
#[derive(Clone)]
pub struct Messenger {
    primary: Arc<dyn MessageSender>,
    fresh: SenderFactory,
}

impl Messenger {
    pub fn new(primary: Arc<dyn MessageSender>, fresh: SenderFactory) -> Self {
        Self { primary, fresh }
    }

    /// Delivers through `bot`, retrying with a newly built client for `token`.
    pub fn telegram(bot: Bot, token: String) -> Self {
        let fresh: SenderFactory = Arc::new(move || {
            let sender: Arc<dyn MessageSender> = Arc::new(TelegramSender::new(Bot::new(token.clone())));
            sender
        });
        Self::new(Arc::new(TelegramSender::new(bot)), fresh)
    }

    /// Sends `message`, retrying once on a fresh client.
    ///
    /// Returns whether the message went out; failures are logged, never raised.
    pub async fn deliver(&self, message: &OutboundMessage) -> bool {
        let first_error = match self.primary.send(message).await {
            Ok(()) => return true,
            Err(e) => e,
        };

        warn!(
            "Delivery to chat {} failed, retrying with a fresh client: {}",
            message.chat_id, first_error
        );

        let fresh = (self.fresh)();
        match fresh.send(message).await {
            Ok(()) => {
                info!("Delivery to chat {} succeeded on retry", message.chat_id);
                true
            }
            Err(e) => {
                error!("Delivery to chat {} failed after retry: {}", message.chat_id, e);
                false
            }
        }
    }
}
