use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, ParseMode};

use crate::utils::markdown::escape_markdown;

/// Feedback types for different command outcomes
#[derive(Debug, Clone, Copy)]
pub enum FeedbackType {
    Success,
    Warning,
    Error,
    Info,
}

impl FeedbackType {
    fn emoji(self) -> &'static str {
        match self {
            FeedbackType::Success => "✅",
            FeedbackType::Warning => "⚠️",
            FeedbackType::Error => "❌",
            FeedbackType::Info => "ℹ️",
        }
    }
}

/// Centralized feedback system for bot commands
pub struct CommandFeedback {
    bot: Bot,
    chat_id: ChatId,
}

impl CommandFeedback {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }

    /// Send plain text prefixed with the feedback emoji
    pub async fn send(&self, feedback_type: FeedbackType, message: &str) -> ResponseResult<Message> {
        let formatted_message = format!("{} {}", feedback_type.emoji(), escape_markdown(message));

        self.bot
            .send_message(self.chat_id, formatted_message)
            .parse_mode(ParseMode::MarkdownV2)
            .await
    }

    /// Send text that is already MarkdownV2, optionally with buttons
    pub async fn rich(&self, markdown: String, keyboard: Option<InlineKeyboardMarkup>) -> ResponseResult<Message> {
        let request = self
            .bot
            .send_message(self.chat_id, markdown)
            .parse_mode(ParseMode::MarkdownV2);

        match keyboard {
            Some(keyboard) => request.reply_markup(keyboard).await,
            None => request.await,
        }
    }

    pub async fn success(&self, message: &str) -> ResponseResult<Message> {
        self.send(FeedbackType::Success, message).await
    }

    pub async fn error(&self, message: &str) -> ResponseResult<Message> {
        self.send(FeedbackType::Error, message).await
    }

    pub async fn warning(&self, message: &str) -> ResponseResult<Message> {
        self.send(FeedbackType::Warning, message).await
    }

    pub async fn info(&self, message: &str) -> ResponseResult<Message> {
        self.send(FeedbackType::Info, message).await
    }

    /// Send command usage with examples
    pub async fn usage(&self, command: &str, description: &str, examples: &[&str]) -> ResponseResult<Message> {
        let mut help_text = format!("*{}*\n\n{}\n\n", escape_markdown(command), escape_markdown(description));

        if !examples.is_empty() {
            help_text.push_str("*Examples:*\n");
            for example in examples {
                help_text.push_str(&format!("• `{}`\n", escape_markdown(example)));
            }
        }

        self.rich(help_text, None).await
    }

    /// Send validation error with helpful suggestion
    pub async fn validation_error(&self, error: &str, suggestion: &str) -> ResponseResult<Message> {
        let message = format!(
            "{} {}\n\n💡 *Suggestion:* {}",
            FeedbackType::Error.emoji(),
            escape_markdown(error),
            escape_markdown(suggestion)
        );
        self.rich(message, None).await
    }
}
