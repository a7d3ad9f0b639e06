//! # Productivity Bot
//!
//! A Telegram bot for personal reminders, tasks, habits and notes.
//!
//! ## Features
//! - One-off reminders from natural time expressions ("in 2 hours",
//!   "tomorrow at 9am", "27-06-2025 at 14:30")
//! - Tasks with priorities, due dates and projects
//! - Daily habit check-ins with streaks
//! - Notes with categories, tags, search and field edits
//! - An optional `/ask` assistant backed by OpenAI or DeepSeek
//! - Per-user timezone and notification switches, with a daily habit
//!   check-in, a morning deadline sweep and a Sunday summary
//! - Persistent storage with SQLite

/// Bot command handlers and message processing
pub mod bot;
/// Configuration management and environment variables
pub mod config;
/// Database models, connections, and migrations
pub mod database;
/// Scheduling, delivery and notification services
pub mod services;
/// Utility functions for datetime, validation, and formatting
pub mod utils;
