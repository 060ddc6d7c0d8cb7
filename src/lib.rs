//! FitCoach: a Telegram fitness-coach bot.

pub mod channels;
pub mod coach;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
