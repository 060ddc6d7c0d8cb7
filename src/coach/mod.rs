//! The fitness coach: conversation state machine and its run loop.

pub mod commands;
pub mod dispatcher;
pub mod handler;
pub mod prompts;
pub mod questions;
pub mod state;

pub use commands::Command;
pub use dispatcher::Dispatcher;
pub use handler::Coach;
pub use state::{ConversationState, ProgressDraft, ProgressStep, SessionTable};
