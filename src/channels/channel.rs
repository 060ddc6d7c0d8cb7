//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;

/// Inbound messages from a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A text message received from a user.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel that produced the message.
    pub channel: String,
    /// Stable sender id (Telegram numeric id as a string).
    pub user_id: String,
    /// Display name, usually the first name.
    pub user_name: Option<String>,
    pub content: String,
    pub received_at: DateTime<Utc>,
    /// Transport-specific fields: `chat_id`, `username`, `first_name`, `last_name`.
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user_id: user_id.into(),
            user_name: None,
            content: content.into(),
            received_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Transport handle (`@name` without the `@`), if the user has one.
    pub fn username(&self) -> Option<&str> {
        self.meta_str("username")
    }

    pub fn first_name(&self) -> Option<&str> {
        self.meta_str("first_name").or(self.user_name.as_deref())
    }

    /// First and last name joined by a space and trimmed.
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name().unwrap_or_default(),
            self.meta_str("last_name").unwrap_or_default()
        )
        .trim()
        .to_string()
    }

    /// Name used in log lines: the handle if present, else the user id.
    pub fn sender_label(&self) -> &str {
        self.username().unwrap_or(&self.user_id)
    }
}

/// How the transport should interpret the reply text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextFormat {
    #[default]
    Plain,
    Markdown,
}

/// Reply keyboard attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKeyboard {
    /// One-time single-choice keyboard, one option per row.
    Choices(Vec<String>),
    /// Clear any keyboard currently shown.
    Remove,
}

/// A reply to send back through the originating channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingResponse {
    pub content: String,
    pub format: TextFormat,
    pub keyboard: Option<ReplyKeyboard>,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format: TextFormat::Plain,
            keyboard: None,
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format: TextFormat::Markdown,
            keyboard: None,
        }
    }

    pub fn with_choices<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keyboard = Some(ReplyKeyboard::Choices(
            options.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn remove_keyboard(mut self) -> Self {
        self.keyboard = Some(ReplyKeyboard::Remove);
        self
    }
}

/// A bidirectional message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a reply to the chat the message came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Show a "typing" indicator while a slow reply is produced.
    async fn send_typing(&self, _msg: &IncomingMessage) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_joins_and_trims() {
        let msg = IncomingMessage::new("telegram", "1", "hi").with_metadata(serde_json::json!({
            "first_name": "Ana",
            "last_name": "Silva",
        }));
        assert_eq!(msg.full_name(), "Ana Silva");

        let only_first = IncomingMessage::new("telegram", "1", "hi")
            .with_metadata(serde_json::json!({"first_name": "Ana"}));
        assert_eq!(only_first.full_name(), "Ana");

        let none = IncomingMessage::new("telegram", "1", "hi");
        assert_eq!(none.full_name(), "");
    }

    #[test]
    fn first_name_falls_back_to_user_name() {
        let msg = IncomingMessage::new("cli", "local-user", "hi").with_user_name("You");
        assert_eq!(msg.first_name(), Some("You"));
    }

    #[test]
    fn sender_label_prefers_username() {
        let msg = IncomingMessage::new("telegram", "42", "hi")
            .with_metadata(serde_json::json!({"username": "lifter"}));
        assert_eq!(msg.sender_label(), "lifter");
        assert_eq!(msg.username(), Some("lifter"));

        let anon = IncomingMessage::new("telegram", "42", "hi")
            .with_metadata(serde_json::json!({"username": ""}));
        assert_eq!(anon.sender_label(), "42");
        assert_eq!(anon.username(), None);
    }

    #[test]
    fn response_builders() {
        let r = OutgoingResponse::text("Pick one").with_choices(["Gym", "Home"]);
        assert_eq!(r.format, TextFormat::Plain);
        assert_eq!(
            r.keyboard,
            Some(ReplyKeyboard::Choices(vec!["Gym".into(), "Home".into()]))
        );

        let r = OutgoingResponse::markdown("*bold*").remove_keyboard();
        assert_eq!(r.format, TextFormat::Markdown);
        assert_eq!(r.keyboard, Some(ReplyKeyboard::Remove));
    }
}
