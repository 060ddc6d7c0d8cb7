//! Telegram Bot API channel over plain `reqwest`.
//!
//! Inbound: a background task long-polls `getUpdates` and forwards text
//! messages from allowed senders. Outbound: `sendMessage`, split to the API
//! limit, with reply keyboards and a plain-text retry when Telegram rejects
//! our Markdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::channels::{
    Channel, IncomingMessage, MessageStream, OutgoingResponse, ReplyKeyboard, TextFormat,
};
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "telegram";
const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// `sendMessage` rejects texts longer than this many characters.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Seconds Telegram holds a `getUpdates` call open when nothing arrives.
const LONG_POLL_SECS: u64 = 30;

const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Senders permitted to talk to the bot: usernames or numeric ids, `*` for all.
#[derive(Debug, Clone)]
struct Allowlist(Arc<[String]>);

impl Allowlist {
    fn permits(&self, identities: &[&str]) -> bool {
        self.0
            .iter()
            .any(|entry| entry == "*" || identities.contains(&entry.as_str()))
    }
}

pub struct TelegramChannel {
    bot_token: String,
    allowlist: Allowlist,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowlist: Allowlist(allowed_users.into()),
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Talk to a different Bot API server (self-hosted or a test stub).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// Whether a sender with this username or numeric id may use the bot.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        self.allowlist.permits(&[identity])
    }

    async fn deliver(&self, chat_id: &str, response: &OutgoingResponse) -> Result<(), ChannelError> {
        let chunks = chunk_text(&response.content, MAX_MESSAGE_CHARS);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.into_iter().enumerate() {
            // Only the final chunk carries the keyboard so it sits under the last bubble.
            let keyboard = (i == last).then_some(response.keyboard.as_ref()).flatten();
            self.send_chunk(chat_id, chunk, response.format, keyboard)
                .await?;
        }
        Ok(())
    }

    async fn send_chunk(
        &self,
        chat_id: &str,
        text: &str,
        format: TextFormat,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<(), ChannelError> {
        let rejected = match self
            .post_message(&message_body(chat_id, text, format, keyboard))
            .await?
        {
            None => return Ok(()),
            Some(reason) => reason,
        };

        if format == TextFormat::Plain {
            return Err(send_failed(rejected));
        }

        tracing::warn!(%rejected, "Telegram refused Markdown, resending as plain text");
        match self
            .post_message(&message_body(chat_id, text, TextFormat::Plain, keyboard))
            .await?
        {
            None => Ok(()),
            Some(plain) => Err(send_failed(format!(
                "markdown: {rejected}; plain: {plain}"
            ))),
        }
    }

    /// POST `sendMessage`; `Some(reason)` when the API answered with an error.
    async fn post_message(&self, body: &Value) -> Result<Option<String>, ChannelError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(body)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(None);
        }
        let detail = resp.text().await.unwrap_or_default();
        Ok(Some(format!("{status} {detail}")))
    }
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: CHANNEL_NAME.into(),
        reason,
    }
}

fn startup_failed(reason: String) -> ChannelError {
    ChannelError::StartupFailed {
        name: CHANNEL_NAME.into(),
        reason,
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let url = self.api_url("getUpdates");
        let allowlist = self.allowlist.clone();

        tokio::spawn(async move {
            tracing::info!("Polling Telegram for updates");
            let mut offset = 0i64;

            loop {
                let updates = match fetch_updates(&client, &url, offset).await {
                    Ok(updates) => updates,
                    Err(reason) => {
                        tracing::warn!("getUpdates failed, retrying in {POLL_BACKOFF:?}: {reason}");
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                for update in &updates {
                    if let Some(id) = update["update_id"].as_i64() {
                        offset = offset.max(id + 1);
                    }
                    let Some(incoming) = update
                        .get("message")
                        .and_then(|m| parse_update_message(m, &allowlist))
                    else {
                        continue;
                    };
                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram consumer dropped, stopping poller");
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        })))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg.metadata["chat_id"]
            .as_str()
            .ok_or_else(|| send_failed(format!("message {} has no chat_id", msg.id)))?;
        self.deliver(chat_id, &response).await
    }

    async fn send_typing(&self, msg: &IncomingMessage) -> Result<(), ChannelError> {
        let Some(chat_id) = msg.metadata["chat_id"].as_str() else {
            return Ok(());
        };
        // Best effort: a lost typing indicator is not worth an error.
        if let Err(e) = self
            .client
            .post(self.api_url("sendChatAction"))
            .json(&json!({ "chat_id": chat_id, "action": "typing" }))
            .send()
            .await
        {
            tracing::debug!("sendChatAction failed: {e}");
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| startup_failed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(startup_failed(format!("getMe answered {}", resp.status())));
        }

        let me: Value = resp
            .json()
            .await
            .map_err(|e| startup_failed(format!("getMe body: {e}")))?;
        tracing::info!(
            bot = me["result"]["username"].as_str().unwrap_or("?"),
            "Connected to Telegram"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel stopped");
        Ok(())
    }
}

/// One long-poll round trip. Errors are returned as text for the retry log.
async fn fetch_updates(
    client: &reqwest::Client,
    url: &str,
    offset: i64,
) -> Result<Vec<Value>, String> {
    let body = json!({
        "offset": offset,
        "timeout": LONG_POLL_SECS,
        "allowed_updates": ["message"],
    });
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let mut data: Value = resp.json().await.map_err(|e| e.to_string())?;

    match data.get_mut("result").map(Value::take) {
        Some(Value::Array(updates)) => Ok(updates),
        _ => Err(format!("unexpected getUpdates payload: {data}")),
    }
}

/// Convert a Bot API `message` into an `IncomingMessage`.
///
/// Non-text messages and senders outside the allowlist yield `None`.
fn parse_update_message(message: &Value, allowlist: &Allowlist) -> Option<IncomingMessage> {
    let from = &message["from"];
    let username = from["username"].as_str();
    let sender_id = from["id"].as_i64().map(|id| id.to_string());
    let user_id = sender_id.as_deref().or(username).unwrap_or("unknown");

    let Some(text) = message["text"].as_str() else {
        tracing::info!(from = user_id, "Non-text message");
        return None;
    };

    let identities: Vec<&str> = username.into_iter().chain(sender_id.as_deref()).collect();
    if !allowlist.permits(&identities) {
        tracing::warn!(
            username = username.unwrap_or("-"),
            user_id,
            "Dropping message from sender outside TELEGRAM_ALLOWED_USERS"
        );
        return None;
    }

    let chat_id = message["chat"]["id"]
        .as_i64()
        .map(|id| id.to_string())
        .unwrap_or_default();
    let first_name = from["first_name"].as_str();

    let mut incoming = IncomingMessage::new(CHANNEL_NAME, user_id, text).with_metadata(json!({
        "chat_id": chat_id,
        "username": username,
        "first_name": first_name,
        "last_name": from["last_name"].as_str(),
    }));
    if let Some(name) = first_name.or(username) {
        incoming = incoming.with_user_name(name);
    }
    Some(incoming)
}

/// JSON body for `sendMessage`.
fn message_body(
    chat_id: &str,
    text: &str,
    format: TextFormat,
    keyboard: Option<&ReplyKeyboard>,
) -> Value {
    let mut body = json!({ "chat_id": chat_id, "text": text });
    if format == TextFormat::Markdown {
        body["parse_mode"] = json!("Markdown");
    }
    body["reply_markup"] = match keyboard {
        None => return body,
        Some(ReplyKeyboard::Remove) => json!({ "remove_keyboard": true }),
        Some(ReplyKeyboard::Choices(options)) => json!({
            "keyboard": options.iter().map(|o| [json!({ "text": o })]).collect::<Vec<_>>(),
            "one_time_keyboard": true,
            "resize_keyboard": true,
        }),
    };
    body
}

/// Split `text` into pieces of at most `limit` characters.
///
/// Breaks after the last newline inside the window, else the last space,
/// else mid-word. Whitespace at a break is dropped. Always returns at least
/// one (possibly empty) piece.
fn chunk_text(text: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;

    loop {
        // Byte offset just past the `limit`-th character, if there is one.
        let Some((window_end, _)) = rest.char_indices().nth(limit) else {
            pieces.push(rest);
            return pieces;
        };

        let window = &rest[..window_end];
        let cut = match window.rfind('\n').or_else(|| window.rfind(' ')) {
            Some(0) | None => window_end,
            Some(i) => i,
        };
        pieces.push(&rest[..cut]);
        rest = rest[cut..].trim_start();
        if rest.is_empty() {
            return pieces;
        }
    }
}
