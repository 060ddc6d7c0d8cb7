//! Terminal channel for trying the bot without Telegram.
//!
//! One local user. Reply keyboards are printed as a numbered list and the
//! user may answer with the number instead of the full option.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, ReplyKeyboard};
use crate::error::ChannelError;

const PROMPT: &str = "> ";

pub struct CliChannel {
    user_id: String,
    /// Options from the last keyboard shown, for numeric answers.
    choices: Arc<Mutex<Vec<String>>>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            user_id: "local-user".to_string(),
            choices: Arc::default(),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn render(response: &OutgoingResponse) -> String {
    let mut out = response.content.clone();
    if let Some(ReplyKeyboard::Choices(options)) = &response.keyboard {
        for (i, option) in options.iter().enumerate() {
            out.push_str(&format!("\n  [{}] {option}", i + 1));
        }
    }
    out
}

/// Map a typed line to message text: `2` picks the second shown option.
fn resolve_input(line: &str, choices: &[String]) -> String {
    line.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| choices.get(i))
        .cloned()
        .unwrap_or_else(|| line.to_string())
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let user_id = self.user_id.clone();
        let choices = self.choices.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            eprint!("{PROMPT}");

            while let Some(line) = match lines.next_line().await {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!("stdin: {e}");
                    None
                }
            } {
                let line = line.trim();
                if line.is_empty() {
                    eprint!("{PROMPT}");
                    continue;
                }
                let text = match choices.lock() {
                    Ok(shown) => resolve_input(line, &shown),
                    Err(_) => line.to_string(),
                };
                let msg = IncomingMessage::new("cli", &user_id, text)
                    .with_user_name("You")
                    .with_metadata(serde_json::json!({ "first_name": "You" }));
                if tx.send(msg).is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        })))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        if let Ok(mut shown) = self.choices.lock() {
            match &response.keyboard {
                Some(ReplyKeyboard::Choices(options)) => shown.clone_from(options),
                Some(ReplyKeyboard::Remove) => shown.clear(),
                None => {}
            }
        }
        println!("\n{}\n", render(&response));
        eprint!("{PROMPT}");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
