//! Telegram channel — long-polls the Bot API for updates.
//!
//! `TelegramApi` is the thin Bot API client shared with the webhook channel;
//! `TelegramChannel` is the pull-based transport built on it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Production Bot API endpoint.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Minimal Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramApi {
    bot_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramApi {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            base_url: TELEGRAM_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different server (tests, local Bot API servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn bot_token(&self) -> &str {
        &self.bot_token
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.bot_token)
    }

    /// POST a Bot API method and return its `result` field.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: {e}")))?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("{method} ({status}): {e}")))?;

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(ChannelError::Http(format!(
                "{method} failed ({status}): {description}"
            )));
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Send a text message, splitting anything over Telegram's limit.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    /// Sent without `parse_mode`, so the user sees exactly the text that
    /// was logged. One attempt only.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        self.call("sendMessage", &body)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }

    /// `getMe` — validates the token.
    pub async fn get_me(&self) -> Result<Value, ChannelError> {
        self.call("getMe", &json!({})).await
    }

    /// Fetch pending updates, blocking up to `timeout_secs` server-side.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Value>, ChannelError> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        match self.call("getUpdates", &body).await? {
            Value::Array(updates) => Ok(updates),
            other => Err(ChannelError::InvalidMessage(format!(
                "getUpdates returned non-array result: {other}"
            ))),
        }
    }

    /// Register `url` as the push destination. Telegram echoes
    /// `secret_token` back in every delivery's header.
    pub async fn set_webhook(&self, url: &str, secret_token: &str) -> Result<(), ChannelError> {
        let body = json!({
            "url": url,
            "secret_token": secret_token,
            "allowed_updates": ["message"],
        });
        self.call("setWebhook", &body).await.map(|_| ())
    }

    /// Remove any registered webhook (getUpdates refuses to work while one
    /// is set).
    pub async fn delete_webhook(&self) -> Result<(), ChannelError> {
        self.call("deleteWebhook", &json!({ "drop_pending_updates": false }))
            .await
            .map(|_| ())
    }
}

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    api: TelegramApi,
}

impl TelegramChannel {
    pub fn new(api: TelegramApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        if let Err(e) = self.api.delete_webhook().await {
            tracing::warn!(error = %e, "Could not clear webhook before polling");
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let api = self.api.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            tracing::info!("Telegram channel listening for messages...");

            loop {
                let updates = match api.get_updates(offset, POLL_TIMEOUT_SECS).await {
                    Ok(updates) => updates,
                    Err(e) => {
                        tracing::warn!(error = %e, "Telegram poll error");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                for update in updates {
                    if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                        offset = update_id + 1;
                    }

                    let Some(incoming) = parse_update(&update) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.api.send_message(chat_id_of(msg)?, &response.content).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.api
            .get_me()
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Turn a Bot API `Update` into an inbound message.
///
/// Only plain text messages count; bot commands (`/start`, ...) and
/// non-text updates are skipped.
pub fn parse_update(update: &Value) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;

    if text.starts_with('/') {
        tracing::debug!(command = text, "Ignoring bot command");
        return None;
    }

    let from = message.get("from");
    let user_id = from.and_then(|f| f.get("id")).and_then(Value::as_i64)?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .unwrap_or(user_id);
    let username = from.and_then(|f| f.get("username")).and_then(Value::as_str);
    let first_name = from.and_then(|f| f.get("first_name")).and_then(Value::as_str);

    let mut incoming = IncomingMessage::new("telegram", user_id.to_string(), text).with_metadata(
        json!({
            "chat_id": chat_id.to_string(),
            "username": username,
            "update_id": update.get("update_id"),
        }),
    );
    if let Some(name) = first_name.or(username) {
        incoming = incoming.with_user_name(name);
    }
    Some(incoming)
}

/// The chat a reply should go to.
pub(crate) fn chat_id_of(msg: &IncomingMessage) -> Result<&str, ChannelError> {
    msg.metadata
        .get("chat_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: "No chat_id in message metadata".into(),
        })
}

/// Split a message into chunks of at most `max_chars` characters.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_chars {
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let window = &remaining[..limit];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
