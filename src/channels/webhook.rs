//! Telegram webhook channel — Telegram pushes updates to our HTTP server.
//!
//! `router()` exposes the delivery endpoint; it must be merged into the
//! web server before `start()` registers the URL with Telegram.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::channels::telegram::{TelegramApi, chat_id_of, parse_update};
use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Header Telegram uses to echo the secret given to `setWebhook`.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

const SECRET_LEN: usize = 32;

/// State shared between the channel and the HTTP handler.
struct WebhookInner {
    secret: String,
    incoming_tx: mpsc::UnboundedSender<IncomingMessage>,
}

#[derive(Clone)]
struct HookState {
    inner: Arc<WebhookInner>,
}

/// Push-based Telegram transport.
pub struct TelegramWebhookChannel {
    api: TelegramApi,
    public_base: String,
    inner: Arc<WebhookInner>,
    /// Consumed once in `start()`.
    incoming_rx: Mutex<Option<mpsc::UnboundedReceiver<IncomingMessage>>>,
}

impl TelegramWebhookChannel {
    /// `external_hostname` is the bare public host, e.g. `bot.example.com`.
    pub fn new(api: TelegramApi, external_hostname: &str) -> Self {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect();
        Self::with_secret(api, external_hostname, secret)
    }

    pub fn with_secret(api: TelegramApi, external_hostname: &str, secret: impl Into<String>) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let host = external_hostname
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');

        Self {
            api,
            public_base: format!("https://{host}"),
            inner: Arc::new(WebhookInner {
                secret: secret.into(),
                incoming_tx,
            }),
            incoming_rx: Mutex::new(Some(incoming_rx)),
        }
    }

    /// Path Telegram posts to. Derived from the bot token so it is not
    /// guessable; ':' is not path-friendly and becomes '_'.
    pub fn path(&self) -> String {
        format!("/telegram/{}", self.api.bot_token().replace(':', "_"))
    }

    pub fn webhook_url(&self) -> String {
        format!("{}{}", self.public_base, self.path())
    }

    pub fn secret(&self) -> &str {
        &self.inner.secret
    }

    /// Router with the single delivery endpoint.
    pub fn router(&self) -> Router {
        let state = HookState {
            inner: Arc::clone(&self.inner),
        };
        Router::new()
            .route(&self.path(), post(receive_update))
            .with_state(state)
    }
}

async fn receive_update(
    State(state): State<HookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if presented != Some(state.inner.secret.as_str()) {
        warn!("Rejected webhook delivery with bad secret");
        return StatusCode::UNAUTHORIZED;
    }

    let update: Value = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "Webhook delivery is not JSON");
            return StatusCode::BAD_REQUEST;
        }
    };

    match parse_update(&update) {
        Some(msg) => {
            if state.inner.incoming_tx.send(msg).is_err() {
                warn!("Webhook update dropped: relay not running");
            }
        }
        None => debug!(update_id = ?update.get("update_id"), "Ignoring non-text update"),
    }
    // Anything but 2xx makes Telegram redeliver.
    StatusCode::OK
}

#[async_trait]
impl Channel for TelegramWebhookChannel {
    fn name(&self) -> &str {
        "telegram-webhook"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let rx = self
            .incoming_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::StartupFailed {
                name: self.name().to_string(),
                reason: "start() already called".to_string(),
            })?;

        self.api
            .set_webhook(&self.webhook_url(), self.secret())
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        info!(url = %self.public_base, "Telegram webhook registered");

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
                name: self.name().to_string(),
                reason: e.to_string(),
            })
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        info!("Removing Telegram webhook");
        self.api.delete_webhook().await
    }
}
