//! The `Channel` trait and the message types that flow through it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ChannelError;

/// An inbound user message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Name of the channel that produced it.
    pub channel: String,
    /// Stable user identifier on that channel.
    pub user_id: String,
    /// Platform-provided name, if any. Informational only.
    pub user_name: Option<String>,
    /// Message text as delivered.
    pub content: String,
    /// Channel-specific routing data (e.g. Telegram `chat_id`).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            user_id: user_id.into(),
            user_name: None,
            content: content.into(),
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
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
}

/// A reply to send back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Stream of inbound messages from a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A bidirectional message transport.
///
/// Whether messages are pulled (long-polling) or pushed (webhook) is the
/// implementation's business; callers only see the stream.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving messages. Called once.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a reply to the sender of `msg`. Not retried on failure.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Verify credentials / connectivity.
    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Release transport resources.
    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
