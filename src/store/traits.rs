//! `ConversationStore` trait — the append-only chat log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;

/// A logged chat turn as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationRecord {
    /// Store-assigned, monotonic.
    pub id: i64,
    pub user_id: String,
    /// Display name at the time of the turn.
    pub username: String,
    /// What the user sent.
    pub message: String,
    /// What the relay answered (model output or diagnostic text).
    pub bot_reply: String,
    pub timestamp: DateTime<Utc>,
}

/// A chat turn about to be logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversationRecord {
    pub user_id: String,
    pub username: String,
    pub message: String,
    pub bot_reply: String,
    pub timestamp: DateTime<Utc>,
}

impl NewConversationRecord {
    /// Build a record stamped with the current time.
    pub fn now(
        user_id: impl Into<String>,
        username: impl Into<String>,
        message: impl Into<String>,
        bot_reply: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            message: message.into(),
            bot_reply: bot_reply.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Retrieval order by insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Asc,
    /// Newest first.
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Backend-agnostic conversation log.
///
/// Records are never updated or deleted. Concurrent writers are serialized
/// by the backend; `id` order is the only ordering guarantee.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Durably write one record and return its id. An `Ok` means the record
    /// is visible to every later `list` call.
    async fn append(&self, record: &NewConversationRecord) -> Result<i64, DatabaseError>;

    /// Records in insertion order (`Asc`) or reverse (`Desc`). With a
    /// `limit`, only the earliest (`Asc`) or most recent (`Desc`) entries.
    async fn list(
        &self,
        limit: Option<usize>,
        order: SortOrder,
    ) -> Result<Vec<ConversationRecord>, DatabaseError>;

    /// Total number of records.
    async fn count(&self) -> Result<u64, DatabaseError>;
}
