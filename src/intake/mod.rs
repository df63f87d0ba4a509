//! Intake state machine — name capture on first contact, then chat turns.
//!
//! ```text
//!   first message ──▶ AwaitingName ──(text becomes name)──▶ Named
//!                                                            │
//!              every later message: complete → reply → log ◀─┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::llm::TextCompleter;
use crate::sessions::{SessionDirectory, SessionPhase};
use crate::store::{ConversationStore, NewConversationRecord};

/// Acknowledgement sent after the first message, echoing the captured name.
pub fn greeting(name: &str) -> String {
    format!("تشرفت بمعرفتك يا {name}! 🌟\nاكتبلي أي سؤال تحب.")
}

/// Reply used when the completion backend fails.
pub fn diagnostic(error: &impl std::fmt::Display) -> String {
    format!("⚠️ خطأ في الاتصال بالذكاء الاصطناعي: {error}")
}

/// Routes each inbound message through onboarding or a chat turn.
pub struct IntakeMachine {
    sessions: Arc<dyn SessionDirectory>,
    completer: TextCompleter,
    store: Arc<dyn ConversationStore>,
    /// One lock per user; held for a whole `handle` call.
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IntakeMachine {
    pub fn new(
        sessions: Arc<dyn SessionDirectory>,
        completer: TextCompleter,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            sessions,
            completer,
            store,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    /// Handle one inbound message and return the reply to send.
    ///
    /// Never fails: completion errors become a diagnostic reply and store
    /// errors are only logged.
    pub async fn handle(&self, user_id: &str, raw_text: &str) -> String {
        let lock = self.user_lock(user_id).await;
        let _turn = lock.lock().await;

        let session = self.sessions.get_or_create(user_id).await;
        match session.phase {
            SessionPhase::AwaitingName => self.capture_name(user_id, raw_text).await,
            SessionPhase::Named => {
                let username = session.display_name.unwrap_or_default();
                self.chat_turn(user_id, &username, raw_text).await
            }
        }
    }

    async fn capture_name(&self, user_id: &str, raw_text: &str) -> String {
        let name = raw_text.trim();
        if let Err(e) = self.sessions.set_name(user_id, name).await {
            warn!(user_id, error = %e, "Could not record display name");
        }
        info!(user_id, name, "User introduced themselves");
        greeting(name)
    }

    async fn chat_turn(&self, user_id: &str, username: &str, text: &str) -> String {
        info!("{username}: {text}");

        let reply = match self.completer.complete_text(text).await {
            Ok(output) => output,
            Err(e) => {
                error!(user_id, model = self.completer.model_name(), error = %e, "Completion failed");
                diagnostic(&e)
            }
        };

        let record = NewConversationRecord::now(user_id, username, text, reply.as_str());
        match self.store.append(&record).await {
            Ok(record_id) => tracing::debug!(user_id, record_id, "Chat turn logged"),
            Err(e) => error!(user_id, error = %e, "Failed to log chat turn"),
        }

        reply
    }
}
