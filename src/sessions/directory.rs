//! Session directory — user id → onboarding session.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::state::Session;
use crate::error::SessionError;

/// Owner of all sessions. Nothing else mutates a `Session`.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Return the user's session, creating an `AwaitingName` one if absent.
    async fn get_or_create(&self, user_id: &str) -> Session;

    /// Record the display name and move the session to `Named`.
    ///
    /// Only valid for an existing session that is still awaiting a name.
    async fn set_name(&self, user_id: &str, name: &str) -> Result<(), SessionError>;

    /// Number of known users.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Process-lifetime directory. Contents are lost on restart, so every user
/// is asked for a name again after a redeploy.
#[derive(Default)]
pub struct InMemorySessionDirectory {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionDirectory for InMemorySessionDirectory {
    async fn get_or_create(&self, user_id: &str) -> Session {
        if let Some(session) = self.sessions.read().await.get(user_id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(user_id, "New session");
                Session::new(user_id)
            })
            .clone()
    }

    async fn set_name(&self, user_id: &str, name: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(user_id)
            .ok_or_else(|| SessionError::NotFound(user_id.to_string()))?;

        if !session.capture_name(name) {
            return Err(SessionError::AlreadyNamed(user_id.to_string()));
        }
        Ok(())
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sessions::SessionPhase;

    #[tokio::test]
    async fn get_or_create_inserts_awaiting_session() {
        let dir = InMemorySessionDirectory::new();
        assert!(dir.is_empty().await);

        let session = dir.get_or_create("42").await;
        assert_eq!(session.user_id, "42");
        assert_eq!(session.phase, SessionPhase::AwaitingName);
        assert!(session.display_name.is_none());
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn get_or_create_returns_existing() {
        let dir = InMemorySessionDirectory::new();
        dir.get_or_create("42").await;
        dir.set_name("42", "Hello").await.unwrap();

        let session = dir.get_or_create("42").await;
        assert_eq!(session.phase, SessionPhase::Named);
        assert_eq!(session.display_name.as_deref(), Some("Hello"));
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn set_name_twice_is_rejected() {
        let dir = InMemorySessionDirectory::new();
        dir.get_or_create("7").await;
        dir.set_name("7", "Amina").await.unwrap();

        let err = dir.set_name("7", "Someone else").await.unwrap_err();
        assert_eq!(err, SessionError::AlreadyNamed("7".into()));
        assert_eq!(
            dir.get_or_create("7").await.display_name.as_deref(),
            Some("Amina")
        );
    }

    #[tokio::test]
    async fn set_name_without_session_is_rejected() {
        let dir = InMemorySessionDirectory::new();
        let err = dir.set_name("nobody", "x").await.unwrap_err();
        assert_eq!(err, SessionError::NotFound("nobody".into()));
    }

    #[tokio::test]
    async fn concurrent_first_contact_creates_one_session() {
        let dir = Arc::new(InMemorySessionDirectory::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let dir = Arc::clone(&dir);
            handles.push(tokio::spawn(async move { dir.get_or_create("99").await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(dir.len().await, 1);
    }
}
