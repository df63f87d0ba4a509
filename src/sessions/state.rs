//! Per-user onboarding state.

use serde::{Deserialize, Serialize};

/// Onboarding phase of a user.
///
/// One-way: AwaitingName → Named. `Named` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    AwaitingName,
    Named,
}

impl SessionPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        matches!((self, target), (Self::AwaitingName, Self::Named))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Named)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingName => "awaiting_name",
            Self::Named => "named",
        };
        write!(f, "{s}")
    }
}

/// Onboarding record for one user. Lives as long as the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub phase: SessionPhase,
    /// Set exactly when `phase == Named`.
    pub display_name: Option<String>,
}

impl Session {
    /// A fresh session waiting for the user's name.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            phase: SessionPhase::AwaitingName,
            display_name: None,
        }
    }

    pub fn is_named(&self) -> bool {
        self.phase == SessionPhase::Named
    }

    /// Capture the display name. Returns `false` (and changes nothing) if
    /// the session already has one.
    pub fn capture_name(&mut self, name: impl Into<String>) -> bool {
        if !self.phase.can_transition_to(SessionPhase::Named) {
            return false;
        }
        self.display_name = Some(name.into());
        self.phase = SessionPhase::Named;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_transition_is_valid() {
        use SessionPhase::*;
        assert!(AwaitingName.can_transition_to(Named));
        assert!(!Named.can_transition_to(AwaitingName));
        assert!(!Named.can_transition_to(Named));
        assert!(!AwaitingName.can_transition_to(AwaitingName));
    }

    #[test]
    fn named_is_terminal() {
        assert!(SessionPhase::Named.is_terminal());
        assert!(!SessionPhase::AwaitingName.is_terminal());
    }

    #[test]
    fn display_matches_serde() {
        for phase in [SessionPhase::AwaitingName, SessionPhase::Named] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(format!("\"{phase}\""), json);
        }
    }

    #[test]
    fn capture_name_once() {
        let mut session = Session::new("42");
        assert_eq!(session.phase, SessionPhase::AwaitingName);
        assert!(session.display_name.is_none());

        assert!(session.capture_name("Hello"));
        assert!(session.is_named());
        assert_eq!(session.display_name.as_deref(), Some("Hello"));

        assert!(!session.capture_name("Other"));
        assert_eq!(session.display_name.as_deref(), Some("Hello"));
    }
}
