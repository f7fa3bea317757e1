//! The session lifecycle state machine.

use std::fmt;

/// Where a connection is in its lifecycle.
///
/// ```text
///   Connected ──(login)──→ Authenticated ──(enter)──→ InStage
///       │                        │      ←──(leave)──     │
///       └────────────────────────┴───(disconnect)────────┴──→ Disconnected
/// ```
///
/// - **Connected**: socket accepted, no character bound yet.
/// - **Authenticated**: a character is bound, not inside any stage.
/// - **InStage**: a member of exactly one stage. Moving between stages
///   stays in this phase.
/// - **Disconnected**: teardown has run. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connected,
    Authenticated,
    InStage,
    Disconnected,
}

impl SessionPhase {
    /// Whether a character is bound to the session.
    pub fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated | Self::InStage)
    }

    /// Returns `true` if moving to `target` is a valid transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        use SessionPhase::*;
        matches!(
            (self, target),
            (Connected, Authenticated)
                | (Authenticated, InStage)
                | (InStage, InStage)
                | (InStage, Authenticated)
                | (Connected | Authenticated | InStage, Disconnected)
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::Authenticated => write!(f, "Authenticated"),
            Self::InStage => write!(f, "InStage"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_phase_login_then_enter() {
        assert!(
            SessionPhase::Connected
                .can_transition_to(SessionPhase::Authenticated)
        );
        assert!(
            SessionPhase::Authenticated.can_transition_to(SessionPhase::InStage)
        );
    }

    #[test]
    fn test_session_phase_cannot_enter_before_login() {
        assert!(!SessionPhase::Connected.can_transition_to(SessionPhase::InStage));
    }

    #[test]
    fn test_session_phase_disconnected_is_terminal() {
        for target in [
            SessionPhase::Connected,
            SessionPhase::Authenticated,
            SessionPhase::InStage,
            SessionPhase::Disconnected,
        ] {
            assert!(!SessionPhase::Disconnected.can_transition_to(target));
        }
    }

    #[test]
    fn test_session_phase_is_authenticated() {
        assert!(!SessionPhase::Connected.is_authenticated());
        assert!(SessionPhase::Authenticated.is_authenticated());
        assert!(SessionPhase::InStage.is_authenticated());
        assert!(!SessionPhase::Disconnected.is_authenticated());
    }
}
