//! Error types for the session layer.

use stagehand_protocol::CharId;
use stagehand_transport::ConnectionId;

use crate::SessionPhase;

/// Errors that can occur during a session's lifetime.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Authentication failed: the token was rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The session already has a character bound to it.
    #[error("session already logged in as {0}")]
    AlreadyLoggedIn(CharId),

    /// The operation requires a logged-in character.
    #[error("session is not logged in")]
    NotLoggedIn,

    /// The operation needs the session to be inside a stage.
    #[error("session is not in a stage")]
    NotInStage,

    /// `BACK_STAGE` with no history to go back to.
    #[error("stage move history is empty")]
    EmptyMoveStack,

    /// The send loop has stopped, so nothing more can be queued.
    #[error("outbound queue for {0} is closed")]
    OutboxClosed(ConnectionId),

    /// A lifecycle transition the state machine does not allow.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },
}
