//! Unified error type for the Stagehand channel server.

use stagehand_protocol::ProtocolError;
use stagehand_session::SessionError;
use stagehand_stage::StageError;
use stagehand_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// Handlers and the server loop return this single type. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A transport-level error (accept, send, receive, checksum).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A packet body that could not be parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, closed outbox, empty move stack).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A stage or semaphore error (full, missing, wrong password).
    #[error(transparent)]
    Stage(#[from] StageError),

    /// The configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use stagehand_protocol::CharId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let channel_err: ChannelError = err.into();
        assert!(matches!(channel_err, ChannelError::Transport(_)));
        assert!(channel_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let channel_err: ChannelError = err.into();
        assert!(matches!(channel_err, ChannelError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AlreadyLoggedIn(CharId(3));
        let channel_err: ChannelError = err.into();
        assert!(matches!(channel_err, ChannelError::Session(_)));
        assert!(channel_err.to_string().contains("C-3"));
    }

    #[test]
    fn test_from_stage_error() {
        let err = StageError::NotFound("sl1Ns200p0a0u0".into());
        let channel_err: ChannelError = err.into();
        assert!(matches!(channel_err, ChannelError::Stage(_)));
    }
}
