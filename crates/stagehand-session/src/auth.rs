//! Login hook for resolving a character.
//!
//! The channel server doesn't own the character database. When a client
//! sends `MSG_SYS_LOGIN` it claims a character ID and presents the token it
//! got from the sign-in server; deciding whether that claim is genuine is
//! the job of whatever sits behind the [`Authenticator`] trait (the sign-in
//! service, a SQL lookup, a cache).
//!
//! The server calls the hook once per session, on the session's own
//! receive task, and binds the returned profile to the session.

use stagehand_protocol::CharId;

use crate::SessionError;

/// What the server needs to know about a logged-in character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterProfile {
    pub char_id: CharId,
    pub name: String,
}

/// Validates a login and returns the character's profile.
///
/// # Trait bounds
///
/// - `Send + Sync` → shared by every session task.
/// - `'static` → lives as long as the server.
///
/// The method returns `impl Future + Send` rather than being an
/// `async fn` so callers in spawned tasks can rely on the future being
/// `Send`.
///
/// # Example
///
/// ```rust
/// use stagehand_protocol::CharId;
/// use stagehand_session::{Authenticator, CharacterProfile, SessionError};
///
/// /// Rejects the reserved character 0, accepts everyone else.
/// struct NonZero;
///
/// impl Authenticator for NonZero {
///     async fn authenticate(
///         &self,
///         char_id: CharId,
///         _token: &str,
///     ) -> Result<CharacterProfile, SessionError> {
///         if char_id.0 == 0 {
///             return Err(SessionError::AuthFailed("character 0".into()));
///         }
///         Ok(CharacterProfile { char_id, name: format!("hunter{}", char_id.0) })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Resolves a login claim.
    ///
    /// # Returns
    /// - `Ok(CharacterProfile)`: the claim is genuine
    /// - `Err(SessionError::AuthFailed)`: token rejected or character
    ///   unknown
    fn authenticate(
        &self,
        char_id: CharId,
        token: &str,
    ) -> impl std::future::Future<Output = Result<CharacterProfile, SessionError>>
    + Send;
}

/// Accepts every claim and names the character after its ID.
///
/// For local tooling and tests only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustingAuthenticator;

impl Authenticator for TrustingAuthenticator {
    async fn authenticate(
        &self,
        char_id: CharId,
        _token: &str,
    ) -> Result<CharacterProfile, SessionError> {
        Ok(CharacterProfile {
            char_id,
            name: format!("char-{}", char_id.0),
        })
    }
}
