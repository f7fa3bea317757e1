//! Identity newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A character's persistent ID, bound to a session at login.
///
/// Newtype over the wire's `u32` so a character ID can't be passed where
/// an object or semaphore ID is expected. Packets carry the raw `u32`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CharId(pub u32);

/// `tracing::info!(%char_id, ...)` prints "C-42".
impl fmt::Display for CharId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}
