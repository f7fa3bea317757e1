//! The per-session log key.

use std::fmt;

use rand::Rng;

/// 16 random bytes the client uses to tag its log uploads.
///
/// Issued once per session on `MSG_SYS_ISSUE_LOGKEY`; later requests get
/// the same key back.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LogKey([u8; 16]);

impl LogKey {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        Self(rng.random())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// The key is a secret, so `Debug` doesn't print it.
impl fmt::Debug for LogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_returns_distinct_keys() {
        assert_ne!(LogKey::generate(), LogKey::generate());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        assert_eq!(format!("{:?}", LogKey::generate()), "LogKey(..)");
    }
}
