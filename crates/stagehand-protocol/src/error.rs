//! Error types for the protocol layer.
//!
//! Each crate in Stagehand defines its own error enum. A `ProtocolError`
//! always means the bytes themselves were wrong: too short, or carrying a
//! value the packet layout does not allow.

/// Errors that can occur while parsing a packet body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The body ended before a field could be read.
    ///
    /// The rest of the packet group cannot be trusted after this, because
    /// the position of the next opcode is unknown.
    #[error("truncated packet: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// The packet parsed but violates a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
