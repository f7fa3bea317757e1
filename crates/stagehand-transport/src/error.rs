//! Error types for the transport layer.

/// Errors that can occur while reading or writing packet groups.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A decrypted body did not match the checks carried in its header.
    ///
    /// Either the peer uses a different cipher, or the stream lost sync.
    /// The connection cannot recover from this.
    #[error(
        "checksum mismatch on packet {packet_num}: header {expected:04x?}, body {actual:04x?}"
    )]
    ChecksumMismatch {
        packet_num: u16,
        expected: [u16; 3],
        actual: [u16; 3],
    },

    /// The packet group does not fit in the 16-bit size field.
    #[error("packet group of {0} bytes exceeds the frame size limit")]
    PacketTooLarge(usize),
}
