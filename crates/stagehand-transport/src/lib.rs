//! Packet-group transport for the Stagehand channel server.
//!
//! Clients talk to the channel server over a plain TCP stream. Every write
//! is a *packet group*: one or more encoded packets followed by the
//! `MSG_SYS_END` terminator, framed by a 14-byte header and passed through
//! a body cipher.
//!
//! This crate knows nothing about opcodes beyond the terminator. It moves
//! opaque byte groups in and out:
//!
//! ```text
//! TcpStream ─┬─ CryptReader ──→ read_packet_group()  ──→ dispatch
//!            └─ CryptWriter ←── send_packet_group()  ←── send loop
//! ```
//!
//! # Feature Flags
//!
//! - `tcp` (default): the tokio [`TcpTransport`] listener and [`CryptConn`]

mod cipher;
mod crypt;
mod error;
#[cfg(feature = "tcp")]
mod tcp;

pub use cipher::{Checks, Cipher, NullCipher};
pub use crypt::{
    CryptHeader, CryptReader, CryptWriter, HEADER_LEN, INITIAL_KEY,
    SEND_KEY_ROT_DELTA, rotate_key,
};
pub use error::TransportError;
#[cfg(feature = "tcp")]
pub use tcp::{CryptConn, TcpTransport};

use std::fmt;
use std::future::Future;

use bytes::Bytes;

/// The two-byte `MSG_SYS_END` opcode that closes every outbound group.
pub const END_TERMINATOR: [u8; 2] = [0x00, 0x10];

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The receiving half of a connection.
///
/// The return type spells out `+ Send` so generic callers can hand the
/// future to `tokio::spawn`.
pub trait PacketReader: Send + 'static {
    /// Reads and decrypts the next packet group.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly.
    fn read_packet_group(
        &mut self,
    ) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send;
}

/// The sending half of a connection.
pub trait PacketWriter: Send + 'static {
    /// Encrypts and writes one packet group.
    ///
    /// The caller's bytes are copied and [`END_TERMINATOR`] is appended to
    /// the copy; `data` itself is never modified.
    fn send_packet_group(
        &mut self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }

    #[test]
    fn test_end_terminator_is_opcode_0x10() {
        assert_eq!(u16::from_be_bytes(END_TERMINATOR), 0x0010);
    }
}
