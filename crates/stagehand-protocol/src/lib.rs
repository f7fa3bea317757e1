//! Wire protocol for the Stagehand channel server.
//!
//! This crate defines the "language" spoken inside a packet group:
//!
//! - **Opcodes** ([`Opcode`]): the 2-byte big-endian tag in front of
//!   every logical packet.
//! - **Reading** ([`FrameReader`]): bounds-checked big-endian reads, so a
//!   short or corrupt body becomes a [`ProtocolError`] instead of a panic.
//! - **Packets** ([`ClientPacket`], [`ServerPacket`]): how each core
//!   packet is parsed from, or built into, bytes.
//! - **Acks** ([`Ack`]): the typed reply correlated to a request handle.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (opaque packet groups) and the
//! channel server (sessions and stages). It doesn't know about connections
//! or stages. It only knows byte layouts.
//!
//! ```text
//! Transport (group bytes) → Protocol (opcode + packet) → Server (handlers)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod ack;
mod context;
mod error;
mod ids;
mod opcode;
mod packet;
pub mod packets;
mod reader;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use ack::{Ack, AckKind};
pub use context::{ClientContext, TextEncoding};
pub use error::ProtocolError;
pub use ids::CharId;
pub use opcode::Opcode;
pub use packet::{
    ClientPacket, PacketGroupBuilder, ServerPacket, encode_packet,
    put_pascal_string,
};
pub use reader::FrameReader;
