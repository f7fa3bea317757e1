//! The parse/build contract every packet implements.
//!
//! Client packets are *parsed*: the dispatch loop has already consumed the
//! opcode, so `parse` starts at the first body byte and must consume exactly
//! its own body, leaving the reader positioned at the next opcode.
//!
//! Server packets are *built*: `build` writes the body only. The opcode is
//! written by [`encode_packet`] or [`PacketGroupBuilder`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::{ClientContext, FrameReader, Opcode, ProtocolError};

/// A packet the client sends to the server.
pub trait ClientPacket: Sized + Send + 'static {
    /// The opcode this packet is registered under.
    const OPCODE: Opcode;

    /// Parses the body from `reader`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Truncated`] if the body is shorter than its
    /// layout requires.
    fn parse(
        reader: &mut FrameReader,
        ctx: &ClientContext,
    ) -> Result<Self, ProtocolError>;
}

/// A packet the server sends to a client.
///
/// `Send + Sync` so a packet can be built once and handed to a broadcast
/// that encodes it for many recipients.
pub trait ServerPacket: Send + Sync {
    fn opcode(&self) -> Opcode;

    /// Writes the body for one recipient.
    fn build(&self, buf: &mut BytesMut, ctx: &ClientContext);
}

/// Encodes one packet: opcode, then body. No terminator.
pub fn encode_packet(packet: &dyn ServerPacket, ctx: &ClientContext) -> Bytes {
    let mut buf = BytesMut::with_capacity(32);
    buf.put_u16(packet.opcode().0);
    packet.build(&mut buf, ctx);
    buf.freeze()
}

/// Writes `text` as a u8 length prefix, the encoded bytes, and a trailing
/// NUL. The prefix counts the NUL. Text too long for the prefix is cut.
pub fn put_pascal_string(buf: &mut BytesMut, text: &str, ctx: &ClientContext) {
    let encoded = ctx.encode_text(text);
    let len = encoded.len().min(usize::from(u8::MAX) - 1);
    buf.put_u8((len + 1) as u8);
    buf.put_slice(&encoded[..len]);
    buf.put_u8(0);
}

/// Concatenates several packets into one group.
///
/// Used when the client must see a batch of packets together, such as the
/// world replay sent to a session that just entered a stage.
#[derive(Debug)]
pub struct PacketGroupBuilder<'a> {
    buf: BytesMut,
    ctx: &'a ClientContext,
    count: usize,
}

impl<'a> PacketGroupBuilder<'a> {
    pub fn new(ctx: &'a ClientContext) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            ctx,
            count: 0,
        }
    }

    pub fn push(&mut self, packet: &dyn ServerPacket) -> &mut Self {
        self.buf.put_u16(packet.opcode().0);
        packet.build(&mut self.buf, self.ctx);
        self.count += 1;
        self
    }

    /// Number of packets pushed so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Appends the `END` terminator and returns the group bytes.
    ///
    /// The transport appends its own terminator on send as well. The
    /// explicit one marks the end of this batch for the client.
    pub fn finish(mut self) -> Bytes {
        self.buf.put_u16(Opcode::END.0);
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe(u32);

    impl ServerPacket for Probe {
        fn opcode(&self) -> Opcode {
            Opcode::PING
        }

        fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
            buf.put_u32(self.0);
        }
    }

    #[test]
    fn test_encode_packet_prefixes_opcode() {
        let bytes = encode_packet(&Probe(7), &ClientContext::default());
        assert_eq!(&bytes[..], &[0x00, 0x17, 0, 0, 0, 7]);
    }

    #[test]
    fn test_group_builder_finish_appends_end() {
        let ctx = ClientContext::default();
        let mut group = PacketGroupBuilder::new(&ctx);
        group.push(&Probe(1)).push(&Probe(2));
        assert_eq!(group.len(), 2);

        let bytes = group.finish();

        assert_eq!(bytes.len(), 6 + 6 + 2);
        assert_eq!(&bytes[bytes.len() - 2..], &[0x00, 0x10]);
    }

    #[test]
    fn test_put_pascal_string_counts_nul_in_prefix() {
        let mut buf = BytesMut::new();
        put_pascal_string(&mut buf, "hub", &ClientContext::default());
        assert_eq!(&buf[..], &[4, b'h', b'u', b'b', 0]);
    }

    #[test]
    fn test_put_pascal_string_cuts_overlong_text() {
        let mut buf = BytesMut::new();
        let long = "x".repeat(300);
        put_pascal_string(&mut buf, &long, &ClientContext::default());
        assert_eq!(buf[0], 255);
        assert_eq!(buf.len(), 256);
    }
}
