//! Typed acknowledgements.
//!
//! Most requests carry a 32-bit *ack handle*. The server answers with one
//! `MSG_SYS_ACK` echoing that handle, so the client can match the reply to
//! its request. Denied operations are still answered, with a failure code;
//! the connection stays up.
//!
//! Body layout:
//!
//! ```text
//! u32  handle
//! u8   is_buffer (0/1)
//! u8   error_code (0 = ok, 1 = fail)
//! u16  length              buffer acks; 0xFFFF escapes to a following u32
//! [..] payload             buffer acks: `length` bytes, simple acks: 4 bytes
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::{ClientContext, Opcode, ServerPacket};

/// The four ack shapes a handler can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    SimpleOk,
    SimpleFail,
    BufferOk,
    BufferFail,
}

impl AckKind {
    pub fn is_buffer(self) -> bool {
        matches!(self, Self::BufferOk | Self::BufferFail)
    }

    pub fn error_code(self) -> u8 {
        match self {
            Self::SimpleOk | Self::BufferOk => 0,
            Self::SimpleFail | Self::BufferFail => 1,
        }
    }
}

/// A reply correlated to a request by its handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub handle: u32,
    pub kind: AckKind,
    pub data: Bytes,
}

impl Ack {
    pub fn simple_ok(handle: u32, data: [u8; 4]) -> Self {
        Self {
            handle,
            kind: AckKind::SimpleOk,
            data: Bytes::copy_from_slice(&data),
        }
    }

    pub fn simple_fail(handle: u32, data: [u8; 4]) -> Self {
        Self {
            handle,
            kind: AckKind::SimpleFail,
            data: Bytes::copy_from_slice(&data),
        }
    }

    pub fn buffer_ok(handle: u32, data: impl Into<Bytes>) -> Self {
        Self {
            handle,
            kind: AckKind::BufferOk,
            data: data.into(),
        }
    }

    pub fn buffer_fail(handle: u32, data: impl Into<Bytes>) -> Self {
        Self {
            handle,
            kind: AckKind::BufferFail,
            data: data.into(),
        }
    }
}

impl ServerPacket for Ack {
    fn opcode(&self) -> Opcode {
        Opcode::ACK
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.handle);
        buf.put_u8(u8::from(self.kind.is_buffer()));
        buf.put_u8(self.kind.error_code());

        if self.kind.is_buffer() {
            if self.data.len() < 0xFFFF {
                buf.put_u16(self.data.len() as u16);
            } else {
                buf.put_u16(0xFFFF);
                buf.put_u32(self.data.len() as u32);
            }
            buf.put_slice(&self.data);
        } else {
            buf.put_u16(0);
            // Simple acks always carry exactly four bytes.
            let mut simple = [0u8; 4];
            let n = self.data.len().min(4);
            simple[..n].copy_from_slice(&self.data[..n]);
            buf.put_slice(&simple);
        }
    }
}
