//! Dynamic stage object packets.

use bytes::{BufMut, BytesMut};

use crate::{
    ClientContext, ClientPacket, FrameReader, Opcode, ProtocolError,
    ServerPacket,
};

/// `MSG_SYS_CREATE_OBJECT`: answered with the new object's wire ID.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreateObject {
    pub ack_handle: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub unk0: u32,
}

impl ClientPacket for CreateObject {
    const OPCODE: Opcode = Opcode::CREATE_OBJECT;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            ack_handle: r.read_u32()?,
            x: r.read_f32()?,
            y: r.read_f32()?,
            z: r.read_f32()?,
            unk0: r.read_u32()?,
        })
    }
}

/// `MSG_SYS_DELETE_OBJECT`. Sent by a client to drop one of its own
/// objects, and by the server to tell peers an object is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteObject {
    pub obj_id: u32,
}

impl ClientPacket for DeleteObject {
    const OPCODE: Opcode = Opcode::DELETE_OBJECT;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            obj_id: r.read_u32()?,
        })
    }
}

impl ServerPacket for DeleteObject {
    fn opcode(&self) -> Opcode {
        Opcode::DELETE_OBJECT
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.obj_id);
    }
}

/// `MSG_SYS_POSITION_OBJECT`. Parsed from the owner, rebroadcast as-is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionObject {
    pub obj_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl ClientPacket for PositionObject {
    const OPCODE: Opcode = Opcode::POSITION_OBJECT;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            obj_id: r.read_u32()?,
            x: r.read_f32()?,
            y: r.read_f32()?,
            z: r.read_f32()?,
        })
    }
}

impl ServerPacket for PositionObject {
    fn opcode(&self) -> Opcode {
        Opcode::POSITION_OBJECT
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.obj_id);
        buf.put_f32(self.x);
        buf.put_f32(self.y);
        buf.put_f32(self.z);
    }
}

/// `MSG_SYS_DUPLICATE_OBJECT`: announces an existing object to a client
/// that just arrived, or a new object to everyone else.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateObject {
    pub obj_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub unk0: u32,
    pub owner_char_id: u32,
}

impl ServerPacket for DuplicateObject {
    fn opcode(&self) -> Opcode {
        Opcode::DUPLICATE_OBJECT
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.obj_id);
        buf.put_f32(self.x);
        buf.put_f32(self.y);
        buf.put_f32(self.z);
        buf.put_u32(self.unk0);
        buf.put_u32(self.owner_char_id);
    }
}

/// `MSG_SYS_CLEANUP_OBJECT`: the client should drop every object it knows
/// before the new stage's objects are replayed. Empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupObject;

impl ServerPacket for CleanupObject {
    fn opcode(&self) -> Opcode {
        Opcode::CLEANUP_OBJECT
    }

    fn build(&self, _buf: &mut BytesMut, _ctx: &ClientContext) {}
}
