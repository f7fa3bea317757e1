//! Semaphore packets.

use crate::{ClientContext, ClientPacket, FrameReader, Opcode, ProtocolError};

/// `MSG_SYS_CREATE_ACQUIRE_SEMAPHORE`: look up or create a semaphore and
/// take a slot in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAcquireSemaphore {
    pub ack_handle: u32,
    pub player_count: u8,
    pub semaphore_id: String,
}

impl ClientPacket for CreateAcquireSemaphore {
    const OPCODE: Opcode = Opcode::CREATE_ACQUIRE_SEMAPHORE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let ack_handle = r.read_u32()?;
        r.skip(2)?;
        let player_count = r.read_u8()?;
        let semaphore_id = r.read_pascal_string()?;
        Ok(Self {
            ack_handle,
            player_count,
            semaphore_id,
        })
    }
}

/// `MSG_SYS_ACQUIRE_SEMAPHORE`: take a slot in an existing semaphore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireSemaphore {
    pub ack_handle: u32,
    pub semaphore_id: String,
}

impl ClientPacket for AcquireSemaphore {
    const OPCODE: Opcode = Opcode::ACQUIRE_SEMAPHORE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            ack_handle: r.read_u32()?,
            semaphore_id: r.read_pascal_string()?,
        })
    }
}

/// `MSG_SYS_RELEASE_SEMAPHORE`: give up the sender's held slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseSemaphore {
    pub ack_handle: u32,
}

impl ClientPacket for ReleaseSemaphore {
    const OPCODE: Opcode = Opcode::RELEASE_SEMAPHORE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            ack_handle: r.read_u32()?,
        })
    }
}

/// `MSG_SYS_DELETE_SEMAPHORE`: addressed by the numeric wire ID handed out
/// in the acquire ack, not by the string ID. No ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteSemaphore {
    pub wire_id: u32,
}

impl ClientPacket for DeleteSemaphore {
    const OPCODE: Opcode = Opcode::DELETE_SEMAPHORE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            wire_id: r.read_u32()?,
        })
    }
}

/// `MSG_SYS_CHECK_SEMAPHORE`: does a semaphore with this ID exist?
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSemaphore {
    pub ack_handle: u32,
    pub semaphore_id: String,
}

impl ClientPacket for CheckSemaphore {
    const OPCODE: Opcode = Opcode::CHECK_SEMAPHORE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            ack_handle: r.read_u32()?,
            semaphore_id: r.read_pascal_string()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;

    #[test]
    fn test_create_acquire_semaphore_parse_trims_nul() {
        let mut body = BytesMut::new();
        body.put_u32(0x10);
        body.put_u16(0);
        body.put_u8(4);
        body.put_u8(15);
        body.put_slice(b"hs_l0u3B51J9k3\0");
        let mut r = FrameReader::new(body.freeze());

        let pkt =
            CreateAcquireSemaphore::parse(&mut r, &ClientContext::default())
                .unwrap();

        assert_eq!(pkt.ack_handle, 0x10);
        assert_eq!(pkt.player_count, 4);
        assert_eq!(pkt.semaphore_id, "hs_l0u3B51J9k3");
    }
}
