//! Stage lifecycle, reservation, binary store, and enumeration packets.

use bytes::{Bytes, BytesMut};

use crate::{
    ClientContext, ClientPacket, FrameReader, Opcode, ProtocolError,
    ServerPacket,
};

/// `MSG_SYS_CREATE_STAGE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStage {
    pub ack_handle: u32,
    pub player_count: u8,
    pub stage_id: String,
}

impl ClientPacket for CreateStage {
    const OPCODE: Opcode = Opcode::CREATE_STAGE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let ack_handle = r.read_u32()?;
        r.skip(1)?;
        let player_count = r.read_u8()?;
        let stage_id = r.read_pascal_string()?;
        Ok(Self {
            ack_handle,
            player_count,
            stage_id,
        })
    }
}

/// `MSG_SYS_ENTER_STAGE`: enter a stage, pushing nothing on the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterStage {
    pub ack_handle: u32,
    pub stage_id: String,
}

impl ClientPacket for EnterStage {
    const OPCODE: Opcode = Opcode::ENTER_STAGE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let ack_handle = r.read_u32()?;
        r.skip(1)?;
        let stage_id = r.read_pascal_string()?;
        Ok(Self {
            ack_handle,
            stage_id,
        })
    }
}

/// `MSG_SYS_MOVE_STAGE`: enter a stage, pushing the current one on the
/// history so `BACK_STAGE` can return to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveStage {
    pub ack_handle: u32,
    pub stage_id: String,
}

impl ClientPacket for MoveStage {
    const OPCODE: Opcode = Opcode::MOVE_STAGE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let ack_handle = r.read_u32()?;
        r.skip(1)?;
        let stage_id = r.read_pascal_string()?;
        Ok(Self {
            ack_handle,
            stage_id,
        })
    }
}

/// `MSG_SYS_BACK_STAGE`: pop the history and return to that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackStage {
    pub ack_handle: u32,
}

impl ClientPacket for BackStage {
    const OPCODE: Opcode = Opcode::BACK_STAGE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            ack_handle: r.read_u32()?,
        })
    }
}

/// `MSG_SYS_LEAVE_STAGE`. Empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveStage;

impl ClientPacket for LeaveStage {
    const OPCODE: Opcode = Opcode::LEAVE_STAGE;

    fn parse(
        _r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

/// `MSG_SYS_LOCK_STAGE`: the party has departed on its quest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStage {
    pub ack_handle: u32,
    pub stage_id: String,
}

impl ClientPacket for LockStage {
    const OPCODE: Opcode = Opcode::LOCK_STAGE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let ack_handle = r.read_u32()?;
        r.skip(2)?;
        let stage_id = r.read_pascal_string()?;
        Ok(Self {
            ack_handle,
            stage_id,
        })
    }
}

/// `MSG_SYS_UNLOCK_STAGE`: tear down the stage the sender has reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockStage;

impl ClientPacket for UnlockStage {
    const OPCODE: Opcode = Opcode::UNLOCK_STAGE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        r.skip(2)?;
        Ok(Self)
    }
}

/// `MSG_SYS_RESERVE_STAGE`
///
/// When the sender already holds a reservation, the `ready` byte updates
/// its ready flag instead: `0x01` clears it, `0x11` sets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveStage {
    pub ack_handle: u32,
    pub ready: u8,
    pub stage_id: String,
}

impl ReserveStage {
    pub fn wants_ready(&self) -> bool {
        self.ready & 0x10 != 0
    }
}

impl ClientPacket for ReserveStage {
    const OPCODE: Opcode = Opcode::RESERVE_STAGE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let ack_handle = r.read_u32()?;
        let ready = r.read_u8()?;
        let stage_id = r.read_pascal_string()?;
        Ok(Self {
            ack_handle,
            ready,
            stage_id,
        })
    }
}

/// `MSG_SYS_UNRESERVE_STAGE`. Empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnreserveStage;

impl ClientPacket for UnreserveStage {
    const OPCODE: Opcode = Opcode::UNRESERVE_STAGE;

    fn parse(
        _r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

/// `MSG_SYS_SET_STAGE_PASS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStagePass {
    pub password: String,
}

impl ClientPacket for SetStagePass {
    const OPCODE: Opcode = Opcode::SET_STAGE_PASS;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        r.skip(1)?;
        Ok(Self {
            password: r.read_pascal_string()?,
        })
    }
}

/// `MSG_SYS_SET_STAGE_BINARY`: no ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStageBinary {
    pub binary_type0: u8,
    pub binary_type1: u8,
    pub stage_id: String,
    pub data: Bytes,
}

impl ClientPacket for SetStageBinary {
    const OPCODE: Opcode = Opcode::SET_STAGE_BINARY;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let binary_type0 = r.read_u8()?;
        let binary_type1 = r.read_u8()?;
        let id_len = usize::from(r.read_u8()?);
        let data_size = usize::from(r.read_u16()?);
        let stage_id = r.read_string(id_len)?;
        let data = r.read_bytes(data_size)?;
        Ok(Self {
            binary_type0,
            binary_type1,
            stage_id,
            data,
        })
    }
}

fn parse_binary_request(
    r: &mut FrameReader,
) -> Result<(u32, u8, u8, String), ProtocolError> {
    let ack_handle = r.read_u32()?;
    let binary_type0 = r.read_u8()?;
    let binary_type1 = r.read_u8()?;
    r.skip(4)?;
    let stage_id = r.read_pascal_string()?;
    Ok((ack_handle, binary_type0, binary_type1, stage_id))
}

/// `MSG_SYS_GET_STAGE_BINARY`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetStageBinary {
    pub ack_handle: u32,
    pub binary_type0: u8,
    pub binary_type1: u8,
    pub stage_id: String,
}

impl ClientPacket for GetStageBinary {
    const OPCODE: Opcode = Opcode::GET_STAGE_BINARY;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let (ack_handle, binary_type0, binary_type1, stage_id) =
            parse_binary_request(r)?;
        Ok(Self {
            ack_handle,
            binary_type0,
            binary_type1,
            stage_id,
        })
    }
}

/// `MSG_SYS_WAIT_STAGE_BINARY`: like get, but the reply is deferred until
/// the value exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitStageBinary {
    pub ack_handle: u32,
    pub binary_type0: u8,
    pub binary_type1: u8,
    pub stage_id: String,
}

impl ClientPacket for WaitStageBinary {
    const OPCODE: Opcode = Opcode::WAIT_STAGE_BINARY;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let (ack_handle, binary_type0, binary_type1, stage_id) =
            parse_binary_request(r)?;
        Ok(Self {
            ack_handle,
            binary_type0,
            binary_type1,
            stage_id,
        })
    }
}

/// Which characters `MSG_SYS_ENUMERATE_CLIENT` lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientListKind {
    /// Characters currently inside the stage.
    Members,
    /// Reserved characters that have not signalled ready.
    NotReady,
    /// Reserved characters that have signalled ready.
    Ready,
}

/// `MSG_SYS_ENUMERATE_CLIENT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerateClient {
    pub ack_handle: u32,
    pub kind: ClientListKind,
    pub stage_id: String,
}

impl ClientPacket for EnumerateClient {
    const OPCODE: Opcode = Opcode::ENUMERATE_CLIENT;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let ack_handle = r.read_u32()?;
        r.skip(1)?;
        let kind = match r.read_u8()? {
            0 => ClientListKind::Members,
            1 => ClientListKind::NotReady,
            2 => ClientListKind::Ready,
            other => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "unknown client list kind {other}"
                )));
            }
        };
        let stage_id = r.read_pascal_string()?;
        Ok(Self {
            ack_handle,
            kind,
            stage_id,
        })
    }
}

/// `MSG_SYS_ENUMERATE_STAGE`: list stages whose ID contains a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerateStage {
    pub ack_handle: u32,
    pub stage_prefix: String,
}

impl ClientPacket for EnumerateStage {
    const OPCODE: Opcode = Opcode::ENUMERATE_STAGE;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let ack_handle = r.read_u32()?;
        r.skip(1)?;
        let stage_prefix = r.read_pascal_string()?;
        Ok(Self {
            ack_handle,
            stage_prefix,
        })
    }
}

/// `MSG_SYS_STAGE_DESTRUCT`: tells a reserved character its stage is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDestruct;

impl ServerPacket for StageDestruct {
    fn opcode(&self) -> Opcode {
        Opcode::STAGE_DESTRUCT
    }

    fn build(&self, _buf: &mut BytesMut, _ctx: &ClientContext) {}
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;

    fn ctx() -> ClientContext {
        ClientContext::default()
    }

    #[test]
    fn test_set_stage_binary_parse_reads_id_then_data() {
        let mut body = BytesMut::new();
        body.put_u8(1);
        body.put_u8(2);
        body.put_u8(4);
        body.put_u16(3);
        body.put_slice(b"hub\0");
        body.put_slice(&[7, 8, 9]);
        let mut r = FrameReader::new(body.freeze());

        let pkt = SetStageBinary::parse(&mut r, &ctx()).unwrap();

        assert_eq!((pkt.binary_type0, pkt.binary_type1), (1, 2));
        assert_eq!(pkt.stage_id, "hub");
        assert_eq!(&pkt.data[..], &[7, 8, 9]);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_reserve_stage_wants_ready_flags() {
        let pkt = |ready| ReserveStage {
            ack_handle: 0,
            ready,
            stage_id: String::new(),
        };
        assert!(!pkt(0x01).wants_ready());
        assert!(pkt(0x11).wants_ready());
    }

    #[test]
    fn test_enumerate_client_unknown_kind_is_invalid() {
        let mut body = BytesMut::new();
        body.put_u32(1);
        body.put_u8(0);
        body.put_u8(9);
        body.put_u8(0);
        let mut r = FrameReader::new(body.freeze());

        assert!(matches!(
            EnumerateClient::parse(&mut r, &ctx()),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_enter_stage_parse_leaves_following_packet() {
        let mut body = BytesMut::new();
        body.put_u32(5);
        body.put_u8(0);
        body.put_u8(4);
        body.put_slice(b"hub\0");
        body.put_u16(0x0017);
        let mut r = FrameReader::new(body.freeze());

        let pkt = EnterStage::parse(&mut r, &ctx()).unwrap();

        assert_eq!(pkt.ack_handle, 5);
        assert_eq!(pkt.stage_id, "hub");
        assert_eq!(r.peek_remaining(), &[0x00, 0x17]);
    }
}
