//! Connection-level packets: login, logout, ping, log key.

use crate::{ClientContext, ClientPacket, FrameReader, Opcode, ProtocolError};

/// Length of the login token field. Fixed on the wire.
pub const LOGIN_TOKEN_LEN: usize = 17;

/// `MSG_SYS_LOGIN`: binds a character to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub ack_handle: u32,
    pub char_id: u32,
    pub token_number: u32,
    pub request_version: u16,
    /// The client sends the character ID twice. The second copy is kept
    /// so the handler can reject a login where they disagree.
    pub char_id_repeat: u32,
    pub token: String,
}

impl ClientPacket for Login {
    const OPCODE: Opcode = Opcode::LOGIN;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let ack_handle = r.read_u32()?;
        let char_id = r.read_u32()?;
        let token_number = r.read_u32()?;
        r.skip(2)?;
        let request_version = r.read_u16()?;
        let char_id_repeat = r.read_u32()?;
        r.skip(2)?;
        let _token_len = r.read_u16()?;
        let token = r.read_string(LOGIN_TOKEN_LEN)?;
        Ok(Self {
            ack_handle,
            char_id,
            token_number,
            request_version,
            char_id_repeat,
            token,
        })
    }
}

/// `MSG_SYS_LOGOUT`: the client is leaving. Handled by the dispatch loop
/// itself, which closes the session instead of calling a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Logout {
    pub logout_type: u8,
}

impl ClientPacket for Logout {
    const OPCODE: Opcode = Opcode::LOGOUT;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            logout_type: r.read_u8()?,
        })
    }
}

/// `MSG_SYS_PING`: keep-alive, answered with a simple ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub ack_handle: u32,
}

impl ClientPacket for Ping {
    const OPCODE: Opcode = Opcode::PING;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            ack_handle: r.read_u32()?,
        })
    }
}

/// `MSG_SYS_ISSUE_LOGKEY`: asks for the session's random log key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueLogkey {
    pub ack_handle: u32,
}

impl ClientPacket for IssueLogkey {
    const OPCODE: Opcode = Opcode::ISSUE_LOGKEY;

    fn parse(
        r: &mut FrameReader,
        _ctx: &ClientContext,
    ) -> Result<Self, ProtocolError> {
        let ack_handle = r.read_u32()?;
        r.skip(4)?;
        Ok(Self { ack_handle })
    }
}
