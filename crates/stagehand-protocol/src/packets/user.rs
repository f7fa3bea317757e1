//! Stage peer presence packets.

use bytes::{BufMut, BytesMut};

use crate::{ClientContext, Opcode, ServerPacket};

/// `MSG_SYS_INSERT_USER`: a character is now present in the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertUser {
    pub char_id: u32,
}

impl ServerPacket for InsertUser {
    fn opcode(&self) -> Opcode {
        Opcode::INSERT_USER
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.char_id);
    }
}

/// `MSG_SYS_DELETE_USER`: a character has left or disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteUser {
    pub char_id: u32,
}

impl ServerPacket for DeleteUser {
    fn opcode(&self) -> Opcode {
        Opcode::DELETE_USER
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.char_id);
    }
}

/// The three per-character binary channels a peer must refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UserBinaryKind {
    Identity = 1,
    Appearance = 2,
    Equipment = 3,
}

impl UserBinaryKind {
    pub const ALL: [UserBinaryKind; 3] =
        [Self::Identity, Self::Appearance, Self::Equipment];
}

/// `MSG_SYS_NOTIFY_USER_BINARY`: tells peers to re-fetch one of a
/// character's binary channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyUserBinary {
    pub char_id: u32,
    pub kind: UserBinaryKind,
}

impl ServerPacket for NotifyUserBinary {
    fn opcode(&self) -> Opcode {
        Opcode::NOTIFY_USER_BINARY
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.char_id);
        buf.put_u8(self.kind as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_packet;

    #[test]
    fn test_notify_user_binary_layout() {
        let pkt = NotifyUserBinary {
            char_id: 0x01020304,
            kind: UserBinaryKind::Equipment,
        };
        let bytes = encode_packet(&pkt, &ClientContext::default());
        assert_eq!(&bytes[..], &[0x00, 0x54, 1, 2, 3, 4, 3]);
    }

    #[test]
    fn test_user_binary_kind_all_is_ordered() {
        let kinds: Vec<u8> =
            UserBinaryKind::ALL.iter().map(|k| *k as u8).collect();
        assert_eq!(kinds, vec![1, 2, 3]);
    }
}
