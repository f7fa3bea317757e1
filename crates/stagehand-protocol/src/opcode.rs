//! Numeric opcodes for the core packet subset.

use std::fmt;

/// The 16-bit tag that prefixes every logical packet.
///
/// A newtype rather than an enum: the full table runs into the hundreds,
/// and the dispatch loop must be able to carry (and log) opcodes it has no
/// name or handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub u16);

macro_rules! opcodes {
    ($($name:ident = $value:literal,)*) => {
        impl Opcode {
            $(pub const $name: Opcode = Opcode($value);)*

            /// Returns the symbolic name, or `None` for opcodes outside the
            /// core subset.
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    ADD_OBJECT = 0x0008,
    END = 0x0010,
    NOP = 0x0011,
    ACK = 0x0012,
    TERMINAL_LOG = 0x0013,
    LOGIN = 0x0014,
    LOGOUT = 0x0015,
    SET_STATUS = 0x0016,
    PING = 0x0017,
    CAST_BINARY = 0x0018,
    TIME = 0x001A,
    CASTED_BINARY = 0x001B,
    ISSUE_LOGKEY = 0x001D,
    ECHO = 0x001F,
    CREATE_STAGE = 0x0020,
    STAGE_DESTRUCT = 0x0021,
    ENTER_STAGE = 0x0022,
    BACK_STAGE = 0x0023,
    MOVE_STAGE = 0x0024,
    LEAVE_STAGE = 0x0025,
    LOCK_STAGE = 0x0026,
    UNLOCK_STAGE = 0x0027,
    RESERVE_STAGE = 0x0028,
    UNRESERVE_STAGE = 0x0029,
    SET_STAGE_PASS = 0x002A,
    WAIT_STAGE_BINARY = 0x002B,
    SET_STAGE_BINARY = 0x002C,
    GET_STAGE_BINARY = 0x002D,
    ENUMERATE_CLIENT = 0x002E,
    ENUMERATE_STAGE = 0x002F,
    CREATE_SEMAPHORE = 0x0035,
    CREATE_ACQUIRE_SEMAPHORE = 0x0036,
    DELETE_SEMAPHORE = 0x0037,
    ACQUIRE_SEMAPHORE = 0x0038,
    RELEASE_SEMAPHORE = 0x0039,
    CHECK_SEMAPHORE = 0x003C,
    CREATE_OBJECT = 0x0040,
    DELETE_OBJECT = 0x0041,
    POSITION_OBJECT = 0x0042,
    ROTATE_OBJECT = 0x0043,
    DUPLICATE_OBJECT = 0x0044,
    SET_OBJECT_BINARY = 0x0045,
    CLEANUP_OBJECT = 0x0049,
    INSERT_USER = 0x0050,
    DELETE_USER = 0x0051,
    SET_USER_BINARY = 0x0052,
    GET_USER_BINARY = 0x0053,
    NOTIFY_USER_BINARY = 0x0054,
}

impl Opcode {
    /// Whether this opcode closes a packet group.
    pub fn is_terminator(self) -> bool {
        self == Self::END
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}
