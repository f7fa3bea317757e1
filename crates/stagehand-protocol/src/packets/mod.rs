//! The core packet subset: session, stage, object, user, and semaphore
//! packets.
//!
//! Every struct here implements [`ClientPacket`](crate::ClientPacket),
//! [`ServerPacket`](crate::ServerPacket), or both (objects and positions
//! travel in both directions).

mod object;
mod semaphore;
mod stage;
mod system;
mod user;

pub use object::{
    CleanupObject, CreateObject, DeleteObject, DuplicateObject,
    PositionObject,
};
pub use semaphore::{
    AcquireSemaphore, CheckSemaphore, CreateAcquireSemaphore,
    DeleteSemaphore, ReleaseSemaphore,
};
pub use stage::{
    BackStage, ClientListKind, CreateStage, EnterStage, EnumerateClient,
    EnumerateStage, GetStageBinary, LeaveStage, LockStage, MoveStage,
    ReserveStage, SetStageBinary, SetStagePass, StageDestruct, UnlockStage,
    UnreserveStage, WaitStageBinary,
};
pub use system::{IssueLogkey, Login, Logout, Ping};
pub use user::{DeleteUser, InsertUser, NotifyUserBinary, UserBinaryKind};
