//! Handlers for the core opcodes.
//!
//! Every handler has the same shape:
//!
//! ```rust,ignore
//! async fn handler(
//!     session: Arc<Session>,
//!     state: Arc<ServerState>,
//!     packet: SomeClientPacket,
//! ) -> Result<(), ChannelError>
//! ```
//!
//! A refused request is answered with a failure ack and reported as an
//! `Err`, which the dispatch loop logs. The connection stays up either
//! way.

pub mod object;
pub mod semaphore;
pub mod stage;
pub mod system;

use stagehand_protocol::{Ack, CharId};
use stagehand_session::SessionError;

use crate::{ChannelError, DispatchTable, Session};

/// Builds the table with every core handler registered.
pub fn core_table() -> DispatchTable {
    let mut table = DispatchTable::new();
    table
        // System
        .register(system::login)
        .register(system::ping)
        .register(system::issue_logkey)
        // Stage lifecycle and navigation
        .register(stage::create_stage)
        .register(stage::enter_stage)
        .register(stage::move_stage)
        .register(stage::back_stage)
        .register(stage::leave_stage)
        .register(stage::lock_stage)
        .register(stage::unlock_stage)
        // Reservations
        .register(stage::reserve_stage)
        .register(stage::unreserve_stage)
        .register(stage::set_stage_pass)
        // Stage binaries
        .register(stage::set_stage_binary)
        .register(stage::get_stage_binary)
        .register(stage::wait_stage_binary)
        // Listings
        .register(stage::enumerate_client)
        .register(stage::enumerate_stage)
        // Objects
        .register(object::create_object)
        .register(object::delete_object)
        .register(object::position_object)
        // Semaphores
        .register(semaphore::create_acquire_semaphore)
        .register(semaphore::acquire_semaphore)
        .register(semaphore::release_semaphore)
        .register(semaphore::delete_semaphore)
        .register(semaphore::check_semaphore);
    table
}

/// The session's character. Answers `ack_handle` with a failure if the
/// session has not logged in yet.
async fn logged_in(
    session: &Session,
    ack_handle: Option<u32>,
) -> Result<CharId, ChannelError> {
    match session.char_id().await {
        Some(char_id) => Ok(char_id),
        None => {
            if let Some(handle) = ack_handle {
                session.ack(Ack::simple_fail(handle, [0; 4])).await?;
            }
            Err(SessionError::NotLoggedIn.into())
        }
    }
}

async fn ack_ok(session: &Session, handle: u32) -> Result<(), ChannelError> {
    session.ack(Ack::simple_ok(handle, [0; 4])).await?;
    Ok(())
}

/// Sends a failure ack, then hands `err` back for the dispatch log.
async fn ack_fail(
    session: &Session,
    handle: u32,
    err: impl Into<ChannelError>,
) -> Result<(), ChannelError> {
    session.ack(Ack::simple_fail(handle, [0; 4])).await?;
    Err(err.into())
}
