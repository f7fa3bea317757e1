//! Semaphore handlers.
//!
//! Acquire acks carry the semaphore's numeric wire ID, which the client
//! later uses to delete it.

use std::sync::Arc;

use stagehand_protocol::Ack;
use stagehand_protocol::packets::{
    AcquireSemaphore, CheckSemaphore, CreateAcquireSemaphore, DeleteSemaphore,
    ReleaseSemaphore,
};
use stagehand_stage::{AcquireOutcome, StageError};

use super::{ack_fail, ack_ok, logged_in};
use crate::{ChannelError, ServerState, Session};

/// `MSG_SYS_CREATE_ACQUIRE_SEMAPHORE`
///
/// A full semaphore still gets a success ack, but with wire ID 0.
pub async fn create_acquire_semaphore(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: CreateAcquireSemaphore,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, Some(pkt.ack_handle)).await?;
    let (semaphore, outcome) =
        state.semaphores().acquire(&pkt.semaphore_id, char_id).await;

    let wire_id = match outcome {
        AcquireOutcome::Acquired | AcquireOutcome::AlreadyHeld => {
            let wire_id = semaphore.wire_id();
            session.state().await.semaphore = Some(semaphore);
            wire_id
        }
        AcquireOutcome::Full => 0,
    };
    session
        .ack(Ack::simple_ok(pkt.ack_handle, wire_id.to_be_bytes()))
        .await?;
    Ok(())
}

/// `MSG_SYS_ACQUIRE_SEMAPHORE`: only existing semaphores, and only while
/// there is room.
pub async fn acquire_semaphore(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: AcquireSemaphore,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, Some(pkt.ack_handle)).await?;
    let acquired = state
        .semaphores()
        .acquire_existing(&pkt.semaphore_id, char_id)
        .await;

    match acquired {
        Some((semaphore, AcquireOutcome::Acquired | AcquireOutcome::AlreadyHeld)) => {
            let wire_id = semaphore.wire_id();
            session.state().await.semaphore = Some(semaphore);
            session
                .ack(Ack::simple_ok(pkt.ack_handle, wire_id.to_be_bytes()))
                .await?;
            Ok(())
        }
        Some((semaphore, AcquireOutcome::Full)) => {
            let err = StageError::SemaphoreFull {
                name: semaphore.name().to_string(),
                capacity: semaphore.capacity(),
            };
            ack_fail(&session, pkt.ack_handle, err).await
        }
        None => {
            let err = StageError::SemaphoreNotFound(pkt.semaphore_id);
            ack_fail(&session, pkt.ack_handle, err).await
        }
    }
}

/// `MSG_SYS_RELEASE_SEMAPHORE`: releases the session's last acquired
/// semaphore. Ordinary semaphores left empty are removed.
pub async fn release_semaphore(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: ReleaseSemaphore,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, Some(pkt.ack_handle)).await?;
    let held = session.state().await.semaphore.take();
    if let Some(semaphore) = held {
        state.semaphores().release(semaphore.name(), char_id).await;
        state.semaphores().destroy_empty().await;
    }
    ack_ok(&session, pkt.ack_handle).await
}

/// `MSG_SYS_DELETE_SEMAPHORE`: no ack.
pub async fn delete_semaphore(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: DeleteSemaphore,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, None).await?;
    if state.semaphores().delete_by_wire_id(pkt.wire_id, char_id).await {
        let mut st = session.state().await;
        if st
            .semaphore
            .as_ref()
            .is_some_and(|s| s.wire_id() == pkt.wire_id)
        {
            st.semaphore = None;
        }
    }
    Ok(())
}

/// `MSG_SYS_CHECK_SEMAPHORE`: acks 1 if the semaphore exists, else 0.
pub async fn check_semaphore(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: CheckSemaphore,
) -> Result<(), ChannelError> {
    let exists = state.semaphores().check(&pkt.semaphore_id).await;
    session
        .ack(Ack::simple_ok(pkt.ack_handle, u32::from(exists).to_be_bytes()))
        .await?;
    Ok(())
}
