//! Stage handlers: creation, navigation, reservations, binaries and
//! listings.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use stagehand_protocol::packets::{
    BackStage, CleanupObject, ClientListKind, CreateStage, DeleteUser,
    EnterStage, EnumerateClient, EnumerateStage, GetStageBinary, LeaveStage,
    LockStage, MoveStage, ReserveStage, SetStageBinary, SetStagePass,
    UnlockStage, UnreserveStage, WaitStageBinary,
};
use stagehand_protocol::{Ack, CharId, put_pascal_string};
use stagehand_session::SessionPhase;
use stagehand_stage::{BinaryKey, ReserveOutcome, StageError};

use super::{ack_fail, ack_ok, logged_in};
use crate::{ChannelError, ServerState, Session};

/// The reply to a wait on binary (1, 12), which the client expects before
/// any member has written it.
const QUEST_HEADER_BINARY: [u8; 8] = [0x04, 0, 0, 0, 0, 0, 0, 0];

/// `ready` byte values in `MSG_SYS_RESERVE_STAGE`.
const RESERVE_NOT_READY: u8 = 0x01;
const RESERVE_READY: u8 = 0x11;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// `MSG_SYS_CREATE_STAGE`: fails if the ID is taken.
pub async fn create_stage(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: CreateStage,
) -> Result<(), ChannelError> {
    logged_in(&session, Some(pkt.ack_handle)).await?;
    match state
        .stages()
        .create(&pkt.stage_id, u16::from(pkt.player_count))
        .await
    {
        Ok(_) => ack_ok(&session, pkt.ack_handle).await,
        Err(e) => ack_fail(&session, pkt.ack_handle, e).await,
    }
}

/// `MSG_SYS_LOCK_STAGE`: the party is departing. Hides the reservation
/// stage from listings.
pub async fn lock_stage(
    session: Arc<Session>,
    _state: Arc<ServerState>,
    pkt: LockStage,
) -> Result<(), ChannelError> {
    let reservation = session.state().await.reservation.clone();
    if let Some(stage) = reservation {
        stage.mark_departed().await;
        tracing::debug!(stage_id = %stage.id(), "stage locked");
    }
    ack_ok(&session, pkt.ack_handle).await
}

/// `MSG_SYS_UNLOCK_STAGE`: tears down the reservation stage, telling
/// every reserved character.
pub async fn unlock_stage(
    session: Arc<Session>,
    state: Arc<ServerState>,
    _pkt: UnlockStage,
) -> Result<(), ChannelError> {
    let Some(stage) = session.state().await.reservation.take() else {
        return Ok(());
    };
    let outboxes = state.outboxes_by_char().await;
    state
        .stages()
        .destroy(stage.id(), |char_id| outboxes.get(&char_id).cloned())
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// `MSG_SYS_ENTER_STAGE`: remembers the current stage for `BACK_STAGE`,
/// drops the session's reservation and transfers.
///
/// A reservation on the stage being entered stays in that stage's slot
/// table. One on any other stage is released.
pub async fn enter_stage(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: EnterStage,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, Some(pkt.ack_handle)).await?;
    let reservation = {
        let mut st = session.state().await;
        if let Some(current) = st.stage.clone() {
            st.move_stack.push(current.id());
        }
        st.reservation.take()
    };
    // A reservation elsewhere is abandoned, so give its slot back.
    if let Some(reserved) = reservation {
        if reserved.id() != pkt.stage_id {
            reserved.unreserve(char_id).await;
        }
    }
    transfer(&session, &state, char_id, &pkt.stage_id, pkt.ack_handle).await
}

/// `MSG_SYS_MOVE_STAGE`
pub async fn move_stage(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: MoveStage,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, Some(pkt.ack_handle)).await?;
    {
        let mut st = session.state().await;
        if let Some(current) = st.stage.clone() {
            st.move_stack.push(current.id());
        }
    }
    transfer(&session, &state, char_id, &pkt.stage_id, pkt.ack_handle).await
}

/// `MSG_SYS_BACK_STAGE`: returns to the last stage on the move stack.
pub async fn back_stage(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: BackStage,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, Some(pkt.ack_handle)).await?;
    let (popped, current) = {
        let mut st = session.state().await;
        (st.move_stack.pop(), st.stage.clone())
    };
    let target_id = match popped {
        Ok(id) => id,
        Err(e) => return ack_fail(&session, pkt.ack_handle, e).await,
    };

    if let Some(current) = current {
        current.unreserve(char_id).await;
    }
    if let Some(target) = state.stages().get(&target_id).await {
        target.unreserve(char_id).await;
    }
    transfer(&session, &state, char_id, &target_id, pkt.ack_handle).await
}

/// `MSG_SYS_LEAVE_STAGE`: leaves the current stage without entering
/// another. No ack.
pub async fn leave_stage(
    session: Arc<Session>,
    _state: Arc<ServerState>,
    _pkt: LeaveStage,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, None).await?;
    let previous = {
        let mut st = session.state().await;
        let previous = st.stage.take();
        if previous.is_some() {
            st.transition(SessionPhase::Authenticated)?;
        }
        previous
    };
    if let Some(stage) = previous {
        stage
            .broadcast(&DeleteUser { char_id: char_id.0 }, Some(session.id()))
            .await;
        stage.leave(session.id()).await;
    }
    Ok(())
}

/// Moves the session into `stage_id`.
///
/// A stage the registry doesn't know is re-created empty. The order the
/// client sees is: `CLEANUP_OBJECT`, the ack, then one group replaying
/// the new stage's members and objects.
async fn transfer(
    session: &Arc<Session>,
    state: &ServerState,
    char_id: CharId,
    stage_id: &str,
    ack_handle: u32,
) -> Result<(), ChannelError> {
    let conn_id = session.id();
    let stage = state.stages().get_or_recreate(stage_id).await;

    let previous = {
        let mut st = session.state().await;
        let previous = st.stage.replace(Arc::clone(&stage));
        st.transition(SessionPhase::InStage)?;
        previous
    };
    if let Some(previous) = previous {
        previous
            .broadcast(&DeleteUser { char_id: char_id.0 }, Some(conn_id))
            .await;
        previous.leave(conn_id).await;
    }

    session.send_packet(&CleanupObject).await?;
    ack_ok(session, ack_handle).await?;
    stage.join(char_id, session.outbox().clone()).await?;

    tracing::debug!(%conn_id, %char_id, stage_id, "stage transfer complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

/// `MSG_SYS_RESERVE_STAGE`
///
/// Re-reserving only updates the ready flag. A fresh reservation presents
/// the session's stage pass and must fit under the stage's capacity.
pub async fn reserve_stage(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: ReserveStage,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, Some(pkt.ack_handle)).await?;
    let Some(stage) = state.stages().get(&pkt.stage_id).await else {
        return ack_fail(
            &session,
            pkt.ack_handle,
            StageError::NotFound(pkt.stage_id),
        )
        .await;
    };

    let pass = session.state().await.stage_pass.clone();
    match stage.reserve(char_id, pass.as_deref()).await {
        Ok(ReserveOutcome::AlreadyReserved) => {
            match pkt.ready {
                RESERVE_NOT_READY => {
                    stage.set_ready(char_id, false).await;
                }
                RESERVE_READY => {
                    stage.set_ready(char_id, true).await;
                }
                _ => {}
            }
            ack_ok(&session, pkt.ack_handle).await
        }
        Ok(ReserveOutcome::Reserved) => {
            session.state().await.reservation = Some(stage);
            ack_ok(&session, pkt.ack_handle).await
        }
        Err(e) => ack_fail(&session, pkt.ack_handle, e).await,
    }
}

/// `MSG_SYS_UNRESERVE_STAGE`: no ack.
pub async fn unreserve_stage(
    session: Arc<Session>,
    _state: Arc<ServerState>,
    _pkt: UnreserveStage,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, None).await?;
    let reservation = session.state().await.reservation.take();
    if let Some(stage) = reservation {
        stage.unreserve(char_id).await;
    }
    Ok(())
}

/// `MSG_SYS_SET_STAGE_PASS`
///
/// A character holding a reservation sets the password of that stage.
/// Anyone else stores it as the pass to present on the next reservation.
pub async fn set_stage_pass(
    session: Arc<Session>,
    _state: Arc<ServerState>,
    pkt: SetStagePass,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, None).await?;
    let reservation = session.state().await.reservation.clone();
    if let Some(stage) = reservation {
        if stage.is_reserved(char_id).await {
            stage.set_password(char_id, pkt.password).await?;
            return Ok(());
        }
    }
    session.state().await.stage_pass = Some(pkt.password);
    Ok(())
}

// ---------------------------------------------------------------------------
// Binaries
// ---------------------------------------------------------------------------

/// `MSG_SYS_SET_STAGE_BINARY`: no ack.
pub async fn set_stage_binary(
    _session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: SetStageBinary,
) -> Result<(), ChannelError> {
    let Some(stage) = state.stages().get(&pkt.stage_id).await else {
        return Err(StageError::NotFound(pkt.stage_id).into());
    };
    stage
        .set_binary(BinaryKey::new(pkt.binary_type0, pkt.binary_type1), pkt.data)
        .await;
    Ok(())
}

/// `MSG_SYS_GET_STAGE_BINARY`: a key nobody has set reads as empty.
pub async fn get_stage_binary(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: GetStageBinary,
) -> Result<(), ChannelError> {
    let Some(stage) = state.stages().get(&pkt.stage_id).await else {
        session.ack(Ack::buffer_fail(pkt.ack_handle, Bytes::new())).await?;
        return Err(StageError::NotFound(pkt.stage_id).into());
    };
    let data = stage
        .get_binary(BinaryKey::new(pkt.binary_type0, pkt.binary_type1))
        .await
        .unwrap_or_default();
    session.ack(Ack::buffer_ok(pkt.ack_handle, data)).await?;
    Ok(())
}

/// `MSG_SYS_WAIT_STAGE_BINARY`
///
/// Holds this session's receive loop until another member sets the key.
/// Other sessions are unaffected.
pub async fn wait_stage_binary(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: WaitStageBinary,
) -> Result<(), ChannelError> {
    let Some(stage) = state.stages().get(&pkt.stage_id).await else {
        session.ack(Ack::buffer_fail(pkt.ack_handle, Bytes::new())).await?;
        return Err(StageError::NotFound(pkt.stage_id).into());
    };
    let key = BinaryKey::new(pkt.binary_type0, pkt.binary_type1);
    if key == BinaryKey::new(1, 12) {
        session
            .ack(Ack::buffer_ok(
                pkt.ack_handle,
                Bytes::from_static(&QUEST_HEADER_BINARY),
            ))
            .await?;
        return Ok(());
    }

    tracing::debug!(
        conn_id = %session.id(),
        stage_id = %stage.id(),
        type0 = key.type0,
        type1 = key.type1,
        "waiting for stage binary"
    );
    let data = stage.wait_binary(key).await;
    session.ack(Ack::buffer_ok(pkt.ack_handle, data)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// `MSG_SYS_ENUMERATE_CLIENT`: u16 count, then one u32 character ID each.
pub async fn enumerate_client(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: EnumerateClient,
) -> Result<(), ChannelError> {
    let Some(stage) = state.stages().get(&pkt.stage_id).await else {
        session.ack(Ack::buffer_fail(pkt.ack_handle, Bytes::new())).await?;
        return Err(StageError::NotFound(pkt.stage_id).into());
    };
    let chars = match pkt.kind {
        ClientListKind::Members => stage.member_chars().await,
        ClientListKind::NotReady => stage.reserved_chars(Some(false)).await,
        ClientListKind::Ready => stage.reserved_chars(Some(true)).await,
    };

    let mut buf = BytesMut::with_capacity(2 + chars.len() * 4);
    buf.put_u16(chars.len() as u16);
    for char_id in chars {
        buf.put_u32(char_id.0);
    }
    session.ack(Ack::buffer_ok(pkt.ack_handle, buf.freeze())).await?;
    Ok(())
}

/// `MSG_SYS_ENUMERATE_STAGE`: lists occupied stages whose ID contains
/// the requested prefix.
pub async fn enumerate_stage(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: EnumerateStage,
) -> Result<(), ChannelError> {
    let infos = state.stages().enumerate(&pkt.stage_prefix).await;
    let ctx = *session.context();

    let mut buf = BytesMut::new();
    buf.put_u16(infos.len() as u16);
    for info in &infos {
        buf.put_u16(info.reserved as u16);
        buf.put_u16(0);
        buf.put_u16(u16::from(info.members > 0));
        buf.put_u16(info.max_players);
        buf.put_u8(if info.has_password { 2 } else { 0 });
        put_pascal_string(&mut buf, &info.id, &ctx);
    }
    session.ack(Ack::buffer_ok(pkt.ack_handle, buf.freeze())).await?;
    Ok(())
}
