//! Object handlers. Objects live in the sender's current stage and every
//! change is rebroadcast to the other members.

use std::sync::Arc;

use stagehand_protocol::Ack;
use stagehand_protocol::packets::{
    CreateObject, DeleteObject, DuplicateObject, PositionObject,
};
use stagehand_session::SessionError;

use super::{ack_fail, logged_in};
use crate::{ChannelError, ServerState, Session};

/// `MSG_SYS_CREATE_OBJECT`: the ack carries the new object ID.
pub async fn create_object(
    session: Arc<Session>,
    _state: Arc<ServerState>,
    pkt: CreateObject,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, Some(pkt.ack_handle)).await?;
    let Some(stage) = session.current_stage().await else {
        return ack_fail(&session, pkt.ack_handle, SessionError::NotInStage)
            .await;
    };

    let object = match stage.create_object(char_id, pkt.x, pkt.y, pkt.z).await {
        Ok(object) => object,
        Err(e) => return ack_fail(&session, pkt.ack_handle, e).await,
    };
    session
        .ack(Ack::simple_ok(pkt.ack_handle, object.id.to_be_bytes()))
        .await?;

    let announce = DuplicateObject {
        obj_id: object.id,
        x: object.x,
        y: object.y,
        z: object.z,
        unk0: 0,
        owner_char_id: char_id.0,
    };
    stage.broadcast(&announce, Some(session.id())).await;
    Ok(())
}

/// `MSG_SYS_DELETE_OBJECT`: no ack.
pub async fn delete_object(
    session: Arc<Session>,
    _state: Arc<ServerState>,
    pkt: DeleteObject,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, None).await?;
    let Some(stage) = session.current_stage().await else {
        return Err(SessionError::NotInStage.into());
    };
    stage.delete_object(char_id, pkt.obj_id).await?;
    stage.broadcast(&pkt, Some(session.id())).await;
    Ok(())
}

/// `MSG_SYS_POSITION_OBJECT`: no ack.
pub async fn position_object(
    session: Arc<Session>,
    _state: Arc<ServerState>,
    pkt: PositionObject,
) -> Result<(), ChannelError> {
    let char_id = logged_in(&session, None).await?;
    let Some(stage) = session.current_stage().await else {
        return Err(SessionError::NotInStage.into());
    };
    stage
        .position_object(char_id, pkt.obj_id, pkt.x, pkt.y, pkt.z)
        .await?;
    stage.broadcast(&pkt, Some(session.id())).await;
    Ok(())
}
