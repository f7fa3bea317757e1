//! Login, keep-alive and log key handlers.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use stagehand_protocol::packets::{IssueLogkey, Login, Ping};
use stagehand_protocol::{Ack, CharId};
use stagehand_session::{LogKey, SessionError, SessionPhase};

use super::{ack_fail, ack_ok};
use crate::{ChannelError, ServerState, Session};

/// `MSG_SYS_LOGIN`: binds a character to the session.
///
/// The ack carries the server's Unix time. A session can only log in
/// once, and both copies of the character ID must agree.
pub async fn login(
    session: Arc<Session>,
    state: Arc<ServerState>,
    pkt: Login,
) -> Result<(), ChannelError> {
    let conn_id = session.id();
    if let Some(existing) = session.char_id().await {
        return ack_fail(
            &session,
            pkt.ack_handle,
            SessionError::AlreadyLoggedIn(existing),
        )
        .await;
    }

    let claimed = CharId(pkt.char_id);
    if pkt.char_id_repeat != pkt.char_id {
        tracing::warn!(
            %conn_id,
            char_id = %claimed,
            repeated = pkt.char_id_repeat,
            "login character IDs disagree"
        );
        let err = SessionError::AuthFailed(format!(
            "character ID {} repeated as {}",
            pkt.char_id, pkt.char_id_repeat
        ));
        return ack_fail(&session, pkt.ack_handle, err).await;
    }

    let profile = match state.authenticate(claimed, &pkt.token).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(%conn_id, char_id = %claimed, error = %e, "login rejected");
            return ack_fail(&session, pkt.ack_handle, e).await;
        }
    };

    {
        let mut st = session.state().await;
        if let Err(e) = st.transition(SessionPhase::Authenticated) {
            drop(st);
            return ack_fail(&session, pkt.ack_handle, e).await;
        }
        st.profile = Some(profile.clone());
    }

    tracing::info!(
        %conn_id,
        char_id = %profile.char_id,
        name = %profile.name,
        "character logged in"
    );
    session
        .ack(Ack::simple_ok(pkt.ack_handle, unix_time().to_be_bytes()))
        .await?;
    Ok(())
}

/// `MSG_SYS_PING`
pub async fn ping(
    session: Arc<Session>,
    _state: Arc<ServerState>,
    pkt: Ping,
) -> Result<(), ChannelError> {
    ack_ok(&session, pkt.ack_handle).await
}

/// `MSG_SYS_ISSUE_LOGKEY`: returns the session's log key, generating it
/// on first use.
pub async fn issue_logkey(
    session: Arc<Session>,
    _state: Arc<ServerState>,
    pkt: IssueLogkey,
) -> Result<(), ChannelError> {
    let key = *session
        .state()
        .await
        .log_key
        .get_or_insert_with(LogKey::generate);
    session
        .ack(Ack::buffer_ok(
            pkt.ack_handle,
            Bytes::copy_from_slice(key.as_bytes()),
        ))
        .await?;
    Ok(())
}

fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_default()
}
