//! One connected client.
//!
//! A [`Session`] is shared (`Arc`) between the connection's receive task,
//! the server's session map and any handler that needs to reach it. The
//! outbound side is an [`Outbox`], so anyone holding the session can queue
//! packets without touching the socket.
//!
//! # Locking
//!
//! The mutable fields live behind the session's own `Mutex`. Stages and
//! registries are always locked *before* a session, never after, so a
//! handler reads what it needs, drops the guard, and only then calls into
//! a stage.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stagehand_protocol::{Ack, CharId, ClientContext, ServerPacket};
use stagehand_session::{
    CharacterProfile, LogKey, MoveStack, Outbox, SessionError, SessionPhase,
};
use stagehand_stage::{Semaphore, Stage};
use stagehand_transport::ConnectionId;
use tokio::sync::{Mutex, MutexGuard};

/// The per-connection state handlers read and change.
#[derive(Debug)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub profile: Option<CharacterProfile>,
    pub log_key: Option<LogKey>,
    /// The stage this session is a member of.
    pub stage: Option<Arc<Stage>>,
    /// The stage this session holds a reservation in, if any.
    pub reservation: Option<Arc<Stage>>,
    /// The last semaphore this session acquired.
    pub semaphore: Option<Arc<Semaphore>>,
    /// Password presented on the next reservation.
    pub stage_pass: Option<String>,
    pub move_stack: MoveStack,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Connected,
            profile: None,
            log_key: None,
            stage: None,
            reservation: None,
            semaphore: None,
            stage_pass: None,
            move_stack: MoveStack::new(),
        }
    }

    pub fn char_id(&self) -> Option<CharId> {
        self.profile.as_ref().map(|p| p.char_id)
    }

    /// The bound character, or [`SessionError::NotLoggedIn`].
    pub fn require_char_id(&self) -> Result<CharId, SessionError> {
        self.char_id().ok_or(SessionError::NotLoggedIn)
    }

    /// Moves the lifecycle to `to`.
    ///
    /// # Errors
    /// [`SessionError::InvalidTransition`] if the state machine forbids it.
    pub fn transition(&mut self, to: SessionPhase) -> Result<(), SessionError> {
        if !self.phase.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}

/// A connected client and everything bound to it.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    peer_addr: SocketAddr,
    outbox: Outbox,
    torn_down: AtomicBool,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(peer_addr: SocketAddr, outbox: Outbox) -> Self {
        Self {
            id: outbox.conn_id(),
            peer_addr,
            outbox,
            torn_down: AtomicBool::new(false),
            state: Mutex::new(SessionState::new()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn context(&self) -> &ClientContext {
        self.outbox.context()
    }

    /// Locks the mutable state.
    ///
    /// Don't hold the guard across a call into a stage or registry.
    pub async fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    pub async fn char_id(&self) -> Option<CharId> {
        self.state.lock().await.char_id()
    }

    pub async fn require_char_id(&self) -> Result<CharId, SessionError> {
        self.state.lock().await.require_char_id()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    pub async fn current_stage(&self) -> Option<Arc<Stage>> {
        self.state.lock().await.stage.clone()
    }

    /// Queues a direct reply, waiting for room in the outbound queue.
    pub async fn send_packet(
        &self,
        packet: &dyn ServerPacket,
    ) -> Result<(), SessionError> {
        self.outbox.send_packet(packet).await
    }

    /// Queues a packet if there is room, dropping it otherwise.
    pub fn try_send_packet(&self, packet: &dyn ServerPacket) -> bool {
        self.outbox.try_send_packet(packet)
    }

    pub async fn ack(&self, ack: Ack) -> Result<(), SessionError> {
        self.outbox.send_packet(&ack).await
    }

    /// Claims the one-time teardown. Returns `true` for the first caller
    /// only.
    pub(crate) fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use stagehand_session::Outbound;
    use tokio::sync::mpsc;

    use super::*;

    fn session() -> (Session, mpsc::Receiver<Outbound>) {
        let (outbox, rx) =
            Outbox::channel(ConnectionId::new(3), ClientContext::default(), 4);
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        (Session::new(addr, outbox), rx)
    }

    #[tokio::test]
    async fn test_new_session_is_connected_without_character() {
        let (session, _rx) = session();

        assert_eq!(session.id(), ConnectionId::new(3));
        assert_eq!(session.phase().await, SessionPhase::Connected);
        assert!(matches!(
            session.require_char_id().await,
            Err(SessionError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_transition_rejects_enter_before_login() {
        let (session, _rx) = session();
        let mut state = session.state().await;

        let result = state.transition(SessionPhase::InStage);

        assert!(matches!(
            result,
            Err(SessionError::InvalidTransition { .. })
        ));
        assert_eq!(state.phase, SessionPhase::Connected);
    }

    #[tokio::test]
    async fn test_begin_teardown_only_once() {
        let (session, _rx) = session();

        assert!(session.begin_teardown());
        assert!(!session.begin_teardown());
        assert!(session.is_torn_down());
    }

    #[tokio::test]
    async fn test_ack_queues_encoded_packet() {
        let (session, mut rx) = session();

        session.ack(Ack::simple_ok(1, [0; 4])).await.unwrap();

        let Outbound::Group(group) = rx.try_recv().unwrap() else {
            panic!("expected a packet group");
        };
        assert_eq!(&group[..2], &[0x00, 0x12]);
    }
}
