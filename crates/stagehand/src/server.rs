//! `ChannelServer` builder, shared state and connection loop.
//!
//! This is where the layers meet: transport → protocol → session → stage.
//!
//! ```text
//! accept loop ──spawn──→ connection task (one per client)
//!                          ├─ receive loop: read group → DispatchTable
//!                          └─ send loop (spawned): Outbox → CryptWriter
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use stagehand_protocol::packets::DeleteUser;
use stagehand_protocol::{CharId, ClientContext, ServerPacket};
use stagehand_session::{
    Authenticator, CharacterProfile, Outbox, SessionConfig, SessionError,
    SessionPhase, TrustingAuthenticator, hexdump, run_send_loop,
};
use stagehand_stage::{DrainedHook, SemaphoreRegistry, StageRegistry};
use stagehand_transport::{
    Cipher, ConnectionId, CryptConn, NullCipher, PacketReader, TcpTransport,
};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;

use crate::dispatch::GroupOutcome;
use crate::handlers::core_table;
use crate::{ChannelConfig, ChannelError, DispatchTable, Session};

// ---------------------------------------------------------------------------
// Authenticator erasure
// ---------------------------------------------------------------------------

/// Object-safe view of an [`Authenticator`], so the shared state doesn't
/// carry the authenticator's type.
trait DynAuthenticator: Send + Sync {
    fn authenticate<'a>(
        &'a self,
        char_id: CharId,
        token: &'a str,
    ) -> BoxFuture<'a, Result<CharacterProfile, SessionError>>;
}

impl<A: Authenticator> DynAuthenticator for A {
    fn authenticate<'a>(
        &'a self,
        char_id: CharId,
        token: &'a str,
    ) -> BoxFuture<'a, Result<CharacterProfile, SessionError>> {
        Authenticator::authenticate(self, char_id, token).boxed()
    }
}

// ---------------------------------------------------------------------------
// ServerState
// ---------------------------------------------------------------------------

/// Everything the connection tasks share.
///
/// Lock order: `sessions` or a registry first, then a stage or semaphore,
/// then a session. Never the reverse.
pub struct ServerState {
    config: ChannelConfig,
    session_config: SessionConfig,
    stages: StageRegistry,
    semaphores: SemaphoreRegistry,
    sessions: RwLock<HashMap<ConnectionId, Arc<Session>>>,
    auth: Box<dyn DynAuthenticator>,
    dispatch: DispatchTable,
}

impl ServerState {
    /// State with the core handlers, accepting every login.
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_parts(config, Box::new(TrustingAuthenticator), None)
    }

    fn with_parts(
        config: ChannelConfig,
        auth: Box<dyn DynAuthenticator>,
        on_drained: Option<DrainedHook>,
    ) -> Self {
        let semaphores = match on_drained {
            Some(hook) => {
                SemaphoreRegistry::with_drained_hook(config.semaphore.clone(), hook)
            }
            None => SemaphoreRegistry::new(config.semaphore.clone()),
        };
        Self {
            session_config: config.session_config(),
            stages: StageRegistry::new(config.stage.clone()),
            semaphores,
            sessions: RwLock::new(HashMap::new()),
            auth,
            dispatch: core_table(),
            config,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    pub fn semaphores(&self) -> &SemaphoreRegistry {
        &self.semaphores
    }

    pub fn dispatch(&self) -> &DispatchTable {
        &self.dispatch
    }

    /// Runs the configured authenticator.
    pub async fn authenticate(
        &self,
        char_id: CharId,
        token: &str,
    ) -> Result<CharacterProfile, SessionError> {
        self.auth.authenticate(char_id, token).await
    }

    pub async fn register_session(&self, session: Arc<Session>) {
        self.sessions.write().await.insert(session.id(), session);
    }

    pub async fn remove_session(&self, conn_id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(&conn_id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Finds the session a character is logged in on.
    pub async fn find_session_by_char_id(
        &self,
        char_id: CharId,
    ) -> Option<Arc<Session>> {
        for session in self.snapshot().await {
            if session.char_id().await == Some(char_id) {
                return Some(session);
            }
        }
        None
    }

    /// Sends `packet` to every session except `exclude`, dropping it for
    /// clients whose queue is full. Returns how many were queued.
    pub async fn broadcast(
        &self,
        packet: &dyn ServerPacket,
        exclude: Option<ConnectionId>,
    ) -> usize {
        self.snapshot()
            .await
            .iter()
            .filter(|s| Some(s.id()) != exclude)
            .filter(|s| s.try_send_packet(packet))
            .count()
    }

    /// The outbox of every logged-in character.
    pub async fn outboxes_by_char(&self) -> HashMap<CharId, Outbox> {
        let mut outboxes = HashMap::new();
        for session in self.snapshot().await {
            if let Some(char_id) = session.char_id().await {
                outboxes.insert(char_id, session.outbox().clone());
            }
        }
        outboxes
    }

    async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("bind_addr", &self.config.bind_addr)
            .field("stages", &self.stages)
            .field("semaphores", &self.semaphores)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a channel server.
///
/// # Example
///
/// ```rust,no_run
/// use stagehand::prelude::*;
///
/// # async fn run() -> Result<(), ChannelError> {
/// let server = ChannelServer::builder()
///     .bind("0.0.0.0:54001")
///     .on_semaphore_drained(|name| tracing::info!(semaphore = name, "raid reset"))
///     .start()
///     .await?;
/// tokio::signal::ctrl_c().await.ok();
/// server.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ChannelServerBuilder<A = TrustingAuthenticator, C = NullCipher> {
    config: ChannelConfig,
    authenticator: A,
    cipher: C,
    on_semaphore_drained: Option<DrainedHook>,
}

impl ChannelServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ChannelConfig::default(),
            authenticator: TrustingAuthenticator,
            cipher: NullCipher,
            on_semaphore_drained: None,
        }
    }
}

impl Default for ChannelServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Authenticator, C: Cipher> ChannelServerBuilder<A, C> {
    /// Replaces the whole configuration, including its bind address.
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind to.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    pub fn authenticator<A2: Authenticator>(
        self,
        authenticator: A2,
    ) -> ChannelServerBuilder<A2, C> {
        ChannelServerBuilder {
            config: self.config,
            authenticator,
            cipher: self.cipher,
            on_semaphore_drained: self.on_semaphore_drained,
        }
    }

    pub fn cipher<C2: Cipher>(self, cipher: C2) -> ChannelServerBuilder<A, C2> {
        ChannelServerBuilder {
            config: self.config,
            authenticator: self.authenticator,
            cipher,
            on_semaphore_drained: self.on_semaphore_drained,
        }
    }

    /// Called when the last holder leaves a well-known semaphore.
    pub fn on_semaphore_drained(
        mut self,
        hook: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_semaphore_drained = Some(Arc::new(hook));
        self
    }

    /// Binds the listener and spawns the accept loop.
    pub async fn start(self) -> Result<ChannelServer, ChannelError> {
        let transport =
            TcpTransport::bind(&self.config.bind_addr, self.cipher).await?;
        let local_addr = transport.local_addr()?;

        let state = Arc::new(ServerState::with_parts(
            self.config,
            Box::new(self.authenticator),
            self.on_semaphore_drained,
        ));
        let shutdown = Arc::new(Notify::new());
        let running = Arc::new(AtomicBool::new(true));

        let accept_task = tokio::spawn(accept_loop(
            transport,
            Arc::clone(&state),
            Arc::clone(&shutdown),
            Arc::clone(&running),
        ));
        tracing::info!(%local_addr, "channel server listening");

        Ok(ChannelServer {
            local_addr,
            state,
            shutdown,
            running,
            accept_task,
        })
    }
}

// ---------------------------------------------------------------------------
// ChannelServer
// ---------------------------------------------------------------------------

/// A running channel server.
pub struct ChannelServer {
    local_addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    accept_task: JoinHandle<()>,
}

impl ChannelServer {
    pub fn builder() -> ChannelServerBuilder {
        ChannelServerBuilder::new()
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Stops accepting connections and closes the listener.
    ///
    /// Connected sessions keep running until their clients disconnect.
    pub async fn shutdown(self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_one();
        if let Err(e) = self.accept_task.await {
            tracing::error!(error = %e, "accept loop ended abnormally");
        }
        tracing::info!(local_addr = %self.local_addr, "channel server stopped");
    }
}

async fn accept_loop<C: Cipher>(
    transport: TcpTransport<C>,
    state: Arc<ServerState>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            accepted = transport.accept() => match accepted {
                Ok(conn) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(handle_connection(conn, state));
                }
                Err(e) => {
                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                    tracing::error!(error = %e, "accept failed");
                }
            },
        }
    }
    // Dropping the transport closes the listener.
}

// ---------------------------------------------------------------------------
// Connection handling
// ---------------------------------------------------------------------------

/// Runs teardown from `Drop` if the connection task ends without reaching
/// it (a panic outside dispatch, or the runtime shutting down).
struct TeardownGuard {
    session: Arc<Session>,
    state: Arc<ServerState>,
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if self.session.is_torn_down() {
            return;
        }
        let session = Arc::clone(&self.session);
        let state = Arc::clone(&self.state);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { teardown(&session, &state).await });
        }
    }
}

/// Handles a single connection from accept to close.
async fn handle_connection<C: Cipher>(conn: CryptConn<C>, state: Arc<ServerState>) {
    let conn_id = conn.id();
    let peer_addr = conn.peer_addr();
    let (mut reader, writer) = conn.into_split();

    let session_config = state.session_config().clone();
    let ctx = ClientContext::new(state.config().text_encoding);
    let (outbox, rx) =
        Outbox::channel(conn_id, ctx, session_config.send_queue_capacity);
    let send_task =
        tokio::spawn(run_send_loop(conn_id, rx, writer, session_config.trace));

    let session = Arc::new(Session::new(peer_addr, outbox));
    state.register_session(Arc::clone(&session)).await;
    let _guard = TeardownGuard {
        session: Arc::clone(&session),
        state: Arc::clone(&state),
    };
    tracing::info!(%conn_id, %peer_addr, "connection accepted");

    let trace = session_config.trace;
    loop {
        let group = match reader.read_packet_group().await {
            Ok(Some(group)) => group,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "receive failed");
                break;
            }
        };
        if trace.log_inbound {
            tracing::trace!(
                %conn_id,
                len = group.len(),
                data = %hexdump(&group, trace.max_hexdump_len),
                "inbound group"
            );
        }
        if state.dispatch().dispatch_group(&session, &state, group).await
            == GroupOutcome::Logout
        {
            break;
        }
    }

    teardown(&session, &state).await;
    if let Err(e) = send_task.await {
        tracing::error!(%conn_id, error = %e, "send loop ended abnormally");
    }
}

/// Removes every trace of a session. Runs at most once per session.
///
/// Stage peers get a `DELETE_USER` and the session leaves its stage. The
/// character's reservations are dropped in every stage, it is released
/// from every semaphore and semaphores left empty are removed. Finally the
/// send loop is told to stop.
pub(crate) async fn teardown(session: &Arc<Session>, state: &ServerState) {
    if !session.begin_teardown() {
        return;
    }
    let conn_id = session.id();
    let (char_id, stage) = {
        let mut st = session.state().await;
        st.phase = SessionPhase::Disconnected;
        st.semaphore = None;
        st.reservation = None;
        (st.char_id(), st.stage.take())
    };

    if let Some(stage) = stage {
        if let Some(char_id) = char_id {
            stage
                .broadcast(&DeleteUser { char_id: char_id.0 }, Some(conn_id))
                .await;
        }
        stage.leave(conn_id).await;
    }
    if let Some(char_id) = char_id {
        state.stages().unreserve_everywhere(char_id).await;
        state.semaphores().remove_character_from_all(char_id).await;
        state.semaphores().destroy_empty().await;
    }

    state.remove_session(conn_id).await;
    session.outbox().close().await;
    tracing::info!(%conn_id, char_id = ?char_id, "session closed");
}
