//! Opcode dispatch.
//!
//! A [`DispatchTable`] maps each opcode to a parser and a handler. The
//! receive loop hands it one packet group at a time and it walks the group
//! packet by packet:
//!
//! ```text
//! [op][body][op][body]...[END]
//!   │    └── ClientPacket::parse consumes exactly this much
//!   └── looked up in the table
//! ```
//!
//! Handlers run inline on the session's receive task, so packets from one
//! client are handled strictly in order while different clients run
//! concurrently.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use stagehand_protocol::packets::Logout;
use stagehand_protocol::{
    ClientContext, ClientPacket, FrameReader, Opcode, ProtocolError,
};

use crate::{ChannelError, ServerState, Session};

/// What the receive loop should do after a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    Continue,
    /// The client sent `MSG_SYS_LOGOUT`. The session should close.
    Logout,
}

type HandlerFuture = BoxFuture<'static, Result<(), ChannelError>>;

/// Parses a body and starts its handler.
///
/// Parsing happens before the future is created, so a truncated body is
/// reported without running any handler code.
type ErasedHandler = Box<
    dyn Fn(
            Arc<Session>,
            Arc<ServerState>,
            &mut FrameReader,
            &ClientContext,
        ) -> Result<HandlerFuture, ProtocolError>
        + Send
        + Sync,
>;

/// Opcode → handler table, filled once at startup.
#[derive(Default)]
pub struct DispatchTable {
    handlers: HashMap<Opcode, ErasedHandler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for packets of type `P`.
    ///
    /// A second registration for the same opcode replaces the first.
    ///
    /// ```rust,ignore
    /// table.register(|session, state, ping: Ping| async move {
    ///     session.ack(Ack::simple_ok(ping.ack_handle, [0; 4])).await?;
    ///     Ok(())
    /// });
    /// ```
    pub fn register<P, F, Fut>(&mut self, handler: F) -> &mut Self
    where
        P: ClientPacket,
        F: Fn(Arc<Session>, Arc<ServerState>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ChannelError>> + Send + 'static,
    {
        let erased: ErasedHandler = Box::new(
            move |session: Arc<Session>,
                  state: Arc<ServerState>,
                  reader: &mut FrameReader,
                  ctx: &ClientContext|
                  -> Result<HandlerFuture, ProtocolError> {
                let packet = P::parse(reader, ctx)?;
                Ok(handler(session, state, packet).boxed())
            },
        );
        self.handlers.insert(P::OPCODE, erased);
        self
    }

    pub fn contains(&self, opcode: Opcode) -> bool {
        self.handlers.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Processes one packet group, catching handler panics.
    ///
    /// A panic abandons the rest of the group but leaves the connection
    /// up.
    pub async fn dispatch_group(
        &self,
        session: &Arc<Session>,
        state: &Arc<ServerState>,
        group: Bytes,
    ) -> GroupOutcome {
        match AssertUnwindSafe(self.process_group(session, state, group))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(
                    conn_id = %session.id(),
                    "handler panicked, abandoning packet group"
                );
                GroupOutcome::Continue
            }
        }
    }

    /// Walks a group and runs the handler for each packet in turn.
    ///
    /// - `END` stops the walk, `NOP` is skipped.
    /// - `LOGOUT` stops the walk and returns [`GroupOutcome::Logout`].
    /// - An unknown opcode or a body that fails to parse abandons the
    ///   rest of the group, because the next opcode's position is unknown.
    /// - A handler error is logged and the walk continues.
    pub async fn process_group(
        &self,
        session: &Arc<Session>,
        state: &Arc<ServerState>,
        group: Bytes,
    ) -> GroupOutcome {
        let conn_id = session.id();
        let ctx = *session.context();
        let mut reader = FrameReader::new(group);

        while reader.remaining() >= 2 {
            let opcode = match reader.read_u16() {
                Ok(raw) => Opcode(raw),
                Err(_) => break,
            };
            if opcode.is_terminator() {
                break;
            }
            if opcode == Opcode::NOP {
                continue;
            }
            if opcode == Opcode::LOGOUT {
                let logout_type = Logout::parse(&mut reader, &ctx)
                    .map(|l| l.logout_type)
                    .unwrap_or_default();
                tracing::debug!(%conn_id, logout_type, "client logged out");
                return GroupOutcome::Logout;
            }

            let Some(handler) = self.handlers.get(&opcode) else {
                tracing::warn!(
                    %conn_id,
                    %opcode,
                    remaining = reader.remaining(),
                    "no handler for opcode, abandoning rest of group"
                );
                return GroupOutcome::Continue;
            };

            let future = match handler(
                Arc::clone(session),
                Arc::clone(state),
                &mut reader,
                &ctx,
            ) {
                Ok(future) => future,
                Err(e) => {
                    tracing::warn!(
                        %conn_id,
                        %opcode,
                        error = %e,
                        "failed to parse packet, abandoning rest of group"
                    );
                    return GroupOutcome::Continue;
                }
            };

            tracing::debug!(%conn_id, %opcode, "dispatching packet");
            if let Err(e) = future.await {
                tracing::debug!(%conn_id, %opcode, error = %e, "handler failed");
            }
        }
        GroupOutcome::Continue
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut opcodes: Vec<&Opcode> = self.handlers.keys().collect();
        opcodes.sort();
        f.debug_struct("DispatchTable")
            .field("opcodes", &opcodes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::{BufMut, BytesMut};
    use stagehand_protocol::packets::Ping;
    use stagehand_session::{Outbound, Outbox};
    use stagehand_transport::ConnectionId;
    use tokio::sync::mpsc;

    use super::*;
    use crate::ChannelConfig;

    type Seen = Arc<Mutex<Vec<u32>>>;

    fn recording_table(seen: &Seen) -> DispatchTable {
        let mut table = DispatchTable::new();
        let seen = Arc::clone(seen);
        table.register(move |_session, _state, ping: Ping| {
            let seen = Arc::clone(&seen);
            async move {
                if ping.ack_handle == 0xDEAD {
                    panic!("boom");
                }
                if ping.ack_handle == 0xBAD {
                    return Err(ChannelError::from(ProtocolError::InvalidMessage(
                        "bad".into(),
                    )));
                }
                seen.lock().unwrap().push(ping.ack_handle);
                Ok::<(), ChannelError>(())
            }
        });
        table
    }

    fn fixture() -> (Arc<Session>, Arc<ServerState>, mpsc::Receiver<Outbound>) {
        let (outbox, rx) =
            Outbox::channel(ConnectionId::new(1), ClientContext::default(), 8);
        let session = Arc::new(Session::new(
            "127.0.0.1:1".parse().unwrap(),
            outbox,
        ));
        let state = Arc::new(ServerState::new(ChannelConfig::default()));
        (session, state, rx)
    }

    fn ping(buf: &mut BytesMut, handle: u32) {
        buf.put_u16(Opcode::PING.0);
        buf.put_u32(handle);
    }

    #[tokio::test]
    async fn test_process_group_runs_packets_in_order() {
        let seen = Seen::default();
        let table = recording_table(&seen);
        let (session, state, _rx) = fixture();
        let mut group = BytesMut::new();
        ping(&mut group, 1);
        group.put_u16(Opcode::NOP.0);
        ping(&mut group, 2);
        group.put_u16(Opcode::END.0);
        ping(&mut group, 3);

        let outcome =
            table.process_group(&session, &state, group.freeze()).await;

        assert_eq!(outcome, GroupOutcome::Continue);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_process_group_unknown_opcode_abandons_rest() {
        let seen = Seen::default();
        let table = recording_table(&seen);
        let (session, state, _rx) = fixture();
        let mut group = BytesMut::new();
        ping(&mut group, 1);
        group.put_u16(0x0FFF);
        ping(&mut group, 2);

        table.process_group(&session, &state, group.freeze()).await;

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_process_group_truncated_body_abandons_rest() {
        let seen = Seen::default();
        let table = recording_table(&seen);
        let (session, state, _rx) = fixture();
        let mut group = BytesMut::new();
        group.put_u16(Opcode::PING.0);
        group.put_u16(0x0001);

        let outcome =
            table.process_group(&session, &state, group.freeze()).await;

        assert_eq!(outcome, GroupOutcome::Continue);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_process_group_handler_error_continues() {
        let seen = Seen::default();
        let table = recording_table(&seen);
        let (session, state, _rx) = fixture();
        let mut group = BytesMut::new();
        ping(&mut group, 0xBAD);
        ping(&mut group, 7);

        table.process_group(&session, &state, group.freeze()).await;

        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_process_group_logout_stops() {
        let seen = Seen::default();
        let table = recording_table(&seen);
        let (session, state, _rx) = fixture();
        let mut group = BytesMut::new();
        group.put_u16(Opcode::LOGOUT.0);
        group.put_u8(1);
        ping(&mut group, 1);

        let outcome =
            table.process_group(&session, &state, group.freeze()).await;

        assert_eq!(outcome, GroupOutcome::Logout);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_group_panic_is_contained() {
        let seen = Seen::default();
        let table = recording_table(&seen);
        let (session, state, _rx) = fixture();
        let mut group = BytesMut::new();
        ping(&mut group, 0xDEAD);
        ping(&mut group, 2);

        let outcome =
            table.dispatch_group(&session, &state, group.freeze()).await;
        assert_eq!(outcome, GroupOutcome::Continue);

        // The next group is processed normally.
        let mut next = BytesMut::new();
        ping(&mut next, 3);
        table.dispatch_group(&session, &state, next.freeze()).await;

        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn test_register_replaces_existing_handler() {
        let mut table = DispatchTable::new();
        table.register(|_, _, _: Ping| async { Ok::<(), ChannelError>(()) });
        table.register(|_, _, _: Ping| async { Ok::<(), ChannelError>(()) });

        assert_eq!(table.len(), 1);
        assert!(table.contains(Opcode::PING));
    }
}
