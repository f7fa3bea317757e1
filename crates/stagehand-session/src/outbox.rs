//! The outbound queue and the send loop that drains it.
//!
//! Every session owns one bounded queue. Anything that wants to talk to the
//! client (the session's own handlers, a stage broadcast, a global
//! announcement) holds a cheap [`Outbox`] clone and pushes whole packet
//! groups into it. A dedicated task ([`run_send_loop`]) pops them and
//! writes one group per item.
//!
//! Two ways to push:
//!
//! - [`Outbox::send`] waits for room. Used for direct replies, which must
//!   arrive and must stay in order.
//! - [`Outbox::try_send`] drops the group when the queue is full. Used for
//!   broadcasts, so one slow client never stalls a whole stage.

use bytes::Bytes;
use stagehand_protocol::{ClientContext, ServerPacket, encode_packet};
use stagehand_transport::{ConnectionId, PacketWriter};
use tokio::sync::mpsc;

use crate::{PacketTrace, SessionError, hexdump};

/// One item in the outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A packet group, without the transport terminator.
    Group(Bytes),
    /// Ends the send loop once everything queued before it is written.
    Close,
}

/// Handle for queueing packets to one client.
///
/// Also carries that client's [`ClientContext`], so a broadcast can build
/// each packet in the form the recipient expects.
#[derive(Debug, Clone)]
pub struct Outbox {
    conn_id: ConnectionId,
    ctx: ClientContext,
    tx: mpsc::Sender<Outbound>,
}

impl Outbox {
    /// Creates a queue of the given capacity and returns both ends.
    pub fn channel(
        conn_id: ConnectionId,
        ctx: ClientContext,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { conn_id, ctx, tx }, rx)
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    /// Whether the send loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queues a group, waiting for room if the queue is full.
    ///
    /// # Errors
    /// [`SessionError::OutboxClosed`] if the send loop has stopped.
    pub async fn send(&self, group: Bytes) -> Result<(), SessionError> {
        self.tx
            .send(Outbound::Group(group))
            .await
            .map_err(|_| SessionError::OutboxClosed(self.conn_id))
    }

    /// Queues a group if there is room, otherwise drops it.
    ///
    /// Returns `true` if the group was queued.
    pub fn try_send(&self, group: Bytes) -> bool {
        match self.tx.try_send(Outbound::Group(group)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    conn_id = %self.conn_id,
                    "outbound queue full, dropping packet"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Encodes one packet for this client and queues it, waiting for room.
    pub async fn send_packet(
        &self,
        packet: &dyn ServerPacket,
    ) -> Result<(), SessionError> {
        self.send(encode_packet(packet, &self.ctx)).await
    }

    /// Encodes one packet for this client and queues it if there is room.
    pub fn try_send_packet(&self, packet: &dyn ServerPacket) -> bool {
        self.try_send(encode_packet(packet, &self.ctx))
    }

    /// Asks the send loop to stop after draining what is already queued.
    pub async fn close(&self) {
        // A closed queue means the loop is already gone.
        let _ = self.tx.send(Outbound::Close).await;
    }
}

/// Drains `rx` into `writer`, one packet group per item.
///
/// Ends on [`Outbound::Close`], when every [`Outbox`] is dropped, or on
/// the first write error.
pub async fn run_send_loop<W: PacketWriter>(
    conn_id: ConnectionId,
    mut rx: mpsc::Receiver<Outbound>,
    mut writer: W,
    trace: PacketTrace,
) {
    while let Some(item) = rx.recv().await {
        let group = match item {
            Outbound::Group(group) => group,
            Outbound::Close => break,
        };
        if trace.log_outbound {
            tracing::trace!(
                %conn_id,
                len = group.len(),
                data = %hexdump(&group, trace.max_hexdump_len),
                "outbound group"
            );
        }
        if let Err(e) = writer.send_packet_group(&group).await {
            tracing::debug!(%conn_id, error = %e, "send failed, stopping send loop");
            break;
        }
    }
    rx.close();
    tracing::debug!(%conn_id, "send loop stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use stagehand_protocol::packets::InsertUser;
    use stagehand_transport::TransportError;

    use super::*;

    /// Records every group it is asked to send.
    #[derive(Clone, Default)]
    struct RecordingWriter {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl PacketWriter for RecordingWriter {
        async fn send_packet_group(
            &mut self,
            data: &[u8],
        ) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(data.to_vec());
            Ok(())
        }
    }

    fn outbox(capacity: usize) -> (Outbox, mpsc::Receiver<Outbound>) {
        Outbox::channel(ConnectionId::new(1), ClientContext::default(), capacity)
    }

    #[tokio::test]
    async fn test_try_send_full_queue_drops_packet() {
        let (outbox, _rx) = outbox(1);

        assert!(outbox.try_send(Bytes::from_static(&[1])));
        assert!(!outbox.try_send(Bytes::from_static(&[2])));
    }

    #[tokio::test]
    async fn test_send_after_loop_stopped_returns_closed() {
        let (outbox, rx) = outbox(4);
        drop(rx);

        let result = outbox.send(Bytes::from_static(&[1])).await;

        assert!(matches!(result, Err(SessionError::OutboxClosed(_))));
    }

    #[tokio::test]
    async fn test_send_packet_encodes_opcode() {
        let (outbox, mut rx) = outbox(4);

        outbox
            .send_packet(&InsertUser { char_id: 5 })
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(Outbound::Group(Bytes::from_static(&[0x00, 0x50, 0, 0, 0, 5])))
        );
    }

    #[tokio::test]
    async fn test_send_loop_writes_in_order_until_close() {
        let (outbox, rx) = outbox(8);
        let writer = RecordingWriter::default();
        let sent = Arc::clone(&writer.sent);

        outbox.send(Bytes::from_static(&[1])).await.unwrap();
        outbox.send(Bytes::from_static(&[2])).await.unwrap();
        outbox.close().await;
        run_send_loop(outbox.conn_id(), rx, writer, PacketTrace::default())
            .await;

        assert_eq!(*sent.lock().unwrap(), vec![vec![1], vec![2]]);
        assert!(outbox.is_closed());
    }
}
