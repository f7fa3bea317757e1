//! A single stage: members, reservations, objects and binaries.
//!
//! A stage is shared by every session inside it, so all of its state sits
//! behind one `RwLock`. Each method takes the lock for as short a time as
//! it can: it mutates or snapshots what it needs, releases the lock, and
//! only then encodes and queues packets. Nothing here ever awaits on an
//! outbound queue while holding the lock.
//!
//! Membership and reservation are tracked separately:
//!
//! - **members** are sessions currently inside the stage. They receive
//!   broadcasts.
//! - **reservations** are characters that have claimed a slot (for
//!   example, a party readying up for a quest). Only reservations are
//!   capacity checked.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use stagehand_protocol::packets::{
    DeleteObject, DuplicateObject, InsertUser, NotifyUserBinary,
    UserBinaryKind,
};
use stagehand_protocol::{CharId, PacketGroupBuilder, ServerPacket};
use stagehand_session::Outbox;
use stagehand_transport::ConnectionId;
use tokio::sync::{Notify, RwLock};

use crate::{ObjectIdAllocator, StageError};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Key of an opaque stage binary: the two type bytes the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryKey {
    pub type0: u8,
    pub type1: u8,
}

impl BinaryKey {
    pub fn new(type0: u8, type1: u8) -> Self {
        Self { type0, type1 }
    }
}

/// A dynamic object placed in a stage by one of its members.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageObject {
    /// Wire ID (the allocator slot).
    pub id: u32,
    pub owner: CharId,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Result of a successful [`Stage::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// A new slot was taken.
    Reserved,
    /// The character already held a slot. Nothing changed.
    AlreadyReserved,
}

/// A point-in-time summary of a stage, used for enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInfo {
    pub id: String,
    pub reserved: usize,
    pub members: usize,
    pub max_players: u16,
    pub has_password: bool,
    pub departed: bool,
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A session currently inside the stage.
#[derive(Debug, Clone)]
struct Member {
    char_id: CharId,
    outbox: Outbox,
}

#[derive(Debug)]
struct StageInner {
    /// Keyed by connection so a character logged in twice can't collide.
    members: BTreeMap<ConnectionId, Member>,
    /// Character → ready flag.
    reserved: HashMap<CharId, bool>,
    objects: BTreeMap<u32, StageObject>,
    object_ids: ObjectIdAllocator,
    binaries: HashMap<BinaryKey, Bytes>,
    max_players: u16,
    password: Option<String>,
    departed: bool,
}

/// A named game-instance container.
///
/// Shared as `Arc<Stage>` between the registry and every session that
/// is a member of it or holds a reservation in it.
#[derive(Debug)]
pub struct Stage {
    id: String,
    inner: RwLock<StageInner>,
    /// Woken on every [`Stage::set_binary`].
    binary_set: Notify,
}

impl Stage {
    pub fn new(id: impl Into<String>, max_players: u16, object_pool_size: u8) -> Self {
        Self {
            id: id.into(),
            inner: RwLock::new(StageInner {
                members: BTreeMap::new(),
                reserved: HashMap::new(),
                objects: BTreeMap::new(),
                object_ids: ObjectIdAllocator::new(object_pool_size),
                binaries: HashMap::new(),
                max_players,
                password: None,
                departed: false,
            }),
            binary_set: Notify::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // -- Membership ---------------------------------------------------------

    /// Adds a session as a member.
    ///
    /// Existing members are told about the newcomer (`INSERT_USER` and
    /// the three `NOTIFY_USER_BINARY` channels). The newcomer gets one
    /// packet group replaying every other member the same way, followed
    /// by a `DUPLICATE_OBJECT` for each object it doesn't own.
    ///
    /// The caller is responsible for leaving the session's previous
    /// stage first.
    pub async fn join(
        &self,
        char_id: CharId,
        outbox: Outbox,
    ) -> Result<(), StageError> {
        let conn_id = outbox.conn_id();
        let (peers, objects) = {
            let mut inner = self.inner.write().await;
            let peers: Vec<Member> = inner
                .members
                .iter()
                .filter(|(id, _)| **id != conn_id)
                .map(|(_, m)| m.clone())
                .collect();
            let objects: Vec<StageObject> = inner
                .objects
                .values()
                .filter(|o| o.owner != char_id)
                .copied()
                .collect();
            inner.members.insert(
                conn_id,
                Member {
                    char_id,
                    outbox: outbox.clone(),
                },
            );
            (peers, objects)
        };

        tracing::debug!(
            stage_id = %self.id,
            %conn_id,
            %char_id,
            peers = peers.len(),
            "session joined stage"
        );

        for peer in &peers {
            for packet in presence_packets(char_id) {
                peer.outbox.try_send_packet(packet.as_ref());
            }
        }

        let ctx = *outbox.context();
        let mut group = PacketGroupBuilder::new(&ctx);
        for peer in &peers {
            for packet in presence_packets(peer.char_id) {
                group.push(packet.as_ref());
            }
        }
        for object in &objects {
            group.push(&DuplicateObject {
                obj_id: object.id,
                x: object.x,
                y: object.y,
                z: object.z,
                unk0: 0,
                owner_char_id: object.owner.0,
            });
        }
        outbox.send(group.finish()).await?;
        Ok(())
    }

    /// Removes a session from the stage.
    ///
    /// Also drops the character's reservation, deletes every object it
    /// owns (telling the remaining members) and frees the object slots.
    /// Returns the character that left, or `None` if the session was not
    /// a member.
    pub async fn leave(&self, conn_id: ConnectionId) -> Option<CharId> {
        let (char_id, removed, remaining) = {
            let mut inner = self.inner.write().await;
            let member = inner.members.remove(&conn_id)?;
            let char_id = member.char_id;
            inner.reserved.remove(&char_id);

            let owned: Vec<u32> = inner
                .objects
                .values()
                .filter(|o| o.owner == char_id)
                .map(|o| o.id)
                .collect();
            for id in &owned {
                inner.objects.remove(id);
            }
            inner.object_ids.recycle(char_id);

            let remaining: Vec<Outbox> =
                inner.members.values().map(|m| m.outbox.clone()).collect();
            (char_id, owned, remaining)
        };

        for obj_id in removed {
            let packet = DeleteObject { obj_id };
            for outbox in &remaining {
                outbox.try_send_packet(&packet);
            }
        }

        tracing::debug!(stage_id = %self.id, %conn_id, %char_id, "session left stage");
        Some(char_id)
    }

    pub async fn is_member(&self, conn_id: ConnectionId) -> bool {
        self.inner.read().await.members.contains_key(&conn_id)
    }

    pub async fn member_count(&self) -> usize {
        self.inner.read().await.members.len()
    }

    /// Character IDs of the current members.
    pub async fn member_chars(&self) -> Vec<CharId> {
        let inner = self.inner.read().await;
        inner.members.values().map(|m| m.char_id).collect()
    }

    // -- Reservations -------------------------------------------------------

    /// Claims a reservation slot for `char_id`.
    ///
    /// Re-reserving is idempotent. A password-protected stage requires
    /// `password` to match.
    ///
    /// # Errors
    /// [`StageError::PasswordMismatch`] or [`StageError::StageFull`].
    pub async fn reserve(
        &self,
        char_id: CharId,
        password: Option<&str>,
    ) -> Result<ReserveOutcome, StageError> {
        let mut inner = self.inner.write().await;
        if inner.reserved.contains_key(&char_id) {
            return Ok(ReserveOutcome::AlreadyReserved);
        }
        if let Some(expected) = &inner.password {
            if password != Some(expected.as_str()) {
                return Err(StageError::PasswordMismatch(self.id.clone()));
            }
        }
        if inner.reserved.len() >= usize::from(inner.max_players) {
            return Err(StageError::StageFull {
                stage_id: self.id.clone(),
                max_players: inner.max_players,
            });
        }
        inner.reserved.insert(char_id, false);
        Ok(ReserveOutcome::Reserved)
    }

    /// Drops a reservation. Membership is untouched.
    pub async fn unreserve(&self, char_id: CharId) -> bool {
        self.inner.write().await.reserved.remove(&char_id).is_some()
    }

    /// Updates the ready flag of an existing reservation.
    pub async fn set_ready(&self, char_id: CharId, ready: bool) -> bool {
        let mut inner = self.inner.write().await;
        match inner.reserved.get_mut(&char_id) {
            Some(flag) => {
                *flag = ready;
                true
            }
            None => false,
        }
    }

    pub async fn is_reserved(&self, char_id: CharId) -> bool {
        self.inner.read().await.reserved.contains_key(&char_id)
    }

    pub async fn reserved_count(&self) -> usize {
        self.inner.read().await.reserved.len()
    }

    /// Reserved characters, optionally filtered by ready flag, sorted by ID.
    pub async fn reserved_chars(&self, ready: Option<bool>) -> Vec<CharId> {
        let inner = self.inner.read().await;
        let mut chars: Vec<CharId> = inner
            .reserved
            .iter()
            .filter(|(_, r)| ready.is_none_or(|want| **r == want))
            .map(|(c, _)| *c)
            .collect();
        chars.sort_unstable_by_key(|c| c.0);
        chars
    }

    // -- Flags --------------------------------------------------------------

    /// Sets the stage password. Only a character with a reservation may
    /// do this.
    pub async fn set_password(
        &self,
        char_id: CharId,
        password: impl Into<String>,
    ) -> Result<(), StageError> {
        let mut inner = self.inner.write().await;
        if !inner.reserved.contains_key(&char_id) {
            return Err(StageError::NotReserved {
                stage_id: self.id.clone(),
                char_id,
            });
        }
        let password = password.into();
        inner.password = (!password.is_empty()).then_some(password);
        Ok(())
    }

    pub async fn max_players(&self) -> u16 {
        self.inner.read().await.max_players
    }

    pub async fn set_max_players(&self, max_players: u16) {
        self.inner.write().await.max_players = max_players;
    }

    /// Marks the quest as started. Departed stages are hidden from
    /// enumeration.
    pub async fn mark_departed(&self) {
        self.inner.write().await.departed = true;
    }

    pub async fn has_departed(&self) -> bool {
        self.inner.read().await.departed
    }

    pub async fn info(&self) -> StageInfo {
        let inner = self.inner.read().await;
        StageInfo {
            id: self.id.clone(),
            reserved: inner.reserved.len(),
            members: inner.members.len(),
            max_players: inner.max_players,
            has_password: inner.password.is_some(),
            departed: inner.departed,
        }
    }

    // -- Objects ------------------------------------------------------------

    /// Places a new object owned by `owner`.
    ///
    /// # Errors
    /// [`StageError::ObjectPoolExhausted`] when every slot is taken.
    pub async fn create_object(
        &self,
        owner: CharId,
        x: f32,
        y: f32,
        z: f32,
    ) -> Result<StageObject, StageError> {
        let mut inner = self.inner.write().await;
        let Some(id) = inner.object_ids.allocate(owner) else {
            tracing::warn!(stage_id = %self.id, %owner, "object pool exhausted");
            return Err(StageError::ObjectPoolExhausted(self.id.clone()));
        };
        let object = StageObject { id, owner, x, y, z };
        inner.objects.insert(id, object);
        Ok(object)
    }

    /// Deletes one object owned by `owner` and frees its slot.
    pub async fn delete_object(
        &self,
        owner: CharId,
        obj_id: u32,
    ) -> Result<StageObject, StageError> {
        let mut inner = self.inner.write().await;
        self.check_owner(&inner, owner, obj_id)?;
        inner.object_ids.free(obj_id);
        inner
            .objects
            .remove(&obj_id)
            .ok_or_else(|| self.object_not_found(obj_id))
    }

    /// Moves an object owned by `owner`.
    pub async fn position_object(
        &self,
        owner: CharId,
        obj_id: u32,
        x: f32,
        y: f32,
        z: f32,
    ) -> Result<(), StageError> {
        let mut inner = self.inner.write().await;
        self.check_owner(&inner, owner, obj_id)?;
        if let Some(object) = inner.objects.get_mut(&obj_id) {
            object.x = x;
            object.y = y;
            object.z = z;
        }
        Ok(())
    }

    pub async fn object(&self, obj_id: u32) -> Option<StageObject> {
        self.inner.read().await.objects.get(&obj_id).copied()
    }

    pub async fn object_count(&self) -> usize {
        self.inner.read().await.objects.len()
    }

    fn check_owner(
        &self,
        inner: &StageInner,
        owner: CharId,
        obj_id: u32,
    ) -> Result<(), StageError> {
        let object = inner
            .objects
            .get(&obj_id)
            .ok_or_else(|| self.object_not_found(obj_id))?;
        if object.owner != owner {
            return Err(StageError::ObjectNotOwned {
                obj_id,
                char_id: owner,
            });
        }
        Ok(())
    }

    fn object_not_found(&self, obj_id: u32) -> StageError {
        StageError::ObjectNotFound {
            stage_id: self.id.clone(),
            obj_id,
        }
    }

    // -- Binaries -----------------------------------------------------------

    /// Stores an opaque binary and wakes every waiter.
    pub async fn set_binary(&self, key: BinaryKey, data: Bytes) {
        self.inner.write().await.binaries.insert(key, data);
        self.binary_set.notify_waiters();
    }

    pub async fn get_binary(&self, key: BinaryKey) -> Option<Bytes> {
        self.inner.read().await.binaries.get(&key).cloned()
    }

    /// Returns the binary for `key`, waiting until some member sets it.
    ///
    /// Waits forever if nobody does. Callers that need a bound wrap this
    /// in `tokio::time::timeout`.
    pub async fn wait_binary(&self, key: BinaryKey) -> Bytes {
        loop {
            // Registered before the check, so a set in between still wakes us.
            let notified = self.binary_set.notified();
            if let Some(data) = self.get_binary(key).await {
                return data;
            }
            notified.await;
        }
    }

    // -- Broadcast ----------------------------------------------------------

    /// Queues `packet` to every member except `exclude`.
    ///
    /// Recipients are snapshotted under the lock. The packet is then
    /// built once per recipient (each has its own client context) and
    /// queued without waiting. Returns how many members it was queued to.
    pub async fn broadcast(
        &self,
        packet: &dyn ServerPacket,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let recipients: Vec<Outbox> = {
            let inner = self.inner.read().await;
            inner
                .members
                .iter()
                .filter(|(id, _)| Some(**id) != exclude)
                .map(|(_, m)| m.outbox.clone())
                .collect()
        };
        recipients
            .iter()
            .filter(|outbox| outbox.try_send_packet(packet))
            .count()
    }
}

/// The four packets announcing a character to a peer.
fn presence_packets(char_id: CharId) -> Vec<Box<dyn ServerPacket>> {
    let mut packets: Vec<Box<dyn ServerPacket>> =
        vec![Box::new(InsertUser { char_id: char_id.0 })];
    for kind in UserBinaryKind::ALL {
        packets.push(Box::new(NotifyUserBinary {
            char_id: char_id.0,
            kind,
        }));
    }
    packets
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use stagehand_protocol::ClientContext;
    use stagehand_session::Outbound;
    use tokio::sync::mpsc;

    use super::*;

    fn outbox(conn: u64) -> (Outbox, mpsc::Receiver<Outbound>) {
        Outbox::channel(ConnectionId::new(conn), ClientContext::default(), 32)
    }

    fn stage() -> Stage {
        Stage::new("sl1Ns200p0a0u0", 4, 127)
    }

    #[tokio::test]
    async fn test_reserve_past_capacity_returns_full() {
        let stage = Stage::new("quest", 2, 127);

        stage.reserve(CharId(1), None).await.unwrap();
        stage.reserve(CharId(2), None).await.unwrap();
        let result = stage.reserve(CharId(3), None).await;

        assert!(matches!(result, Err(StageError::StageFull { max_players: 2, .. })));
    }

    #[tokio::test]
    async fn test_reserve_twice_is_idempotent() {
        let stage = Stage::new("quest", 1, 127);

        assert_eq!(
            stage.reserve(CharId(1), None).await.unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            stage.reserve(CharId(1), None).await.unwrap(),
            ReserveOutcome::AlreadyReserved
        );
        assert_eq!(stage.reserved_count().await, 1);
    }

    #[tokio::test]
    async fn test_reserve_wrong_password_is_rejected() {
        let stage = stage();
        stage.reserve(CharId(1), None).await.unwrap();
        stage.set_password(CharId(1), "1234").await.unwrap();

        let wrong = stage.reserve(CharId(2), Some("0000")).await;
        let right = stage.reserve(CharId(3), Some("1234")).await;

        assert!(matches!(wrong, Err(StageError::PasswordMismatch(_))));
        assert_eq!(right.unwrap(), ReserveOutcome::Reserved);
    }

    #[tokio::test]
    async fn test_set_password_without_reservation_fails() {
        let stage = stage();

        let result = stage.set_password(CharId(9), "pw").await;

        assert!(matches!(result, Err(StageError::NotReserved { .. })));
        assert!(!stage.info().await.has_password);
    }

    #[tokio::test]
    async fn test_unreserve_keeps_membership() {
        let stage = stage();
        let (ob, _rx) = outbox(1);
        stage.reserve(CharId(1), None).await.unwrap();
        stage.join(CharId(1), ob).await.unwrap();

        assert!(stage.unreserve(CharId(1)).await);
        assert!(stage.is_member(ConnectionId::new(1)).await);
    }

    #[tokio::test]
    async fn test_reserved_chars_filters_by_ready() {
        let stage = stage();
        stage.reserve(CharId(2), None).await.unwrap();
        stage.reserve(CharId(1), None).await.unwrap();
        stage.set_ready(CharId(2), true).await;

        assert_eq!(stage.reserved_chars(None).await, vec![CharId(1), CharId(2)]);
        assert_eq!(stage.reserved_chars(Some(true)).await, vec![CharId(2)]);
        assert_eq!(stage.reserved_chars(Some(false)).await, vec![CharId(1)]);
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let stage = stage();
        let (a, mut a_rx) = outbox(1);
        let (b, mut b_rx) = outbox(2);
        stage.join(CharId(1), a).await.unwrap();
        stage.join(CharId(2), b).await.unwrap();
        while a_rx.try_recv().is_ok() {}
        while b_rx.try_recv().is_ok() {}

        let sent = stage
            .broadcast(&InsertUser { char_id: 7 }, Some(ConnectionId::new(1)))
            .await;

        assert_eq!(sent, 1);
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_deletes_owned_objects_and_notifies_peers() {
        let stage = stage();
        let (a, _a_rx) = outbox(1);
        let (b, mut b_rx) = outbox(2);
        stage.join(CharId(1), a).await.unwrap();
        stage.join(CharId(2), b).await.unwrap();
        let obj = stage.create_object(CharId(1), 0.0, 0.0, 0.0).await.unwrap();
        while b_rx.try_recv().is_ok() {}

        assert_eq!(stage.leave(ConnectionId::new(1)).await, Some(CharId(1)));

        assert_eq!(stage.object_count().await, 0);
        let Ok(Outbound::Group(group)) = b_rx.try_recv() else {
            panic!("expected a delete notice");
        };
        assert_eq!(&group[..2], &[0x00, 0x41]);
        assert_eq!(&group[2..], &obj.id.to_be_bytes());
    }

    #[tokio::test]
    async fn test_leave_non_member_returns_none() {
        assert_eq!(stage().leave(ConnectionId::new(5)).await, None);
    }

    #[tokio::test]
    async fn test_delete_object_not_owned_is_rejected() {
        let stage = stage();
        let obj = stage.create_object(CharId(1), 1.0, 2.0, 3.0).await.unwrap();

        let result = stage.delete_object(CharId(2), obj.id).await;

        assert!(matches!(result, Err(StageError::ObjectNotOwned { .. })));
        assert!(stage.object(obj.id).await.is_some());
    }

    #[tokio::test]
    async fn test_position_object_updates_coordinates() {
        let stage = stage();
        let obj = stage.create_object(CharId(1), 0.0, 0.0, 0.0).await.unwrap();

        stage
            .position_object(CharId(1), obj.id, 4.0, 5.0, 6.0)
            .await
            .unwrap();

        let moved = stage.object(obj.id).await.unwrap();
        assert_eq!((moved.x, moved.y, moved.z), (4.0, 5.0, 6.0));
    }

    #[tokio::test]
    async fn test_create_object_exhausted_pool_returns_error() {
        let stage = Stage::new("tiny", 4, 1);
        stage.create_object(CharId(1), 0.0, 0.0, 0.0).await.unwrap();

        let result = stage.create_object(CharId(1), 0.0, 0.0, 0.0).await;

        assert!(matches!(result, Err(StageError::ObjectPoolExhausted(_))));
    }

    #[tokio::test]
    async fn test_wait_binary_returns_value_set_later() {
        let stage = Arc::new(stage());
        let key = BinaryKey::new(1, 2);

        let waiter = tokio::spawn({
            let stage = Arc::clone(&stage);
            async move { stage.wait_binary(key).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        stage.set_binary(key, Bytes::from_static(b"meta")).await;

        let value = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_binary did not finish")
            .unwrap();
        assert_eq!(value, Bytes::from_static(b"meta"));
    }

    #[tokio::test]
    async fn test_wait_binary_unset_key_keeps_waiting() {
        let stage = stage();

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            stage.wait_binary(BinaryKey::new(3, 3)),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_info_reports_counts_and_flags() {
        let stage = stage();
        let (a, _rx) = outbox(1);
        stage.reserve(CharId(1), None).await.unwrap();
        stage.join(CharId(1), a).await.unwrap();
        stage.mark_departed().await;

        let info = stage.info().await;

        assert_eq!(info.reserved, 1);
        assert_eq!(info.members, 1);
        assert_eq!(info.max_players, 4);
        assert!(info.departed);
    }
}
