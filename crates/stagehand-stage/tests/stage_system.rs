//! End-to-end checks of stage, allocator and semaphore behavior, driven
//! the way the channel server drives them.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use stagehand_protocol::{CharId, ClientContext, FrameReader, Opcode};
use stagehand_session::{Outbound, Outbox};
use stagehand_stage::{
    AcquireOutcome, BinaryKey, ReserveOutcome, SemaphoreConfig,
    SemaphoreRegistry, Stage, StageConfig, StageError, StageRegistry,
};
use stagehand_transport::ConnectionId;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn outbox(conn: u64) -> (Outbox, mpsc::Receiver<Outbound>) {
    Outbox::channel(ConnectionId::new(conn), ClientContext::default(), 64)
}

fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Bytes> {
    let mut groups = Vec::new();
    while let Ok(Outbound::Group(group)) = rx.try_recv() {
        groups.push(group);
    }
    groups
}

/// Splits a server-built group into its opcodes. Only knows the bodies
/// of the packets a join replay can contain.
fn opcodes(group: Bytes) -> Vec<Opcode> {
    let mut reader = FrameReader::new(group);
    let mut ops = Vec::new();
    while reader.remaining() >= 2 {
        let op = Opcode(reader.read_u16().unwrap());
        ops.push(op);
        let body = match op {
            Opcode::INSERT_USER | Opcode::DELETE_USER | Opcode::DELETE_OBJECT => 4,
            Opcode::NOTIFY_USER_BINARY => 5,
            Opcode::DUPLICATE_OBJECT => 24,
            Opcode::END => break,
            other => panic!("unexpected opcode {other}"),
        };
        reader.skip(body).unwrap();
    }
    ops
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_reservation_capacity_and_rejoin() {
    let registry = StageRegistry::new(StageConfig {
        preset_stages: vec!["hub".to_string()],
        ..StageConfig::default()
    });
    let hub = registry.get("hub").await.unwrap();

    for id in 1..=4 {
        assert_eq!(
            hub.reserve(CharId(id), None).await.unwrap(),
            ReserveOutcome::Reserved
        );
    }
    assert!(matches!(
        hub.reserve(CharId(5), None).await,
        Err(StageError::StageFull { .. })
    ));

    let (a, _rx) = outbox(1);
    hub.join(CharId(1), a).await.unwrap();
    hub.leave(ConnectionId::new(1)).await;

    assert_eq!(
        hub.reserve(CharId(1), None).await.unwrap(),
        ReserveOutcome::Reserved
    );
}

#[tokio::test]
async fn test_reservation_without_membership_is_allowed() {
    let stage = Stage::new("quest", 4, 127);

    stage.reserve(CharId(1), None).await.unwrap();

    assert!(stage.is_reserved(CharId(1)).await);
    assert_eq!(stage.member_count().await, 0);
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_object_slots_recycle_after_leave() {
    let hub = Stage::new("hub", 4, 127);
    let (a, _a_rx) = outbox(1);
    hub.join(CharId(1), a).await.unwrap();

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(hub.create_object(CharId(1), 0.0, 0.0, 0.0).await.unwrap().id);
    }
    assert_eq!(ids, vec![127, 126, 125]);

    hub.leave(ConnectionId::new(1)).await;
    assert_eq!(hub.object_count().await, 0);

    let recycled = hub.create_object(CharId(2), 0.0, 0.0, 0.0).await.unwrap();
    assert_eq!(recycled.id, 127);
    assert_eq!(recycled.id & 0xFFFF_FF00, 0);
}

#[tokio::test]
async fn test_concurrent_allocations_are_unique() {
    let stage = Arc::new(Stage::new("hub", 4, 127));

    let mut tasks = Vec::new();
    for owner in 0..100u32 {
        let stage = Arc::clone(&stage);
        tasks.push(tokio::spawn(async move {
            stage.create_object(CharId(owner), 0.0, 0.0, 0.0).await.unwrap().id
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        assert!(seen.insert(task.await.unwrap()));
    }
    assert_eq!(seen.len(), 100);
}

// ---------------------------------------------------------------------------
// Join replay and broadcast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_join_replays_peers_and_objects() {
    let hub = Stage::new("hub", 4, 127);
    let (a, mut a_rx) = outbox(1);
    let (b, mut b_rx) = outbox(2);
    hub.join(CharId(1), a).await.unwrap();
    hub.join(CharId(2), b).await.unwrap();
    hub.create_object(CharId(1), 1.0, 2.0, 3.0).await.unwrap();
    hub.create_object(CharId(2), 4.0, 5.0, 6.0).await.unwrap();
    hub.create_object(CharId(2), 7.0, 8.0, 9.0).await.unwrap();
    drain(&mut a_rx);
    drain(&mut b_rx);

    let (c, mut c_rx) = outbox(3);
    hub.join(CharId(3), c).await.unwrap();

    let groups = drain(&mut c_rx);
    assert_eq!(groups.len(), 1);
    let ops = opcodes(groups[0].clone());
    let expected: Vec<Opcode> = [
        Opcode::INSERT_USER,
        Opcode::NOTIFY_USER_BINARY,
        Opcode::NOTIFY_USER_BINARY,
        Opcode::NOTIFY_USER_BINARY,
    ]
    .repeat(2)
    .into_iter()
    .chain([Opcode::DUPLICATE_OBJECT; 3])
    .chain([Opcode::END])
    .collect();
    assert_eq!(ops, expected);

    // Each existing member hears about the newcomer once.
    for rx in [&mut a_rx, &mut b_rx] {
        let ops: Vec<Opcode> = drain(rx).into_iter().flat_map(opcodes).collect();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0], Opcode::INSERT_USER);
    }
}

#[tokio::test]
async fn test_broadcast_reaches_every_other_member_once() {
    let hub = Stage::new("hub", 4, 127);
    let mut receivers = Vec::new();
    for conn in 1..=3 {
        let (ob, rx) = outbox(conn);
        hub.join(CharId(conn as u32), ob).await.unwrap();
        receivers.push(rx);
    }
    for rx in &mut receivers {
        drain(rx);
    }

    let sent = hub
        .broadcast(
            &stagehand_protocol::packets::DeleteUser { char_id: 9 },
            Some(ConnectionId::new(2)),
        )
        .await;

    assert_eq!(sent, 2);
    assert_eq!(drain(&mut receivers[0]).len(), 1);
    assert!(drain(&mut receivers[1]).is_empty());
    assert_eq!(drain(&mut receivers[2]).len(), 1);
}

#[tokio::test]
async fn test_broadcast_to_full_queue_drops_instead_of_blocking() {
    let hub = Stage::new("hub", 4, 127);
    let (slow, _slow_rx) =
        Outbox::channel(ConnectionId::new(1), ClientContext::default(), 1);
    hub.join(CharId(1), slow).await.unwrap();

    let sent = tokio::time::timeout(
        Duration::from_secs(1),
        hub.broadcast(&stagehand_protocol::packets::DeleteUser { char_id: 2 }, None),
    )
    .await
    .expect("broadcast blocked on a full queue");

    assert_eq!(sent, 0);
}

// ---------------------------------------------------------------------------
// Binaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_binary_waiters_all_wake_on_set() {
    let stage = Arc::new(Stage::new("quest", 4, 127));
    let key = BinaryKey::new(2, 1);

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let stage = Arc::clone(&stage);
            tokio::spawn(async move { stage.wait_binary(key).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;
    stage.set_binary(key, Bytes::from_static(&[1, 2, 3])).await;

    for waiter in waiters {
        let value = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter did not wake")
            .unwrap();
        assert_eq!(&value[..], &[1, 2, 3]);
    }
}

// ---------------------------------------------------------------------------
// Semaphores
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_well_known_semaphore_drains_exactly_once() {
    let drained = Arc::new(AtomicUsize::new(0));
    let hook = Arc::clone(&drained);
    let registry = SemaphoreRegistry::with_drained_hook(
        SemaphoreConfig::default(),
        Arc::new(move |_: &str| {
            hook.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let raid = "hs_l0u3B51J9k2";

    for id in 1..=3 {
        let (_, outcome) = registry.acquire(raid, CharId(id)).await;
        assert_eq!(outcome, AcquireOutcome::Acquired);
    }
    registry.release(raid, CharId(1)).await;
    registry.remove_character_from_all(CharId(2)).await;
    assert_eq!(drained.load(Ordering::SeqCst), 0);

    registry.remove_character_from_all(CharId(3)).await;
    registry.remove_character_from_all(CharId(3)).await;

    assert_eq!(drained.load(Ordering::SeqCst), 1);
}
