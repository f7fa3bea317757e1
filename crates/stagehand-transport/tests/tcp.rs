//! Integration tests for the TCP transport over a real loopback socket.

use std::time::Duration;

use stagehand_transport::{
    CryptConn, NullCipher, PacketReader, PacketWriter, TcpTransport,
};

async fn listener() -> TcpTransport<NullCipher> {
    TcpTransport::bind("127.0.0.1:0", NullCipher)
        .await
        .expect("bind should succeed")
}

#[tokio::test]
async fn test_client_group_arrives_at_server_with_terminator() {
    let transport = listener().await;
    let addr = transport.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let conn = CryptConn::connect(addr, NullCipher).await.unwrap();
        let (_reader, mut writer) = conn.into_split();
        writer.send_packet_group(&[0x00, 0x17]).await.unwrap();
        // Keep the socket open until the server has read.
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let conn = transport.accept().await.unwrap();
    let (mut reader, _writer) = conn.into_split();
    let group = reader.read_packet_group().await.unwrap().unwrap();

    assert_eq!(&group[..], &[0x00, 0x17, 0x00, 0x10]);
    client.await.unwrap();
}

#[tokio::test]
async fn test_server_reply_keeps_key_rotation_in_sync() {
    let transport = listener().await;
    let addr = transport.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let conn = CryptConn::connect(addr, NullCipher).await.unwrap();
        let (mut reader, _writer) = conn.into_split();
        let mut groups = Vec::new();
        for _ in 0..3 {
            groups.push(reader.read_packet_group().await.unwrap().unwrap());
        }
        groups
    });

    let conn = transport.accept().await.unwrap();
    let (_reader, mut writer) = conn.into_split();
    for i in 0..3u8 {
        writer.send_packet_group(&[i]).await.unwrap();
    }

    let groups = client.await.unwrap();
    assert_eq!(groups.len(), 3);
    assert_eq!(&groups[2][..], &[2, 0x00, 0x10]);
}

#[tokio::test]
async fn test_accept_assigns_distinct_connection_ids() {
    let transport = listener().await;
    let addr = transport.local_addr().unwrap();

    let _c1 = CryptConn::connect(addr, NullCipher).await.unwrap();
    let _c2 = CryptConn::connect(addr, NullCipher).await.unwrap();

    let a = transport.accept().await.unwrap();
    let b = transport.accept().await.unwrap();

    assert_ne!(a.id(), b.id());
}

#[tokio::test]
async fn test_peer_close_reads_as_none() {
    let transport = listener().await;
    let addr = transport.local_addr().unwrap();

    let c = CryptConn::connect(addr, NullCipher).await.unwrap();
    let conn = transport.accept().await.unwrap();
    drop(c);

    let (mut reader, _writer) = conn.into_split();
    assert!(reader.read_packet_group().await.unwrap().is_none());
}
