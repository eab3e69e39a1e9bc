//! End-to-end client/server tests over the loopback interface.
//!
//! Client and server each get their own reservation registry, as they
//! would when running in separate processes.

use std::net::SocketAddr;
use std::time::Duration;

use tftp_kit::Error;
use tftp_kit::client::{Client, ClientConfig};
use tftp_kit::core::{MAX_BLOCK_SIZE, Mode, Packet, ReservationRegistry, cancel_pair};
use tftp_kit::server::{FileStore, Server, ServerConfig};
use tokio::net::UdpSocket;
use tokio::time::timeout;

async fn start_server() -> Server {
    let config = ServerConfig::new("127.0.0.1".parse().unwrap(), 0);
    Server::spawn(config, ReservationRegistry::new(), FileStore::new())
        .await
        .unwrap()
}

fn client_for(server: &Server) -> Client {
    let addr = server.local_addr();
    Client::new(
        ClientConfig::new(addr.ip(), addr.port()),
        ReservationRegistry::new(),
    )
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add((i >> 8) as u8))
        .collect()
}

/// Receive datagrams until an ACK with the given block number arrives,
/// returning the endpoint it came from.
async fn recv_ack(socket: &UdpSocket, block: u16) -> SocketAddr {
    timeout(Duration::from_secs(5), async {
        let mut buf = [0u8; 2048];
        loop {
            let (len, from) = socket.recv_from(&mut buf).await.unwrap();
            if let Ok(Packet::Ack { block: b }) = Packet::decode(&buf[..len]) {
                if b == block {
                    return from;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for ACK {block}"))
}

#[tokio::test]
async fn write_then_read_round_trip() {
    let server = start_server().await;
    let client = client_for(&server);
    let (_cancel, token) = cancel_pair();

    // Sizes straddling the block boundary, plus the empty file and a
    // multi-block transfer.
    for size in [0usize, 511, 512, 513, 8192] {
        let name = format!("file{size}");
        let contents = pattern(size);
        client.put(&name, &contents, &token).await.unwrap();
        let read_back = client.get(&name, &token).await.unwrap();
        assert_eq!(read_back, contents, "size {size}");
    }
    server.stop().await;
}

#[tokio::test]
async fn second_write_of_same_name_leaves_file_unchanged() {
    let server = start_server().await;
    let addr = server.local_addr();
    let original = pattern(100);
    let (_cancel, token) = cancel_pair();

    let client = client_for(&server);
    client.put("taken", &original, &token).await.unwrap();

    // The server answers the final block with ERROR(FileAlreadyExists),
    // which the per-block filter does not match, so the client observes
    // a timeout rather than the error reply.
    let impatient = Client::new(
        ClientConfig::new(addr.ip(), addr.port())
            .with_timeout(Duration::from_millis(300))
            .with_retry_period(Duration::from_millis(100)),
        ReservationRegistry::new(),
    );
    let err = impatient
        .put("taken", &pattern(200), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");

    assert_eq!(
        server.store().read("taken").unwrap().as_ref(),
        original.as_slice()
    );
    server.stop().await;
}

#[tokio::test]
async fn get_of_missing_file_times_out() {
    let server = start_server().await;
    let addr = server.local_addr();
    let client = Client::new(
        ClientConfig::new(addr.ip(), addr.port())
            .with_timeout(Duration::from_millis(300))
            .with_retry_period(Duration::from_millis(100)),
        ReservationRegistry::new(),
    );
    let (_cancel, token) = cancel_pair();

    let err = client.get("no-such-file", &token).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
    server.stop().await;
}

#[tokio::test]
async fn replayed_data_block_is_not_reapplied() {
    let server = start_server().await;
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let wrq = Packet::Wrq {
        filename: "dup".to_string(),
        mode: Mode::Octet,
    };
    raw.send_to(&wrq.encode(), server.local_addr()).await.unwrap();
    let transfer_ep = recv_ack(&raw, 0).await;

    let first = pattern(MAX_BLOCK_SIZE);
    let data1 = Packet::Data {
        block: 1,
        data: first.clone(),
    };
    raw.send_to(&data1.encode(), transfer_ep).await.unwrap();
    recv_ack(&raw, 1).await;

    // Replay block 1 after it has been acknowledged, then finish the
    // transfer. The replay must not be appended a second time.
    raw.send_to(&data1.encode(), transfer_ep).await.unwrap();
    let tail = pattern(5);
    let data2 = Packet::Data {
        block: 2,
        data: tail.clone(),
    };
    raw.send_to(&data2.encode(), transfer_ep).await.unwrap();
    recv_ack(&raw, 2).await;

    let mut expected = first;
    expected.extend_from_slice(&tail);
    assert_eq!(server.store().read("dup").unwrap().as_ref(), expected.as_slice());
    server.stop().await;
}

#[tokio::test]
async fn concurrent_uploads_of_different_files_succeed() {
    let server = start_server().await;
    let first_client = client_for(&server);
    let second_client = client_for(&server);
    let (_cancel, token) = cancel_pair();

    let first = pattern(4096);
    let second = pattern(1500);
    let (a, b) = tokio::join!(
        first_client.put("first", &first, &token),
        second_client.put("second", &second, &token),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(server.store().read("first").unwrap().as_ref(), first.as_slice());
    assert_eq!(
        server.store().read("second").unwrap().as_ref(),
        second.as_slice()
    );
    server.stop().await;
}

#[tokio::test]
async fn simultaneous_transfers_with_one_endpoint_conflict() {
    let server = start_server().await;
    let addr = server.local_addr();
    // One registry shared by both clients, as within a single process.
    let registry = ReservationRegistry::new();
    let first_client = Client::new(ClientConfig::new(addr.ip(), addr.port()), registry.clone());
    let second_client = Client::new(ClientConfig::new(addr.ip(), addr.port()), registry);
    let (_cancel, token) = cancel_pair();

    let contents = pattern(2000);
    let (a, b) = tokio::join!(
        first_client.put("one", &contents, &token),
        second_client.put("two", &contents, &token),
    );
    a.unwrap();
    let err = b.unwrap_err();
    assert!(matches!(err, Error::AddressInUse(_)), "got {err:?}");
    server.stop().await;
}

#[tokio::test]
async fn stop_completes_with_a_handler_in_flight() {
    let server = start_server().await;
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // Engage a write handler but never send it any data.
    let wrq = Packet::Wrq {
        filename: "stalled".to_string(),
        mode: Mode::Octet,
    };
    raw.send_to(&wrq.encode(), server.local_addr()).await.unwrap();
    recv_ack(&raw, 0).await;

    timeout(Duration::from_secs(2), server.stop())
        .await
        .expect("stop should cancel the in-flight handler promptly");
}

#[tokio::test]
async fn non_octet_requests_are_silently_ignored() {
    let server = start_server().await;
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let wrq = Packet::Wrq {
        filename: "textual".to_string(),
        mode: Mode::Netascii,
    };
    raw.send_to(&wrq.encode(), server.local_addr()).await.unwrap();

    // No reply of any kind, not even an error packet.
    let mut buf = [0u8; 2048];
    let reply = timeout(Duration::from_millis(500), raw.recv_from(&mut buf)).await;
    assert!(reply.is_err(), "expected silence, got a datagram");
    server.stop().await;
}
