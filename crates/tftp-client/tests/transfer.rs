//! End-to-end transfers over real loopback UDP sockets, one fake server
//! task per scenario. Exercises every scheme this engine understands.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use tftp_client::config::EngineConfig;
use tftp_client::consumer::test_util::RecordingConsumer;
use tftp_client::{Engine, TftpUri};

fn oack(pairs: &[(&str, &str)]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u16(6);
    for (name, value) in pairs {
        buf.put_slice(name.as_bytes());
        buf.put_u8(0);
        buf.put_slice(value.as_bytes());
        buf.put_u8(0);
    }
    buf
}

fn data(block: u16, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u16(3);
    buf.put_u16(block);
    buf.put_slice(payload);
    buf
}

fn error(code: u16, message: &str) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u16(5);
    buf.put_u16(code);
    buf.put_slice(message.as_bytes());
    buf.put_u8(0);
    buf
}

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.timer_initial_ms = 30;
    config.timer_cap_ms = 60;
    config.timer_max_attempts = 5;
    config
}

#[tokio::test]
async fn plain_tftp_with_oack_completes() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        let (_, client) = server.recv_from(&mut buf).await.unwrap(); // RRQ
        server
            .send_to(&oack(&[("blksize", "512"), ("tsize", "11")]), client)
            .await
            .unwrap();
        let (_, client) = server.recv_from(&mut buf).await.unwrap(); // ACK(0)
        server.send_to(&data(1, b"hello world"), client).await.unwrap();
    });

    let uri = TftpUri::parse(&format!("tftp://{}/greeting.txt", server_addr)).unwrap();
    let consumer = RecordingConsumer::default();
    let inner = consumer.inner.clone();

    timeout(
        Duration::from_secs(5),
        Engine::run(uri, fast_config(), Box::new(consumer)),
    )
    .await
    .expect("did not complete in time")
    .expect("transfer failed");

    let recorded = inner.lock().unwrap();
    assert_eq!(recorded.closed, Some(0));
    let payload: Vec<u8> = recorded.writes.iter().flat_map(|(_, d)| d.clone()).collect();
    assert_eq!(payload, b"hello world");
    // tsize=11 in the OACK raises filesize from 0, so the consumer must see
    // the seek(filesize); seek(0) length-hint pair before any delivery.
    assert_eq!(recorded.seeks[0], 11);
    assert_eq!(recorded.seeks[1], 0);
}

#[tokio::test]
async fn plain_tftp_without_oack_or_tsize_completes() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();
    let blksize = 512usize;
    let first_block = vec![0xABu8; blksize];

    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        let (_, client) = server.recv_from(&mut buf).await.unwrap(); // RRQ
        // No OACK: server goes straight to DATA, ignoring the requested options.
        server.send_to(&data(1, &first_block), client).await.unwrap();
        let (_, client) = server.recv_from(&mut buf).await.unwrap(); // ACK(1)
        server.send_to(&data(2, b"tail"), client).await.unwrap();
    });

    let uri = TftpUri::parse(&format!("tftp://{}/image.bin", server_addr)).unwrap();
    let consumer = RecordingConsumer::default();
    let inner = consumer.inner.clone();

    timeout(
        Duration::from_secs(5),
        Engine::run(uri, fast_config(), Box::new(consumer)),
    )
    .await
    .expect("did not complete in time")
    .expect("transfer failed");

    let recorded = inner.lock().unwrap();
    let total: usize = recorded.writes.iter().map(|(_, d)| d.len()).sum();
    assert_eq!(total, blksize + 4);
}

#[tokio::test]
async fn tftm_master_client_acks_multicast_data() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    let group_ip = Ipv4Addr::new(239, 252, 19, 9);
    let group_port = 33211u16;

    let mcast_send = {
        let socket2 = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )
        .unwrap();
        socket2.set_multicast_if_v4(&Ipv4Addr::LOCALHOST).unwrap();
        socket2.set_multicast_loop_v4(true).unwrap();
        socket2.bind(&"0.0.0.0:0".parse::<SocketAddr>().unwrap().into()).unwrap();
        socket2.set_nonblocking(true).unwrap();
        let std_socket: std::net::UdpSocket = socket2.into();
        UdpSocket::from_std(std_socket).unwrap()
    };

    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        let (_, client) = server.recv_from(&mut buf).await.unwrap(); // RRQ
        server
            .send_to(
                &oack(&[
                    ("blksize", "512"),
                    ("tsize", "6"),
                    ("multicast", &format!("{group_ip},{group_port},1")),
                ]),
                client,
            )
            .await
            .unwrap();

        // Give the client a moment to join the group before the first
        // multicast DATA block goes out.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let group: SocketAddr = SocketAddrV4::new(group_ip, group_port).into();
        mcast_send.send_to(b"abcdef", group).await.unwrap();

        // Master client ACKs over unicast back to the server's socket.
        let mut ack_buf = vec![0u8; 16];
        let (_, _ack_from) = server.recv_from(&mut ack_buf).await.unwrap();
    });

    let uri = TftpUri::parse(&format!("tftm://{}/clip.raw", server_addr)).unwrap();
    let consumer = RecordingConsumer::default();
    let inner = consumer.inner.clone();

    timeout(
        Duration::from_secs(5),
        Engine::run(uri, fast_config(), Box::new(consumer)),
    )
    .await
    .expect("did not complete in time")
    .expect("transfer failed");

    let recorded = inner.lock().unwrap();
    let payload: Vec<u8> = recorded.writes.iter().flat_map(|(_, d)| d.clone()).collect();
    assert_eq!(payload, b"abcdef");
}

#[tokio::test]
async fn server_error_terminates_transfer() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        let (_, client) = server.recv_from(&mut buf).await.unwrap(); // RRQ
        server
            .send_to(&error(1, "file not found"), client)
            .await
            .unwrap();
    });

    let uri = TftpUri::parse(&format!("tftp://{}/missing.bin", server_addr)).unwrap();
    let consumer = RecordingConsumer::default();
    let inner = consumer.inner.clone();

    let result = timeout(
        Duration::from_secs(5),
        Engine::run(uri, fast_config(), Box::new(consumer)),
    )
    .await
    .expect("did not complete in time");

    let err = result.expect_err("expected the transfer to fail");
    assert_eq!(err.status_code(), 5); // NotFound
    assert_eq!(inner.lock().unwrap().closed, Some(5));
}

#[tokio::test]
async fn mtftp_falls_back_to_plain_tftp_after_repeated_silence() {
    // Nobody answers at all: the engine must exhaust its MTFTP fallback
    // cap, restart as plain TFTP against the (still silent) well-known
    // port, and eventually give up with a timeout.
    let uri = TftpUri::parse("mtftp://127.0.0.1:34254/unreachable.bin").unwrap();
    let mut config = fast_config();
    config.timer_max_attempts = 1;
    config.mtftp_fallback_cap = 1;
    let consumer = RecordingConsumer::default();

    let result = timeout(
        Duration::from_secs(5),
        Engine::run(uri, config, Box::new(consumer)),
    )
    .await
    .expect("engine should give up well within the timeout budget");

    assert!(result.is_err());
}
