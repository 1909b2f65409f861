//! End-to-end tests over real loopback UDP sockets.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use quay_protocol::prelude::*;
use quay_protocol::server::QuayServer;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

struct RunningServer {
    addr: SocketAddr,
    deliveries: mpsc::Receiver<Delivery>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<QuayServer>,
}

impl RunningServer {
    async fn start(builder: QuayServerBuilder) -> Self {
        let mut server = builder.bind_addr(loopback()).bind().await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, deliveries) = mpsc::channel(1024);
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server.run(tx, stopped).await.unwrap();
            server
        });
        Self {
            addr,
            deliveries,
            stop,
            task,
        }
    }

    /// Collect deliveries until each stream in `expected` has that many bytes.
    async fn collect(&mut self, expected: &[(u64, usize)]) -> HashMap<u64, Vec<u8>> {
        let mut streams: HashMap<u64, Vec<u8>> = HashMap::new();
        let done = |streams: &HashMap<u64, Vec<u8>>| {
            expected
                .iter()
                .all(|(id, len)| streams.get(id).map_or(0, Vec::len) >= *len)
        };
        while !done(&streams) {
            let delivery = tokio::time::timeout(Duration::from_secs(10), self.deliveries.recv())
                .await
                .expect("timed out waiting for deliveries")
                .expect("server stopped");
            let buf = streams.entry(delivery.stream_id).or_default();
            assert_eq!(delivery.offset, buf.len() as u64, "gap or duplicate on stream");
            buf.extend_from_slice(&delivery.data);
        }
        streams
    }

    async fn stop(self) -> QuayServer {
        let _ = self.stop.send(());
        self.task.await.unwrap()
    }
}

fn client_builder(server: SocketAddr) -> QuayClientBuilder {
    QuayClientBuilder::new()
        .server_addr(server)
        .bind_addr(loopback())
        .handshake_timeout(Duration::from_secs(2))
}

fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

#[tokio::test]
async fn test_full_handshake_multi_stream_delivery() {
    init_tracing();
    let mut server = RunningServer::start(QuayServerBuilder::new()).await;

    let mut client = client_builder(server.addr)
        .chunk_size(100)
        .connect()
        .await
        .unwrap();
    assert!(!client.is_zero_rtt());

    let first = pattern(1, 1500);
    let second = pattern(100, 777);
    assert_eq!(client.send(1, &first[..1000]), 0);
    assert_eq!(client.send(2, &second), 0);
    assert_eq!(client.send(1, &first[1000..]), 1000);

    tokio::time::timeout(Duration::from_secs(10), client.run_until_idle())
        .await
        .expect("client never went idle")
        .unwrap();

    let streams = server.collect(&[(1, first.len()), (2, second.len())]).await;
    assert_eq!(streams[&1], first);
    assert_eq!(streams[&2], second);

    let stats = client.stats();
    assert_eq!(stats.bytes_acked, (first.len() + second.len()) as u64);
    assert_eq!(stats.acks_matched, 23);

    let server = server.stop().await;
    assert_eq!(server.stats().handshakes, 1);
    assert_eq!(server.connections().len(), 1);
}

#[tokio::test]
async fn test_zero_rtt_after_cached_handshake() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("server_pub.bin");
    let mut server =
        RunningServer::start(QuayServerBuilder::new().static_key_path(dir.path().join("server_key.bin")))
            .await;

    let mut first = client_builder(server.addr)
        .peer_key_cache(&cache)
        .connect()
        .await
        .unwrap();
    assert!(!first.is_zero_rtt());
    assert!(cache.exists());
    first.send(1, b"warm-up");
    first.run_until_idle().await.unwrap();
    server.collect(&[(1, 7)]).await;

    let mut second = client_builder(server.addr)
        .peer_key_cache(&cache)
        .connect()
        .await
        .unwrap();
    assert!(second.is_zero_rtt());
    assert!(!second.is_confirmed());
    assert_ne!(second.session().connection_id(), first.session().connection_id());

    second.send(5, b"first flight");
    tokio::time::timeout(Duration::from_secs(10), second.run_until_idle())
        .await
        .unwrap()
        .unwrap();
    assert!(second.is_confirmed());

    let streams = server.collect(&[(5, 12)]).await;
    assert_eq!(streams[&5], b"first flight");

    let server = server.stop().await;
    assert_eq!(server.stats().handshakes, 1);
    assert_eq!(server.stats().zero_rtt_accepted, 1);
    assert_eq!(server.connections().len(), 2);
}

#[tokio::test]
async fn test_client_migration_keeps_connection() {
    init_tracing();
    let mut server = RunningServer::start(QuayServerBuilder::new()).await;
    let mut client = client_builder(server.addr).connect().await.unwrap();
    let before = client.local_addr().unwrap();

    client.send(1, b"before ");
    client.run_until_idle().await.unwrap();

    let after = client.migrate(loopback()).await.unwrap();
    assert_ne!(before, after);
    client.send(1, b"after");
    tokio::time::timeout(Duration::from_secs(10), client.run_until_idle())
        .await
        .unwrap()
        .unwrap();

    let streams = server.collect(&[(1, 12)]).await;
    assert_eq!(streams[&1], b"before after");

    let server = server.stop().await;
    let conn = server
        .connections()
        .get(&client.session().connection_id())
        .unwrap();
    assert_eq!(conn.peer_addr(), after);
    assert_eq!(conn.migrations(), 1);
}

#[tokio::test]
async fn test_handshake_timeout_is_fatal() {
    init_tracing();
    let silent = tokio::net::UdpSocket::bind(loopback()).await.unwrap();
    let started = tokio::time::Instant::now();

    let err = client_builder(silent.local_addr().unwrap())
        .handshake_timeout(Duration::from_millis(200))
        .connect()
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Handshake(HandshakeError::Timeout(_))));
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_run_abandons_on_shutdown() {
    init_tracing();
    let silent = tokio::net::UdpSocket::bind(loopback()).await.unwrap();
    let cached = DhKeyPair::generate();
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("peer.bin");
    std::fs::write(&cache, cached.public_value()).unwrap();

    // 0-RTT needs no answer to connect, so a silent peer leaves data stranded.
    let mut client = client_builder(silent.local_addr().unwrap())
        .peer_key_cache(&cache)
        .chunk_size(4)
        .connect()
        .await
        .unwrap();
    assert!(client.is_zero_rtt());
    client.send(1, b"never acknowledged");

    client
        .run(tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap();
    assert!(client.is_idle());
    assert_eq!(client.stats().datagrams_sent, 1);
}
