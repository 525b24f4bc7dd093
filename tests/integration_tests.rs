//! Integration tests for the echo service lifecycle
//!
//! These tests run the real server (ephemeral port, externally triggered
//! shutdown) and talk to it over real loopback sockets, exercising the
//! echo protocol, the idle timeout, and the shutdown drain end to end.

use assert_approx_eq::assert_approx_eq;
use client::network::{run_load_test, LoadConfig};
use server::network::{EchoServer, ServerConfig};
use server::registry::ConnectionRegistry;
use shared::ECHO_PREFIX;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

struct TestServer {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<server::metrics::SessionMetrics>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

/// Binds the server on an ephemeral port and runs it with a test-held
/// shutdown trigger.
async fn start_server(read_timeout: Duration) -> TestServer {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        read_timeout,
    };
    let server = EchoServer::bind(&config).await.expect("bind failed");
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    let metrics = server.metrics();

    let (shutdown, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(server.run_until(shutdown_rx));

    TestServer {
        addr,
        registry,
        metrics,
        shutdown,
        task,
    }
}

/// Polls until every session has deregistered or the deadline passes.
async fn wait_for_empty(registry: &ConnectionRegistry, deadline: Duration) {
    let poll = Duration::from_millis(20);
    let mut waited = Duration::ZERO;
    while !registry.is_empty() {
        assert!(
            waited < deadline,
            "registry still has {} session(s) after {:?}",
            registry.len(),
            deadline
        );
        sleep(poll).await;
        waited += poll;
    }
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Client sends one line and receives the prefixed echo; then goes
    /// silent past the idle bound and the server closes the connection.
    #[tokio::test]
    async fn echo_then_silence_closes_connection() {
        let server = start_server(Duration::from_millis(300)).await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        client.write_all(b"hello\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ECHO: hello\n");

        // Silence. The server times out the read and closes; the client
        // observes end-of-stream.
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        wait_for_empty(&server.registry, Duration::from_secs(2)).await;
        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }

    /// Lines longer than the per-read buffer are echoed in chunks, one
    /// echo cycle per chunk, never reassembled.
    #[tokio::test]
    async fn long_line_is_echoed_across_cycles() {
        let server = start_server(Duration::from_secs(5)).await;

        let stream = TcpStream::connect(server.addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let long_line = format!("{}\n", "a".repeat(150));
        write_half.write_all(long_line.as_bytes()).await.unwrap();

        let mut first = String::new();
        reader.read_line(&mut first).await.unwrap();
        assert_eq!(first, format!("{}{}\n", ECHO_PREFIX, "a".repeat(100)));

        let mut second = String::new();
        reader.read_line(&mut second).await.unwrap();
        assert_eq!(second, format!("{}{}\n", ECHO_PREFIX, "a".repeat(50)));

        drop(write_half);
        drop(reader);
        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }

    /// Leading whitespace is preserved; only trailing whitespace is
    /// trimmed before echoing.
    #[tokio::test]
    async fn echo_preserves_leading_whitespace() {
        let server = start_server(Duration::from_secs(5)).await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        client.write_all(b"  padded  \n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ECHO:   padded\n");

        drop(client);
        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }
}

/// LIFECYCLE AND SHUTDOWN TESTS
mod lifecycle_tests {
    use super::*;

    /// Shutdown arrives while connections are active and mid-cycle: the
    /// drain closes all of them, the registry empties, nothing hangs.
    #[tokio::test]
    async fn shutdown_drains_active_connections() {
        let server = start_server(Duration::from_secs(30)).await;

        let mut clients = Vec::new();
        for i in 0..10 {
            let mut client = TcpStream::connect(server.addr).await.unwrap();
            let line = format!("warmup {}\n", i);
            client.write_all(line.as_bytes()).await.unwrap();
            let mut buf = [0u8; 64];
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0);
            clients.push(client);
        }
        assert_eq!(server.registry.len(), 10);

        server.shutdown.send(()).unwrap();
        server.task.await.unwrap().unwrap();

        assert!(server.registry.is_empty());
        assert!(server.registry.is_shutting_down());

        // Every drained client sees its connection closed.
        for mut client in clients {
            let mut buf = [0u8; 8];
            match client.read(&mut buf).await {
                Ok(0) | Err(_) => {}
                Ok(n) => panic!("unexpected {} byte(s) after drain", n),
            }
        }
    }

    /// Sessions that end on their own (client disconnects) deregister
    /// without any shutdown involvement.
    #[tokio::test]
    async fn disconnects_return_registry_to_empty() {
        let server = start_server(Duration::from_secs(5)).await;

        for i in 0..5 {
            let mut client = TcpStream::connect(server.addr).await.unwrap();
            let line = format!("bye {}\n", i);
            client.write_all(line.as_bytes()).await.unwrap();
            let mut buf = [0u8; 64];
            client.read(&mut buf).await.unwrap();
            drop(client);
        }

        wait_for_empty(&server.registry, Duration::from_secs(2)).await;

        let snap = server.metrics.snapshot();
        assert_eq!(snap.connections_opened, 5);
        assert_eq!(snap.connections_closed_ok, 5);
        assert_eq!(snap.connections_closed_error, 0);
        assert_eq!(snap.echo_cycles, 5);

        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }

    /// The port-conflict startup failure surfaces as an error instead of
    /// a half-started server.
    #[tokio::test]
    async fn bind_conflict_reports_an_error() {
        let server = start_server(Duration::from_secs(5)).await;

        let conflict = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: server.addr.port(),
            read_timeout: Duration::from_secs(5),
        };
        let err = EchoServer::bind(&conflict).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);

        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }
}

/// LOAD CLIENT AGAINST THE REAL SERVER
mod load_client_tests {
    use super::*;

    #[tokio::test]
    async fn load_client_round_trips_verify() {
        let server = start_server(Duration::from_secs(5)).await;

        let config = LoadConfig {
            server: server.addr.to_string(),
            clients: 10,
            messages_per_client: 3,
            message: "integration".to_string(),
            response_timeout: Duration::from_secs(2),
            start_jitter: Duration::ZERO,
        };
        let report = run_load_test(&config).await;

        assert_eq!(report.responses_ok, 30);
        assert_eq!(report.responses_failed, 0);
        assert_approx_eq!(report.success_rate_percent, 100.0);
        assert!(report.latency_mean_ms.unwrap() >= 0.0);

        wait_for_empty(&server.registry, Duration::from_secs(2)).await;
        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }
}
