//! Server network layer: the listening socket, the accept loop, and the
//! shutdown sequence.
//!
//! The supervisor here is deliberately thin. It accepts sockets, spawns one
//! [`Session`](crate::session::Session) task per connection, and on a
//! termination signal stops accepting, drains the registry, and returns.
//! All per-connection behavior lives in the session module; all membership
//! bookkeeping lives in the registry.

use crate::metrics::SessionMetrics;
use crate::registry::ConnectionRegistry;
use crate::session::Session;
use log::{error, info};
use shared::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_READ_TIMEOUT_SECS};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Listening endpoint and per-read timeout. Built from CLI flags in the
/// binary; tests construct it directly with port 0 for an ephemeral port.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }
}

/// The echo server supervisor: listener plus shared registry and metrics.
#[derive(Debug)]
pub struct EchoServer {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<SessionMetrics>,
    read_timeout: Duration,
}

impl EchoServer {
    /// Binds the listening socket. A bind conflict (port already in use)
    /// is the one fatal startup condition; the error propagates to the
    /// caller, which reports it and exits.
    pub async fn bind(config: &ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        info!("Echo server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            registry: Arc::new(ConnectionRegistry::new()),
            metrics: Arc::new(SessionMetrics::new()),
            read_timeout: config.read_timeout,
        })
    }

    /// Actual bound address, needed when binding to port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared registry handle, mainly for observation in tests.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<SessionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs until the process receives SIGINT or SIGTERM, then drains.
    pub async fn run(self) -> io::Result<()> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            termination_signal().await;
            info!("Received termination signal, shutting down...");
            let _ = shutdown_tx.send(());
        });
        self.run_until(shutdown_rx).await
    }

    /// Accept loop with an externally supplied shutdown trigger. Once the
    /// trigger fires: stop accepting, close the listening socket, drain
    /// every live session, log the final accounting, return.
    pub async fn run_until(self, mut shutdown: oneshot::Receiver<()>) -> io::Result<()> {
        let EchoServer {
            listener,
            registry,
            metrics,
            read_timeout,
        } = self;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopping accept loop");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let session = Session::new(
                                stream,
                                addr,
                                Arc::clone(&registry),
                                Arc::clone(&metrics),
                                read_timeout,
                            );
                            tokio::spawn(session.run());
                        }
                        Err(e) => {
                            // Transient accept failures (e.g. fd exhaustion)
                            // must not take the server down.
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        // New connection attempts are refused from here on.
        drop(listener);
        registry.close_all().await;

        let snap = metrics.snapshot();
        info!(
            "Shutdown complete: {} opened, {} closed ok, {} closed with error, {} rejected, {} echo cycle(s)",
            snap.connections_opened,
            snap.connections_closed_ok,
            snap.connections_closed_error,
            snap.connections_rejected,
            snap.echo_cycles
        );
        Ok(())
    }
}

/// Resolves when the process receives an interrupt or terminate signal.
/// Both are treated identically: stop accepting, then drain.
async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
