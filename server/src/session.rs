//! Per-connection session loop: register, echo until the connection ends,
//! deregister, report.
//!
//! Each accepted socket gets one task running [`Session::run`]. The session
//! is the exclusive owner of the stream; the registry only learns about its
//! existence and can ask it to stop via the forced-close signal. Every way
//! a session can end funnels through a single closing path, so the outcome
//! diagnostic is emitted exactly once and the socket is closed exactly once
//! (by dropping the stream when the task returns).

use crate::metrics::SessionMetrics;
use crate::registry::{ConnectionRegistry, Registration};
use log::{debug, error, info, warn};
use shared::{format_echo, success_rate, LatencyStats, READ_BUFFER_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

/// Why the echo loop stopped. Exactly one of these is produced per session
/// that makes it past registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Peer closed its write side; a zero-byte read.
    GracefulEof,
    /// No bytes arrived within the per-read bound.
    ReadTimeout,
    /// The transport reported an abrupt close mid-read.
    PeerReset,
    /// Echoing back failed, typically because the peer is already gone.
    WriteFailure,
    /// Received bytes were not valid UTF-8.
    DecodeFailure,
    /// The registry's shutdown drain asked this session to stop.
    Drained,
}

impl SessionEnd {
    /// Graceful ends count as clean closes; everything else is an error
    /// outcome for metrics purposes.
    fn is_clean(self) -> bool {
        matches!(self, SessionEnd::GracefulEof | SessionEnd::Drained)
    }
}

/// Cycle counts and latency samples for one session. Ephemeral: produced
/// for the closing diagnostic, then dropped with the session.
#[derive(Debug, Default)]
struct SessionStats {
    ok_cycles: u64,
    failed_cycles: u64,
    latency: LatencyStats,
}

/// One accepted connection's state, driven by [`Session::run`].
pub struct Session {
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<SessionMetrics>,
    read_timeout: Duration,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<SessionMetrics>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            addr,
            registry,
            metrics,
            read_timeout,
        }
    }

    /// Runs the session to completion: Registering, then the Active echo
    /// loop, then Closing. Never returns an error; every failure is
    /// contained here and surfaces only as log output and metrics.
    pub async fn run(mut self) {
        // Registering: the shutdown gate. A rejected connection is closed
        // by dropping the stream, before any echo traffic and without
        // producing session statistics.
        let Registration {
            id,
            mut forced_close,
        } = match self.registry.register(self.addr) {
            Some(registration) => registration,
            None => {
                self.metrics.record_rejected();
                return;
            }
        };
        self.metrics.record_opened();

        // Active.
        let mut stats = SessionStats::default();
        let end = self.echo_loop(&mut forced_close, &mut stats).await;

        // Closing: deregister (idempotent, safe against the drain having
        // already processed this id), report, and let the stream drop.
        self.registry.remove(id);
        self.metrics.record_closed(end.is_clean());

        let total = stats.ok_cycles + stats.failed_cycles;
        info!(
            "Session {} ({}) closed: {:?}, {} ok / {} failed cycle(s), success rate {:.2}%",
            id,
            self.addr,
            end,
            stats.ok_cycles,
            stats.failed_cycles,
            success_rate(stats.ok_cycles, stats.failed_cycles)
        );
        if total > 0 {
            if let (Some(mean), Some(min), Some(max)) = (
                stats.latency.mean(),
                stats.latency.min(),
                stats.latency.max(),
            ) {
                debug!(
                    "Session {} latency: total {:?}, mean {:?}, min {:?}, max {:?}",
                    id,
                    stats.latency.total(),
                    mean,
                    min,
                    max
                );
            }
        }
    }

    /// The Active state: read with a bounded wait, decode, echo, repeat.
    /// Returns the first terminal condition encountered.
    async fn echo_loop(
        &mut self,
        forced_close: &mut oneshot::Receiver<()>,
        stats: &mut SessionStats,
    ) -> SessionEnd {
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            let cycle_start = Instant::now();

            let read = tokio::select! {
                _ = &mut *forced_close => {
                    info!("Session from {} closed by shutdown drain", self.addr);
                    return SessionEnd::Drained;
                }
                read = timeout(self.read_timeout, self.stream.read(&mut buf)) => read,
            };

            let n = match read {
                Err(_elapsed) => {
                    error!(
                        "Read timeout from {} after {:?}",
                        self.addr, self.read_timeout
                    );
                    stats.failed_cycles += 1;
                    return SessionEnd::ReadTimeout;
                }
                Ok(Err(e)) => {
                    error!("Connection from {} dropped unexpectedly: {}", self.addr, e);
                    stats.failed_cycles += 1;
                    return SessionEnd::PeerReset;
                }
                Ok(Ok(0)) => {
                    info!("Peer {} sent EOF, closing gracefully", self.addr);
                    return SessionEnd::GracefulEof;
                }
                Ok(Ok(n)) => n,
            };

            let text = match std::str::from_utf8(&buf[..n]) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Undecodable payload from {}: {}", self.addr, e);
                    stats.failed_cycles += 1;
                    return SessionEnd::DecodeFailure;
                }
            };

            // The write is also raced against the drain signal: a peer
            // that floods without reading can park this session in
            // write_all once both socket buffers fill, and the drain must
            // still be able to end it.
            let response = format_echo(text);
            let write = tokio::select! {
                _ = &mut *forced_close => {
                    info!("Session from {} closed by shutdown drain mid-write", self.addr);
                    return SessionEnd::Drained;
                }
                write = self.stream.write_all(response.as_bytes()) => write,
            };
            if let Err(e) = write {
                error!("Failed to echo to {}: {}", self.addr, e);
                stats.failed_cycles += 1;
                return SessionEnd::WriteFailure;
            }

            let latency = cycle_start.elapsed();
            stats.ok_cycles += 1;
            stats.latency.record(latency);
            self.metrics.record_cycle(latency);
            debug!(
                "Session from {}: echoed {} byte(s) in {:?}",
                self.addr,
                n,
                latency
            );
        }
    }
}
