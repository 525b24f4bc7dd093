//! Load client network layer: opens many concurrent connections to the
//! echo server, measures per-message round-trip latency, and folds the
//! results into one [`RunReport`].
//!
//! Each client connection runs as its own task. A failing client (connect
//! refused, response timeout, server-side close, wrong payload) only
//! affects its own counters; the run always completes and reports.

use log::{debug, error, warn};
use rand::Rng;
use shared::{format_echo, LatencyStats, RunReport, DEFAULT_HOST, DEFAULT_PORT};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

/// Parameters for one load-test run.
///
/// The message should stay short enough that `"{message} from {id}"` fits
/// the server's per-read buffer; longer payloads get echoed in chunks and
/// will be reported as mismatches.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Server address, e.g. `127.0.0.1:9001`.
    pub server: String,
    /// Number of concurrent client connections.
    pub clients: u32,
    /// Messages sent per connection.
    pub messages_per_client: u32,
    /// Payload text; each client appends ` from {id}`.
    pub message: String,
    /// Bound on waiting for each echo response.
    pub response_timeout: Duration,
    /// Upper bound on the random per-client start delay. Zero disables
    /// jitter and opens all connections at once.
    pub start_jitter: Duration,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            server: format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            clients: 50,
            messages_per_client: 1,
            message: "Hello server".to_string(),
            response_timeout: Duration::from_secs(5),
            start_jitter: Duration::from_millis(25),
        }
    }
}

/// Counters for one client connection.
#[derive(Debug, Default)]
pub struct ClientOutcome {
    pub ok: u64,
    pub failed: u64,
    pub latency: LatencyStats,
}

/// Runs the configured number of concurrent clients against the server
/// and aggregates their outcomes. Never fails; every error is contained
/// in the per-client counters.
pub async fn run_load_test(config: &LoadConfig) -> RunReport {
    let mut handles = Vec::with_capacity(config.clients as usize);
    for id in 0..config.clients {
        let config = config.clone();
        handles.push(tokio::spawn(run_client(id, config)));
    }

    let mut ok = 0u64;
    let mut failed = 0u64;
    let mut latency = LatencyStats::new();
    for handle in handles {
        match handle.await {
            Ok(outcome) => {
                ok += outcome.ok;
                failed += outcome.failed;
                latency.merge(&outcome.latency);
            }
            Err(e) => {
                error!("Client task panicked: {}", e);
                failed += config.messages_per_client as u64;
            }
        }
    }

    RunReport::from_stats(
        config.clients,
        config.messages_per_client,
        ok,
        failed,
        &latency,
    )
}

/// One client connection: connect, send each message, await and verify its
/// echo, record the round-trip latency. Any failure marks the remaining
/// messages as failed and ends this client.
async fn run_client(id: u32, config: LoadConfig) -> ClientOutcome {
    let mut outcome = ClientOutcome::default();
    let planned = config.messages_per_client as u64;

    if !config.start_jitter.is_zero() {
        let delay = rand::thread_rng().gen_range(Duration::ZERO..config.start_jitter);
        sleep(delay).await;
    }

    let stream = match TcpStream::connect(&config.server).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Client {} failed to connect to {}: {}", id, config.server, e);
            outcome.failed = planned;
            return outcome;
        }
    };
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    let payload = format!("{} from {}\n", config.message, id);
    let expected = format_echo(&payload);

    for sent in 0..config.messages_per_client {
        let remaining = planned - sent as u64;
        let start = Instant::now();

        if let Err(e) = write_half.write_all(payload.as_bytes()).await {
            error!("Client {} failed to send: {}", id, e);
            outcome.failed += remaining;
            return outcome;
        }

        line.clear();
        match timeout(config.response_timeout, reader.read_line(&mut line)).await {
            Err(_elapsed) => {
                error!(
                    "Client {}: no response within {:?}",
                    id, config.response_timeout
                );
                outcome.failed += remaining;
                return outcome;
            }
            Ok(Err(e)) => {
                error!("Client {}: read failed: {}", id, e);
                outcome.failed += remaining;
                return outcome;
            }
            Ok(Ok(0)) => {
                error!("Client {}: server closed the connection", id);
                outcome.failed += remaining;
                return outcome;
            }
            Ok(Ok(_)) => {
                let latency = start.elapsed();
                if line == expected {
                    debug!("Client {}: {} in {:?}", id, line.trim_end(), latency);
                    outcome.ok += 1;
                    outcome.latency.record(latency);
                } else {
                    warn!(
                        "Client {}: unexpected response {:?} (wanted {:?})",
                        id, line, expected
                    );
                    outcome.failed += 1;
                }
            }
        }
    }

    outcome
}
