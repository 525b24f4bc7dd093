//! Types and constants shared between the echo server and the load client:
//! the wire-protocol conventions, latency sample aggregation, and the
//! serializable load-test report.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix prepended to every echoed line.
pub const ECHO_PREFIX: &str = "ECHO: ";

/// Maximum number of bytes consumed per read call. Lines longer than this
/// are echoed across multiple read/echo cycles rather than reassembled.
pub const READ_BUFFER_SIZE: usize = 100;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9001;

/// Per-read idle bound. Silence beyond this indicates an unresponsive or
/// abandoned peer and ends the session.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;

/// Builds the response for one received chunk: the echo prefix, the text
/// with trailing whitespace (including the line terminator) removed, and a
/// fresh line terminator.
pub fn format_echo(text: &str) -> String {
    format!("{}{}\n", ECHO_PREFIX, text.trim_end())
}

/// Success rate as a percentage. An empty sample set counts as fully
/// successful so that a session that never completed a cycle does not
/// report as failing.
pub fn success_rate(ok: u64, failed: u64) -> f64 {
    let total = ok + failed;
    if total == 0 {
        100.0
    } else {
        ok as f64 / total as f64 * 100.0
    }
}

/// Accumulator for round-trip latency samples.
///
/// Keeps only the aggregate (count, sum, extremes), so recording is O(1)
/// and the memory footprint is constant regardless of session length.
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one round-trip latency sample.
    pub fn record(&mut self, sample: Duration) {
        self.count += 1;
        self.total += sample;
        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));
        self.max = Some(self.max.map_or(sample, |m| m.max(sample)));
    }

    /// Folds another accumulator into this one. Used by the load client to
    /// combine per-connection statistics into a run-wide aggregate.
    pub fn merge(&mut self, other: &LatencyStats) {
        self.count += other.count;
        self.total += other.total;
        if let Some(other_min) = other.min {
            self.min = Some(self.min.map_or(other_min, |m| m.min(other_min)));
        }
        if let Some(other_max) = other.max {
            self.max = Some(self.max.map_or(other_max, |m| m.max(other_max)));
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.count == 0 {
            None
        } else {
            Some(self.total / self.count as u32)
        }
    }

    pub fn min(&self) -> Option<Duration> {
        self.min
    }

    pub fn max(&self) -> Option<Duration> {
        self.max
    }
}

/// Aggregate outcome of one load-test run, printable as JSON for external
/// collectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub clients: u32,
    pub messages_per_client: u32,
    pub responses_ok: u64,
    pub responses_failed: u64,
    pub success_rate_percent: f64,
    pub latency_total_ms: f64,
    pub latency_mean_ms: Option<f64>,
    pub latency_min_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,
}

impl RunReport {
    /// Builds a report from per-run counters and the merged latency
    /// accumulator.
    pub fn from_stats(
        clients: u32,
        messages_per_client: u32,
        ok: u64,
        failed: u64,
        latency: &LatencyStats,
    ) -> Self {
        let to_ms = |d: Duration| d.as_secs_f64() * 1000.0;
        Self {
            clients,
            messages_per_client,
            responses_ok: ok,
            responses_failed: failed,
            success_rate_percent: success_rate(ok, failed),
            latency_total_ms: to_ms(latency.total()),
            latency_mean_ms: latency.mean().map(to_ms),
            latency_min_ms: latency.min().map(to_ms),
            latency_max_ms: latency.max().map(to_ms),
        }
    }
}
