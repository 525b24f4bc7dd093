//! Session counters for the echo server.
//!
//! Lock-free counters bumped from session tasks, with a snapshot for
//! logging at shutdown and for tests. Exporting to an external collector
//! is out of scope here; the snapshot is the boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-wide session accounting, shared as `Arc<SessionMetrics>`.
#[derive(Debug)]
pub struct SessionMetrics {
    connections_opened: AtomicU64,
    connections_closed_ok: AtomicU64,
    connections_closed_error: AtomicU64,
    connections_rejected: AtomicU64,
    echo_cycles: AtomicU64,
    latency_micros_total: AtomicU64,
    latency_micros_min: AtomicU64,
    latency_micros_max: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed_ok: u64,
    pub connections_closed_error: u64,
    pub connections_rejected: u64,
    pub echo_cycles: u64,
    pub latency_total: Duration,
    pub latency_min: Option<Duration>,
    pub latency_max: Option<Duration>,
}

impl MetricsSnapshot {
    pub fn latency_mean(&self) -> Option<Duration> {
        if self.echo_cycles == 0 {
            None
        } else {
            Some(self.latency_total / self.echo_cycles as u32)
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed_ok: AtomicU64::new(0),
            connections_closed_error: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            echo_cycles: AtomicU64::new(0),
            latency_micros_total: AtomicU64::new(0),
            // u64::MAX marks "no sample yet" for the running minimum.
            latency_micros_min: AtomicU64::new(u64::MAX),
            latency_micros_max: AtomicU64::new(0),
        }
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection passed the shutdown gate and entered its echo loop.
    pub fn record_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection was turned away because a drain had begun.
    pub fn record_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A session finished. `ok` distinguishes graceful ends (EOF,
    /// drain-driven close) from error ends (timeout, reset, bad payload).
    pub fn record_closed(&self, ok: bool) {
        if ok {
            self.connections_closed_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.connections_closed_error.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// One successful read-echo-write round trip.
    pub fn record_cycle(&self, latency: Duration) {
        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        self.echo_cycles.fetch_add(1, Ordering::Relaxed);
        self.latency_micros_total.fetch_add(micros, Ordering::Relaxed);
        self.latency_micros_min.fetch_min(micros, Ordering::Relaxed);
        self.latency_micros_max.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let cycles = self.echo_cycles.load(Ordering::Relaxed);
        let min = self.latency_micros_min.load(Ordering::Relaxed);
        let max = self.latency_micros_max.load(Ordering::Relaxed);
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed_ok: self.connections_closed_ok.load(Ordering::Relaxed),
            connections_closed_error: self.connections_closed_error.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            echo_cycles: cycles,
            latency_total: Duration::from_micros(self.latency_micros_total.load(Ordering::Relaxed)),
            latency_min: (min != u64::MAX).then(|| Duration::from_micros(min)),
            latency_max: (cycles > 0).then(|| Duration::from_micros(max)),
        }
    }
}
