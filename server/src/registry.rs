//! Connection lifecycle tracking and coordinated shutdown for the echo server
//!
//! This module owns the process-wide view of live connections:
//! - Session registration with a shutdown gate (new connections are turned
//!   away once a drain has begun)
//! - Idempotent deregistration, safe against the session-exit path and the
//!   drain path racing each other
//! - The drain protocol itself: signal every live session to close, then
//!   wait until each one has deregistered
//!
//! The registry never performs I/O on a connection. Each session task is
//! the exclusive reader/writer of its socket; the registry only tracks
//! membership and delivers the forced-close signal.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::sync::{oneshot, Notify};

/// Unique identifier assigned to each registered session.
pub type SessionId = u64;

/// Handed to a session on successful registration. The session keeps the
/// receiver selected against its reads and writes; the registry fires the
/// matching sender during a drain.
#[derive(Debug)]
pub struct Registration {
    pub id: SessionId,
    pub forced_close: oneshot::Receiver<()>,
}

/// One live connection as the registry sees it: where it came from and how
/// to tell it to shut down.
#[derive(Debug)]
struct LiveConnection {
    addr: SocketAddr,
    /// Taken (not removed) when the drain fires, so the entry stays in the
    /// set until the session deregisters itself.
    close_tx: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    active: HashMap<SessionId, LiveConnection>,
    next_id: SessionId,
    shutting_down: bool,
}

/// Tracks every live session and coordinates the shutdown drain.
///
/// Constructed explicitly and shared as `Arc<ConnectionRegistry>` between
/// the supervisor and all session tasks. All state lives behind one mutex;
/// critical sections never await, so a std mutex is sufficient.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    /// Signalled by `remove` when the active set empties during shutdown.
    /// All registered waiters are woken, so the drain barrier holds even
    /// with concurrent `close_all` callers.
    drained: Notify,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to register a new connection.
    ///
    /// Returns `None` once shutdown has begun; the caller is expected to
    /// drop the socket immediately without entering the echo loop. On
    /// success the connection is a member of the active set until the
    /// session calls [`remove`](Self::remove).
    pub fn register(&self, addr: SocketAddr) -> Option<Registration> {
        let mut state = self.state.lock().unwrap();
        if state.shutting_down {
            warn!("Rejecting connection from {}: shutdown in progress", addr);
            return None;
        }

        let id = state.next_id;
        state.next_id += 1;

        let (close_tx, forced_close) = oneshot::channel();
        state.active.insert(
            id,
            LiveConnection {
                addr,
                close_tx: Some(close_tx),
            },
        );
        info!(
            "Connection from {} registered as session {} ({} active)",
            addr,
            id,
            state.active.len()
        );

        Some(Registration { id, forced_close })
    }

    /// Deregisters a session. Idempotent: removing an id that was never
    /// registered, or was already removed, is a no-op. This is what lets
    /// the session-exit path and the shutdown drain race safely.
    pub fn remove(&self, id: SessionId) {
        let mut state = self.state.lock().unwrap();
        if state.active.remove(&id).is_some() {
            info!(
                "Session {} deregistered ({} active)",
                id,
                state.active.len()
            );
            if state.shutting_down && state.active.is_empty() {
                self.drained.notify_waiters();
            }
        }
    }

    /// Drains every live connection and waits for the set to empty.
    ///
    /// Flips the shutdown flag first (a one-way transition), so no new
    /// registration can slip in behind the drain. Every session registered
    /// before the call receives its forced-close signal; a session that
    /// already exited on its own is counted as done rather than retried.
    /// Returns only once every such session has deregistered.
    pub async fn close_all(&self) {
        let signals: Vec<(SessionId, SocketAddr, oneshot::Sender<()>)> = {
            let mut state = self.state.lock().unwrap();
            state.shutting_down = true;
            info!("Draining {} active connection(s)", state.active.len());
            state
                .active
                .iter_mut()
                .filter_map(|(id, conn)| {
                    conn.close_tx.take().map(|tx| (*id, conn.addr, tx))
                })
                .collect()
        };

        let mut already_gone = 0usize;
        for (id, addr, close_tx) in signals {
            if close_tx.send(()).is_err() {
                // The session dropped its receiver on its way out; its
                // remove call is imminent or already happened.
                debug!("Session {} ({}) was already closing", id, addr);
                already_gone += 1;
            }
        }
        if already_gone > 0 {
            debug!("{} session(s) closed before the drain reached them", already_gone);
        }

        loop {
            // The waiter must be enabled before the emptiness check, or a
            // remove landing in between would be missed and this caller
            // would sleep past the set emptying.
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.state.lock().unwrap().active.is_empty() {
                break;
            }
            drained.await;
        }
        info!("All connections closed");
    }

    /// True once a drain has begun. Never reverts.
    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().unwrap().shutting_down
    }

    /// Number of currently registered sessions.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().active.len()
    }

    /// Returns true if no sessions are currently registered.
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().active.is_empty()
    }
}
