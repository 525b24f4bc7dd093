//! # Echo Server Library
//!
//! This library implements a concurrent TCP echo service with managed
//! connection lifecycle, per-read idle timeouts, and coordinated graceful
//! shutdown. Every accepted connection runs as its own task; the hard part
//! the library takes care of is tracking that unbounded set of tasks and
//! draining all of them cleanly on termination without leaking sockets or
//! dropping in-flight work.
//!
//! ## Architecture
//!
//! Three pieces cooperate through one shared registry:
//!
//! - The **supervisor** ([`network::EchoServer`]) owns the listening
//!   socket. It accepts connections, spawns a session task per socket, and
//!   on SIGINT/SIGTERM stops accepting and invokes the registry drain.
//! - The **session loop** ([`session::Session`]) owns one connection. It
//!   registers itself, runs the read-echo-write cycle with a bounded read
//!   wait, and deregisters on exit. Every failure mode (timeout, reset,
//!   undecodable payload, write error) is contained within the session.
//! - The **registry** ([`registry::ConnectionRegistry`]) is the only
//!   shared mutable state: the set of live sessions plus a one-way
//!   shutdown flag. Once the flag flips, new connections are rejected at
//!   registration and every live session is signalled to close; the drain
//!   returns only after all of them have deregistered.
//!
//! ## Protocol
//!
//! Newline-delimited text. Each received chunk (at most
//! [`shared::READ_BUFFER_SIZE`] bytes per read) is echoed back as
//! `"ECHO: "` plus the trailing-trimmed text plus a newline. Longer lines
//! simply span multiple echo cycles.
//!
//! ## Module Organization
//!
//! - [`registry`]: connection membership, shutdown gate, drain barrier
//! - [`session`]: per-connection state machine and outcome reporting
//! - [`network`]: listener, accept loop, signal wiring
//! - [`metrics`]: process-wide session counters and latency aggregates

pub mod metrics;
pub mod network;
pub mod registry;
pub mod session;
