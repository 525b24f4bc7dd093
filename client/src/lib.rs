//! # Echo Load Client Library
//!
//! Load-generation harness for the echo server. It opens a configurable
//! number of concurrent connections, sends each one a batch of messages,
//! verifies every echoed response, and aggregates round-trip latency into
//! a single run report (success rate, mean/min/max latency).
//!
//! The client is a consumer of the server's wire protocol, not part of its
//! core: it exercises the connection lifecycle under load and reports what
//! it observed. Failures are always contained per connection, so a refused
//! or dropped client shows up in the counters instead of aborting the run.
//!
//! ## Module Organization
//!
//! - [`network`]: connection tasks, response verification, latency
//!   measurement, and report aggregation

pub mod network;
