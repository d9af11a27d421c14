//! Integration test suite for lockwire.
//!
//! These tests exercise whole handlers against each other over real local
//! sockets: owner and requester negotiation, duplicate-ping handling, the
//! stream-transport flow, and shutdown behavior. Everything that needs to
//! wait does so under a generous `tokio::time::timeout` so a regression
//! hangs the assertion, not the suite.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! Tests are organized by functionality area:
//! - **negotiation**: the owner/requester contention flow end to end
//! - **stream_channel**: the connection-oriented transport variant
//! - **lifecycle**: port reservation, shutdown safety, release broadcasts

mod common;
mod lifecycle;
mod stream_channel;
