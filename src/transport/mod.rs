//! Side-channel transports for contention messages.
//!
//! Two transports implement one contract behind the closed [`Transport`]
//! enum, selected at construction time via
//! [`TransportKind`](crate::config::TransportKind):
//!
//! - [`DatagramTransport`] — one UDP socket, fire-and-forget sends. Lowest
//!   overhead, the default.
//! - [`StreamTransport`] — a TCP listener with an accept backlog of 1;
//!   every outbound message is its own short-lived connection.
//!
//! The contract, shared by both:
//!
//! - `port()` reports the bound ephemeral port so the surrounding lock
//!   implementation can publish it in the lock's metadata; it reports `None`
//!   once the transport is stopped.
//! - `send()` is best-effort delivery to one peer address. Failures on the
//!   soft allow-list (see [`is_soft_send_error`]) mean "this local address is
//!   not usable" or "the peer process is gone" — they are logged at debug
//!   level and reported as `Ok(false)` so a fan-out caller can continue with
//!   the remaining addresses. Anything else is a hard error.
//! - `receive_one()` blocks for one message. After `stop()` it resolves with
//!   the distinguished [`TransportError::Stopped`], including for a task
//!   already parked in the receive, so the listener loop can exit cleanly
//!   instead of logging a spurious I/O failure during shutdown.
//! - `stop()` is synchronous and idempotent.

mod datagram;
mod stream;

pub use datagram::DatagramTransport;
pub use stream::StreamTransport;

use crate::config::{HandlerConfig, TransportKind};
use std::io;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Errors surfaced by the transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was stopped. Not a failure: this is the graceful-stop
    /// condition a blocked receive resolves with during shutdown.
    #[error("transport has been stopped")]
    Stopped,

    /// A socket operation failed with an error outside the soft allow-list.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether this is the graceful-stop condition rather than a failure.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Errors expected when fanning a send out across candidate local addresses.
///
/// A host with several candidate loopback/local addresses usually has some
/// that are not actually usable; the OS rejects those with one of these
/// kinds. The fan-out treats them as "skip this address", not as failures.
pub(crate) fn is_soft_send_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::AddrNotAvailable
    )
}

/// A bound side-channel endpoint: either transport flavor behind one API.
#[derive(Debug)]
pub enum Transport {
    /// Connectionless UDP transport.
    Datagram(DatagramTransport),
    /// Connection-per-message TCP transport.
    Stream(StreamTransport),
}

impl Transport {
    /// Binds a new endpoint of the configured flavor on an ephemeral port.
    pub async fn bind(config: &HandlerConfig, address: IpAddr) -> Result<Self, TransportError> {
        match config.transport {
            TransportKind::Datagram => {
                Ok(Self::Datagram(DatagramTransport::bind(address).await?))
            }
            TransportKind::Stream => Ok(Self::Stream(
                StreamTransport::bind(address, config.connect_timeout).await?,
            )),
        }
    }

    /// The bound ephemeral port, or `None` once stopped.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Datagram(transport) => transport.port(),
            Self::Stream(transport) => transport.port(),
        }
    }

    /// Sends one message to `peer`. `Ok(false)` means the send was skipped
    /// on a soft failure; see the module docs for the contract.
    pub async fn send(&self, peer: SocketAddr, payload: &[u8]) -> Result<bool, TransportError> {
        match self {
            Self::Datagram(transport) => transport.send(peer, payload).await,
            Self::Stream(transport) => transport.send(peer, payload).await,
        }
    }

    /// Receives one message, blocking until one arrives or the transport is
    /// stopped.
    pub async fn receive_one(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        match self {
            Self::Datagram(transport) => transport.receive_one().await,
            Self::Stream(transport) => transport.receive_one().await,
        }
    }

    /// Stops the endpoint and wakes any blocked receiver. Idempotent.
    pub fn stop(&self) {
        match self {
            Self::Datagram(transport) => transport.stop(),
            Self::Stream(transport) => transport.stop(),
        }
    }
}
