//! Error handling for lockwire.
//!
//! The crate exposes one enumerated error type per layer and one top-level
//! type tying them together:
//! - [`crate::protocol::ProtocolError`] — malformed or incompatible frames
//! - [`crate::transport::TransportError`] — socket failures, plus the
//!   distinguished graceful-stop condition
//! - [`LockwireError`] — handler-level failures and wrappers for the above
//!
//! Contract violations (registering two release actions for one lock id,
//! registering before reserving a port, operating a stopped handler) fail
//! fast with their own variants; environmental failures arrive wrapped so
//! callers can still match on the underlying layer.

use crate::protocol::ProtocolError;
use crate::transport::TransportError;
use thiserror::Error;

/// The main error type for contention-handler operations.
#[derive(Error, Debug)]
pub enum LockwireError {
    /// The handler was globally stopped; all further operations fail fast.
    #[error("contention handler has been stopped")]
    Stopped,

    /// An operation that needs the side channel ran before [`reserve_port`].
    ///
    /// [`reserve_port`]: crate::handler::ContentionHandler::reserve_port
    #[error("no port reserved: call reserve_port() before registering contention actions")]
    PortNotReserved,

    /// A release action is already registered for this lock id.
    ///
    /// One contention episode per lock id at a time is a hard API contract;
    /// hitting this is a programming error in the caller, not an
    /// environmental failure.
    #[error("lock {0} already has a registered release action")]
    AlreadyContended(i64),

    /// A frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The side channel failed with a non-recoverable I/O error.
    #[error("lock communication failed: {0}")]
    Transport(#[from] TransportError),
}
