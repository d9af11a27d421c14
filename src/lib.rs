//! lockwire — cooperative release negotiation for cross-process cache locks.
//!
//! Multiple independent processes share one on-disk, advisory-locked cache
//! file. Opening and closing the underlying file lock is expensive, so the
//! process holding it (the *owner*) keeps it open for as long as nobody else
//! wants it. lockwire is the side channel that makes that safe without
//! busy-polling the filesystem: a process that fails to acquire the lock
//! (a *requester*) discovers the owner's port from the lock's metadata and
//! sends a small control message asking it to release the lock soon; the
//! owner runs an application-supplied release action and broadcasts a
//! "lock released" hint back, so the requester retries immediately instead
//! of sleeping out a polling interval.
//!
//! The channel is strictly local (trusted-localhost assumption — no
//! authentication or encryption), carries 10-byte fixed frames, and is
//! best-effort end to end: lost or refused messages only cost latency,
//! because the requester keeps retrying the file lock itself on its own
//! schedule.
//!
//! # Architecture Overview
//!
//! - [`protocol`] — the wire codec: version byte, big-endian `i64` lock id,
//!   message type ordinal. Strict on version, tolerant on length and
//!   unknown ordinals.
//! - [`transport`] — two interchangeable local-socket transports behind one
//!   closed enum: connectionless UDP (the default) and
//!   connection-per-message TCP. Both report their bound ephemeral port and
//!   distinguish graceful stop from I/O failure.
//! - [`handler`] — the [`ContentionHandler`] coordinator: per-lock release
//!   actions and requester bookkeeping behind one mutex, a single listener
//!   task, and a worker pool that keeps release actions off the listener.
//! - [`address`], [`exec`], [`config`] — the collaborator seams: local
//!   address enumeration, named task spawning, and serde-derived tunables.
//!
//! # Typical Integration
//!
//! The component that owns the actual file lock drives the handler:
//!
//! ```rust,no_run
//! use lockwire::{ContentionHandler, HandlerConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::Notify;
//!
//! # async fn example() -> lockwire::Result<()> {
//! let handler = ContentionHandler::new(HandlerConfig::default());
//!
//! // At startup, before taking any lock: reserve the port and publish it
//! // in the lock file's metadata region.
//! let port = handler.reserve_port().await?;
//!
//! // Owner role: took the lock, register what "release it soon" means.
//! handler.start(42, |signal| async move {
//!     // ... close the cache, drop the file lock ...
//!     signal.lock_released().await;
//! })?;
//!
//! // Requester role: another process holds a lock we want. Its port and
//! // lock id come out of the information region of its lock file.
//! let (owner_port, owner_lock_id) = (port, 7); // stand-ins for the example
//! let released = Arc::new(Notify::new());
//! let pinged = handler
//!     .maybe_ping_owner(owner_port, owner_lock_id, "build cache", Duration::ZERO, released.clone())
//!     .await?;
//! if pinged {
//!     // Race the next file-lock retry against the release hint.
//!     let _ = tokio::time::timeout(Duration::from_secs(1), released.notified()).await;
//! }
//!
//! // Owner role, once done with the protected resource for good:
//! handler.stop(42);
//!
//! // Process shutdown:
//! handler.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! What lockwire deliberately does **not** do: implement the advisory file
//! lock or its on-disk format, decide when a requester should retry the
//! lock (the caller's backoff loop owns clock and policy, feeding
//! `elapsed` into [`ContentionHandler::maybe_ping_owner`]), or order
//! concurrent requesters — first-come delivery is best-effort.

pub mod address;
pub mod config;
pub mod constants;
pub mod core;
pub mod exec;
pub mod handler;
pub mod protocol;
pub mod transport;

pub use crate::core::{LockwireError, Result};
pub use address::{AddressProvider, LoopbackAddresses};
pub use config::{HandlerConfig, TransportKind};
pub use handler::{ContentionHandler, ContentionSignal, ReleaseAction, ReleaseSignal};
pub use protocol::{LockPacket, PacketType, ProtocolError};
pub use transport::{Transport, TransportError};
