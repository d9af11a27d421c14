//! Global constants used throughout the lockwire codebase.
//!
//! Timing parameters for the contention protocol live here so the magic
//! numbers stay discoverable and the configuration defaults have a single
//! source of truth. Wire-format constants live next to the codec in
//! [`crate::protocol`].

use std::time::Duration;

/// Minimum time between two unlock pings to the same owner port (1 second).
///
/// A requester that already pinged an owner gives the first ping this long to
/// be answered before pinging again. Keeps a crowd of waiting processes from
/// flooding the owner while its release action runs.
pub const DEFAULT_PING_DELAY: Duration = Duration::from_millis(1000);

/// Connect timeout for one outbound stream-transport message (250 ms).
///
/// Contention messages are tiny and local; a peer that cannot accept a
/// connection this fast is treated as gone rather than waited on.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Receive buffer size for one inbound contention message.
///
/// Frames are 10 bytes; the headroom only exists so oversized frames from
/// newer senders are drained and ignored instead of truncated mid-read.
pub const RECEIVE_BUFFER_LEN: usize = 64;
