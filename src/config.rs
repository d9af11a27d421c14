//! Configuration for the contention handler.
//!
//! Callers embed [`HandlerConfig`] in whatever configuration surface owns the
//! surrounding cache (the derives make it a plain serde value); everything has
//! a working default, so `HandlerConfig::default()` is the common case: the
//! datagram transport with the stock protocol timings from
//! [`crate::constants`].

use crate::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_PING_DELAY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which side-channel transport the handler binds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Connectionless UDP socket. Lowest overhead, the default.
    #[default]
    Datagram,
    /// Connection-oriented TCP, one short-lived connection per message. For
    /// environments where local UDP delivery is unreliable or filtered.
    Stream,
}

/// Tunables for a [`ContentionHandler`](crate::handler::ContentionHandler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HandlerConfig {
    /// Transport flavor, fixed at construction time.
    pub transport: TransportKind,

    /// Minimum time between two unlock pings to the same owner port.
    #[serde(with = "millis")]
    pub ping_delay: Duration,

    /// Connect timeout for one outbound stream-transport message. Ignored by
    /// the datagram transport.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            ping_delay: DEFAULT_PING_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Durations serialized as integer milliseconds (`ping-delay = 1000`).
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
