//! Local address enumeration for the contention side channel.
//!
//! The side channel is strictly process-to-process on one machine, but "the
//! local machine" can answer to more than one address (IPv4/IPv6 loopback,
//! multi-stack hosts). The handler fans every outbound message out to all
//! candidate addresses and lets the transport's soft-failure allow-list
//! swallow the ones that turn out to be unusable on this host.
//!
//! [`LoopbackAddresses`] is the default and covers the common case; callers
//! on exotic stacks inject their own [`AddressProvider`].

use std::net::{IpAddr, Ipv4Addr};

/// Source of local addresses for binding and for fan-out sends.
pub trait AddressProvider: Send + Sync + 'static {
    /// The address the transport socket binds to.
    fn binding_address(&self) -> IpAddr;

    /// Candidate addresses a peer's reserved port may be reachable at.
    ///
    /// Sends fan out to every returned address; at least one must be usable
    /// for a ping to count as delivered.
    fn communication_addresses(&self) -> Vec<IpAddr>;
}

/// IPv4 loopback for everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackAddresses;

impl AddressProvider for LoopbackAddresses {
    fn binding_address(&self) -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    fn communication_addresses(&self) -> Vec<IpAddr> {
        vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]
    }
}
