//! Port reservation and shutdown behavior.

use crate::common;
use anyhow::Result;
use lockwire::protocol::{self, PacketType};
use lockwire::{ContentionHandler, HandlerConfig, LockwireError};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Shutting down while the listener is parked in a receive must complete in
/// bounded time, quietly, and stay idempotent.
#[tokio::test]
async fn shutdown_unblocks_the_parked_listener() -> Result<()> {
    common::init_tracing();
    let handler = ContentionHandler::new(HandlerConfig::default());
    handler.reserve_port().await?;
    handler.start(21, |signal| async move {
        signal.lock_released().await;
    })?;

    // Give the listener time to park in its blocking receive.
    tokio::time::sleep(Duration::from_millis(100)).await;

    timeout(WAIT, handler.shutdown()).await?;
    timeout(WAIT, handler.shutdown()).await?; // second call is a no-op
    Ok(())
}

/// Shutdown waits for a release action that is already in flight.
#[tokio::test]
async fn shutdown_waits_for_inflight_release_actions() -> Result<()> {
    common::init_tracing();
    let owner = ContentionHandler::new(HandlerConfig::default());
    let owner_port = owner.reserve_port().await?;

    let finished = Arc::new(Notify::new());
    let done = finished.clone();
    owner.start(8, move |signal| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        signal.lock_released().await;
        done.notify_one();
    })?;

    let requester = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let request = protocol::encode(8, PacketType::UnlockRequest);
    requester.send_to(&request, (Ipv4Addr::LOCALHOST, owner_port)).await?;

    // Wait for the acknowledgment so the action is definitely submitted.
    let mut buffer = [0u8; 64];
    timeout(WAIT, requester.recv_from(&mut buffer)).await??;

    timeout(WAIT, owner.shutdown()).await?;
    // The action ran to completion despite the shutdown racing it.
    timeout(WAIT, finished.notified()).await?;
    Ok(())
}

/// The explicit broadcast entry point the external lock implementation
/// calls once the file lock is actually released.
#[tokio::test]
async fn confirm_lock_release_reaches_the_given_addresses() -> Result<()> {
    common::init_tracing();
    let owner = ContentionHandler::new(HandlerConfig::default());
    owner.reserve_port().await?;

    let waiter = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let waiter_addr = waiter.local_addr()?;

    owner.confirm_lock_release([waiter_addr], 77).await;

    let mut buffer = [0u8; 64];
    let (len, _) = timeout(WAIT, waiter.recv_from(&mut buffer)).await??;
    let packet = protocol::decode(&buffer[..len]).unwrap();
    assert_eq!(packet.lock_id, 77);
    assert_eq!(packet.packet_type, PacketType::LockReleaseConfirmation);

    // Unreachable addresses are logged and skipped, never an error.
    owner
        .confirm_lock_release([SocketAddr::from((Ipv4Addr::LOCALHOST, 1)), waiter_addr], 78)
        .await;
    let (len, _) = timeout(WAIT, waiter.recv_from(&mut buffer)).await??;
    assert_eq!(protocol::decode(&buffer[..len]).unwrap().lock_id, 78);

    owner.shutdown().await;
    Ok(())
}

/// Role flip while waiting: registering as owner for an id the process was
/// just pinging about clears the suppression state.
#[tokio::test]
async fn confirmed_suppression_resets_on_reregistration() -> Result<()> {
    common::init_tracing();
    let owner = ContentionHandler::new(HandlerConfig::default());
    let requester = ContentionHandler::new(HandlerConfig::default());
    let owner_port = owner.reserve_port().await?;
    requester.reserve_port().await?;

    owner.start(55, |signal| async move {
        signal.lock_released().await;
    })?;

    let signal = Arc::new(Notify::new());
    assert!(
        requester
            .maybe_ping_owner(owner_port, 55, "cache", Duration::ZERO, signal.clone())
            .await?
    );
    timeout(WAIT, signal.notified()).await?;
    assert!(
        !requester
            .maybe_ping_owner(owner_port, 55, "cache", Duration::from_secs(10), signal.clone())
            .await?,
        "suppressed while confirmation stands"
    );

    // The former requester wins the lock and registers as owner, then lets
    // it go again: suppression must not leak into the next wait.
    requester.start(55, |signal| async move {
        signal.lock_released().await;
    })?;
    requester.stop(55);

    assert!(
        requester
            .maybe_ping_owner(owner_port, 55, "cache", Duration::ZERO, signal.clone())
            .await?,
        "fresh episode pings again"
    );

    owner.stop(55);
    owner.shutdown().await;
    requester.shutdown().await;
    Ok(())
}

/// After shutdown the handler fails fast instead of touching the network.
#[tokio::test]
async fn stopped_handler_fails_fast() -> Result<()> {
    common::init_tracing();
    let handler = ContentionHandler::new(HandlerConfig::default());
    handler.reserve_port().await?;
    handler.shutdown().await;

    assert!(matches!(handler.reserve_port().await, Err(LockwireError::Stopped)));
    let signal = Arc::new(Notify::new());
    assert!(matches!(
        handler.maybe_ping_owner(1, 1, "cache", Duration::ZERO, signal).await,
        Err(LockwireError::Stopped)
    ));
    Ok(())
}
