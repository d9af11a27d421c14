//! The same negotiation over the connection-oriented transport.
//!
//! Stream-transport confirmations are addressed to the source of the
//! inbound connection — an ephemeral client port — so they are typically
//! refused and swallowed as "peer gone". What must still hold: pings are
//! delivered, the release action runs exactly once per episode, and
//! nothing errors along the way.

use crate::common;
use anyhow::Result;
use lockwire::{ContentionHandler, HandlerConfig, TransportKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn stream_config() -> HandlerConfig {
    HandlerConfig {
        transport: TransportKind::Stream,
        ..HandlerConfig::default()
    }
}

#[tokio::test]
async fn stream_transport_delivers_pings_and_runs_the_action_once() -> Result<()> {
    common::init_tracing();
    let owner = ContentionHandler::new(stream_config());
    let requester = ContentionHandler::new(stream_config());
    let owner_port = owner.reserve_port().await?;
    requester.reserve_port().await?;

    let invocations = Arc::new(AtomicUsize::new(0));
    let action_ran = Arc::new(Notify::new());
    let seen = invocations.clone();
    let ran = action_ran.clone();
    owner.start(13, move |signal| async move {
        seen.fetch_add(1, Ordering::SeqCst);
        signal.lock_released().await;
        ran.notify_one();
    })?;

    let signal = Arc::new(Notify::new());
    let pinged = requester
        .maybe_ping_owner(owner_port, 13, "stream cache", Duration::ZERO, signal.clone())
        .await?;
    assert!(pinged);
    timeout(WAIT, action_ran.notified()).await?;

    // No confirmation can reach a stream requester's ephemeral port, so the
    // rate limit is all that suppresses re-pings; past the delay the ping
    // goes out again and the still-running episode absorbs it.
    let past_delay = requester
        .maybe_ping_owner(owner_port, 13, "stream cache", Duration::from_secs(10), signal.clone())
        .await?;
    assert!(past_delay);

    // Give the duplicate time to be processed, then verify single execution.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    owner.stop(13);
    owner.shutdown().await;
    requester.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stream_ping_to_a_dead_owner_reports_nothing_sent() -> Result<()> {
    common::init_tracing();
    let requester = ContentionHandler::new(stream_config());

    // Bind and immediately shut down an owner to get a dead port.
    let dead_owner = ContentionHandler::new(stream_config());
    let dead_port = dead_owner.reserve_port().await?;
    dead_owner.shutdown().await;

    let signal = Arc::new(Notify::new());
    let pinged = requester
        .maybe_ping_owner(dead_port, 5, "stale cache", Duration::ZERO, signal)
        .await?;
    assert!(!pinged, "connect refusal is a soft skip, not a delivery");

    requester.shutdown().await;
    Ok(())
}
