//! The contention coordinator: owner and requester sides of lock
//! negotiation.
//!
//! One [`ContentionHandler`] per process coordinates every contended lock id.
//! It is an explicitly constructed object with an explicit lifecycle —
//! [`reserve_port`](ContentionHandler::reserve_port), then any number of
//! [`start`](ContentionHandler::start) /
//! [`stop`](ContentionHandler::stop) /
//! [`maybe_ping_owner`](ContentionHandler::maybe_ping_owner) calls, then
//! [`shutdown`](ContentionHandler::shutdown) — injected into whichever
//! component owns the actual file lock, never a process-wide singleton.
//!
//! # Owner role
//!
//! A process that takes the file lock registers a single-shot release action
//! per lock id. The first `UNLOCK_REQUEST` for that id marks the action
//! running and submits it to the worker pool; every request, duplicate or
//! not, is acknowledged with an `UNLOCK_REQUEST_CONFIRMATION`. The action
//! receives a [`ContentionSignal`] and triggers it once the file lock has
//! actually been released, which broadcasts a `LOCK_RELEASE_CONFIRMATION`
//! to every requester that pinged.
//!
//! # Requester role
//!
//! A process that failed to take the file lock reads the owner's port from
//! the lock metadata and calls `maybe_ping_owner`. The handler decides
//! whether a ping is due (not yet confirmed, not inside the ping-delay
//! window) and fans the `UNLOCK_REQUEST` out across the candidate local
//! addresses. Confirmations arriving back are recorded so the caller's
//! retry loop stops pinging, and the caller's [`ReleaseSignal`] is triggered
//! when the owner announces the actual release.
//!
//! # Concurrency
//!
//! All bookkeeping lives behind one mutex with short, await-free critical
//! sections; network I/O and user callbacks always happen with the mutex
//! released. The listener task never runs a release action inline — actions
//! go to the worker pool so the listener can keep acknowledging duplicate
//! pings while a release is in flight.

use crate::address::{AddressProvider, LoopbackAddresses};
use crate::config::HandlerConfig;
use crate::core::{LockwireError, Result};
use crate::exec::{TaskPool, spawn_long_running};
use crate::protocol::{self, PacketType};
use crate::transport::{Transport, TransportError};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A boxed single-shot release action, as stored by the handler.
///
/// [`ContentionHandler::start`] accepts any suitable closure and boxes it
/// into this form.
pub type ReleaseAction =
    Box<dyn FnOnce(ContentionSignal) -> BoxFuture<'static, ()> + Send + 'static>;

/// Requester-side wake hook, triggered when the owner announces that the
/// lock has actually been released.
///
/// Implemented for [`tokio::sync::Notify`], so a caller's backoff loop can
/// hold an `Arc<Notify>`, pass it to
/// [`maybe_ping_owner`](ContentionHandler::maybe_ping_owner), and race its
/// retry sleep against `notified()`.
pub trait ReleaseSignal: Send + Sync + 'static {
    /// Wake whoever is waiting to retry the file lock.
    fn trigger(&self);
}

impl ReleaseSignal for tokio::sync::Notify {
    fn trigger(&self) {
        // notify_one stores a permit, so a hint that lands between two polls
        // of the caller's retry loop is kept, not lost.
        self.notify_one();
    }
}

/// Owner-side record for one contended lock id.
struct ContendedAction {
    /// Taken (and thus run) at most once per registration episode.
    action: Option<ReleaseAction>,
    running: bool,
    /// Everyone who pinged; the release broadcast goes to all of them.
    requesters: HashSet<SocketAddr>,
}

/// All mutable bookkeeping, behind the one handler mutex.
#[derive(Default)]
struct State {
    stopped: bool,
    transport: Option<Arc<Transport>>,
    listener: Option<JoinHandle<()>>,
    workers: Option<Arc<TaskPool>>,
    actions: HashMap<i64, ContendedAction>,
    /// Requester side: owner port we last pinged, per lock id.
    requested_from: HashMap<i64, u16>,
    /// Requester side: owner port that last acknowledged us, per lock id.
    confirmed_from: HashMap<i64, u16>,
    /// Requester side: wake hooks registered by successful pings.
    release_signals: HashMap<i64, Arc<dyn ReleaseSignal>>,
}

struct Shared {
    config: HandlerConfig,
    addresses: Arc<dyn AddressProvider>,
    state: Mutex<State>,
}

/// Coordinates contention for every lock id of one process.
///
/// See the [module docs](self) for the roles and lifecycle.
pub struct ContentionHandler {
    shared: Arc<Shared>,
}

impl ContentionHandler {
    /// Creates a handler with the default loopback address provider.
    pub fn new(config: HandlerConfig) -> Self {
        Self::with_address_provider(config, Arc::new(LoopbackAddresses))
    }

    /// Creates a handler with a custom [`AddressProvider`].
    pub fn with_address_provider(
        config: HandlerConfig,
        addresses: Arc<dyn AddressProvider>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                addresses,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Reserves the side-channel port, binding the transport on first call.
    ///
    /// The returned port is what the surrounding lock implementation
    /// publishes in the lock's metadata so peers can find this process. Call
    /// it before any lock that uses this mechanism is taken; subsequent
    /// calls return the same port.
    ///
    /// # Errors
    ///
    /// [`LockwireError::Stopped`] after [`shutdown`](Self::shutdown);
    /// [`LockwireError::Transport`] if the socket cannot be bound.
    pub async fn reserve_port(&self) -> Result<u16> {
        let transport = self.shared.ensure_transport().await?;
        transport.port().ok_or(LockwireError::Stopped)
    }

    /// Registers the release action for `lock_id` and starts listening.
    ///
    /// The first registration spawns the shared listener task and the shared
    /// release-action worker pool. Any requester-side bookkeeping for this
    /// id is cleared first: the process may have been waiting for this very
    /// lock a moment ago, and stale ping state must not suppress future
    /// pings once the roles flip again.
    ///
    /// The action runs at most once per registration; it receives a
    /// [`ContentionSignal`] to trigger once the file lock is actually
    /// released. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`LockwireError::Stopped`] after shutdown,
    /// [`LockwireError::PortNotReserved`] if [`reserve_port`](Self::reserve_port)
    /// was never called, and [`LockwireError::AlreadyContended`] if an
    /// action for this id is still registered — that one is a caller bug.
    pub fn start<F, Fut>(&self, lock_id: i64, action: F) -> Result<()>
    where
        F: FnOnce(ContentionSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.start_boxed(
            lock_id,
            Box::new(move |signal| {
                let future: BoxFuture<'static, ()> = Box::pin(action(signal));
                future
            }),
        )
    }

    /// Non-generic form of [`start`](Self::start) for pre-boxed actions.
    pub fn start_boxed(&self, lock_id: i64, action: ReleaseAction) -> Result<()> {
        let mut state = self.shared.lock_state();
        state.requested_from.remove(&lock_id);
        state.confirmed_from.remove(&lock_id);
        state.release_signals.remove(&lock_id);
        if state.stopped {
            return Err(LockwireError::Stopped);
        }
        let Some(transport) = state.transport.clone() else {
            return Err(LockwireError::PortNotReserved);
        };
        if state.actions.contains_key(&lock_id) {
            return Err(LockwireError::AlreadyContended(lock_id));
        }
        Shared::ensure_listener(&self.shared, &mut state, transport);
        if state.workers.is_none() {
            state.workers = Some(Arc::new(TaskPool::new("lock release actions")));
        }
        state.actions.insert(
            lock_id,
            ContendedAction {
                action: Some(action),
                running: false,
                requesters: HashSet::new(),
            },
        );
        tracing::debug!("listening for contention on lock {lock_id}");
        Ok(())
    }

    /// Stops listening for contention on `lock_id`.
    ///
    /// Future pings for the id get no reply and run no action. A later
    /// [`start`](Self::start) for the same id begins a fresh episode.
    /// No-op for unknown ids; never fails.
    pub fn stop(&self, lock_id: i64) {
        let mut state = self.shared.lock_state();
        if state.actions.remove(&lock_id).is_some() {
            tracing::debug!("stopped listening for contention on lock {lock_id}");
        }
    }

    /// Decides whether to ping the owner at `port` about `lock_id`, and
    /// pings if due. Returns whether a ping was actually sent.
    ///
    /// No ping is sent when that owner already acknowledged us (keep
    /// retrying the file lock instead), or when our previous ping to that
    /// owner is younger than the configured ping delay (give it time to be
    /// answered). Otherwise the request fans out to every candidate local
    /// address; one delivered send counts as success.
    ///
    /// `display_name` only decorates log output. `elapsed` is the time since
    /// the caller first started trying to acquire this lock — the caller's
    /// backoff loop owns that clock. `signal` is triggered when the owner
    /// broadcasts that the lock has actually been released.
    ///
    /// # Errors
    ///
    /// [`LockwireError::Stopped`] after shutdown;
    /// [`LockwireError::Transport`] for send failures outside the soft
    /// allow-list.
    pub async fn maybe_ping_owner(
        &self,
        port: u16,
        lock_id: i64,
        display_name: &str,
        elapsed: Duration,
        signal: Arc<dyn ReleaseSignal>,
    ) -> Result<bool> {
        let transport = self.shared.ensure_transport().await?;
        {
            let state = self.shared.lock_state();
            if state.stopped {
                return Err(LockwireError::Stopped);
            }
            if state.confirmed_from.get(&lock_id) == Some(&port) {
                return Ok(false);
            }
            if state.requested_from.get(&lock_id) == Some(&port)
                && elapsed < self.shared.config.ping_delay
            {
                return Ok(false);
            }
        }

        let frame = protocol::encode(lock_id, PacketType::UnlockRequest);
        let mut delivered = false;
        for address in self.shared.addresses.communication_addresses() {
            let peer = SocketAddr::new(address, port);
            if transport.send(peer, &frame).await? {
                delivered = true;
            }
        }

        if delivered {
            tracing::debug!("pinged owner of {display_name} (lock {lock_id}) at port {port}");
            let mut state = self.shared.lock_state();
            state.requested_from.insert(lock_id, port);
            state.release_signals.insert(lock_id, signal);
            // The confirmation has to land somewhere: a pure requester needs
            // the listener just as much as an owner does.
            Shared::ensure_listener(&self.shared, &mut state, transport);
        }
        Ok(delivered)
    }

    /// Broadcasts a release confirmation for `lock_id` to `addresses`.
    ///
    /// Called by the surrounding lock implementation once the file lock has
    /// actually been released. Strictly best-effort: every per-address
    /// failure is logged and the broadcast continues; never fails.
    pub async fn confirm_lock_release(
        &self,
        addresses: impl IntoIterator<Item = SocketAddr>,
        lock_id: i64,
    ) {
        let transport = self.shared.lock_state().transport.clone();
        let Some(transport) = transport else {
            tracing::debug!("no channel to confirm release of lock {lock_id} on");
            return;
        };
        Shared::broadcast_release(&transport, addresses, lock_id).await;
    }

    /// Stops everything: marks the handler stopped, clears all bookkeeping,
    /// stops the transport (unblocking the listener), then awaits the
    /// listener task and all in-flight release actions.
    ///
    /// Idempotent and infallible; safe to call concurrently with any other
    /// operation. Afterwards every operation fails fast with
    /// [`LockwireError::Stopped`] or no-ops.
    pub async fn shutdown(&self) {
        let (transport, listener, workers) = {
            let mut state = self.shared.lock_state();
            state.stopped = true;
            state.actions.clear();
            state.requested_from.clear();
            state.confirmed_from.clear();
            state.release_signals.clear();
            (
                // Taken, not cloned: once the listener exits, the last Arc
                // drops and the socket actually closes.
                state.transport.take(),
                state.listener.take(),
                state.workers.take(),
            )
        };
        if let Some(transport) = &transport {
            transport.stop();
        }
        if let Some(listener) = listener {
            if let Err(err) = listener.await {
                if err.is_panic() {
                    tracing::warn!("lock contention listener panicked: {err}");
                }
            }
        }
        if let Some(workers) = workers {
            workers.stop().await;
        }
        tracing::debug!("contention handler shut down");
    }
}

impl Default for ContentionHandler {
    fn default() -> Self {
        Self::new(HandlerConfig::default())
    }
}

impl std::fmt::Debug for ContentionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("ContentionHandler")
            .field("stopped", &state.stopped)
            .field("port", &state.transport.as_ref().and_then(|t| t.port()))
            .field("contended", &state.actions.len())
            .finish_non_exhaustive()
    }
}

/// Handed to a release action; triggers the release broadcast.
///
/// The requester set is read at trigger time, so duplicate pings that
/// arrived while the release action was running are still confirmed.
/// Trigger it *before* the surrounding lock implementation unregisters the
/// lock id — unregistering discards the requester set.
pub struct ContentionSignal {
    shared: Arc<Shared>,
    lock_id: i64,
}

impl ContentionSignal {
    /// Announces that the file lock has actually been released, confirming
    /// to every requester that pinged. Best-effort; never fails.
    pub async fn lock_released(&self) {
        let (transport, requesters) = {
            let state = self.shared.lock_state();
            let requesters: Vec<SocketAddr> = state
                .actions
                .get(&self.lock_id)
                .map(|entry| entry.requesters.iter().copied().collect())
                .unwrap_or_default();
            (state.transport.clone(), requesters)
        };
        let Some(transport) = transport else { return };
        if requesters.is_empty() {
            tracing::debug!("no requesters to confirm release of lock {} to", self.lock_id);
            return;
        }
        Shared::broadcast_release(&transport, requesters, self.lock_id).await;
    }

    /// The lock id this signal belongs to.
    pub fn lock_id(&self) -> i64 {
        self.lock_id
    }
}

impl std::fmt::Debug for ContentionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentionSignal").field("lock_id", &self.lock_id).finish_non_exhaustive()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the transport, binding it on first use.
    async fn ensure_transport(self: &Arc<Self>) -> Result<Arc<Transport>> {
        {
            let state = self.lock_state();
            if state.stopped {
                return Err(LockwireError::Stopped);
            }
            if let Some(transport) = &state.transport {
                return Ok(transport.clone());
            }
        }
        let transport = Arc::new(
            Transport::bind(&self.config, self.addresses.binding_address()).await?,
        );
        let mut state = self.lock_state();
        if state.stopped {
            transport.stop();
            return Err(LockwireError::Stopped);
        }
        // A concurrent caller may have bound first; theirs wins, ours drops.
        Ok(state.transport.get_or_insert(transport).clone())
    }

    /// Spawns the single listener task if it is not running yet.
    fn ensure_listener(shared: &Arc<Self>, state: &mut State, transport: Arc<Transport>) {
        if state.listener.is_none() {
            state.listener = Some(spawn_long_running(
                "lock contention listener",
                Self::listen(shared.clone(), transport),
            ));
        }
    }

    /// The listener loop: one blocking receive at a time until stopped.
    async fn listen(shared: Arc<Self>, transport: Arc<Transport>) {
        tracing::debug!("lock contention listener started");
        loop {
            let (payload, source) = match transport.receive_one().await {
                Ok(message) => message,
                Err(TransportError::Stopped) => break,
                Err(err) => {
                    tracing::error!("receiving lock contention messages failed: {err}");
                    break;
                }
            };
            // One bad frame (hostile sender, future protocol bump) must not
            // take the listener down with it.
            let packet = match protocol::decode(&payload) {
                Ok(packet) => packet,
                Err(err) => {
                    tracing::warn!("ignoring undecodable packet from {source}: {err}");
                    continue;
                }
            };
            Self::process_packet(&shared, &transport, packet.lock_id, packet.packet_type, source)
                .await;
        }
        tracing::debug!("lock contention listener exited");
    }

    /// Routes one decoded packet. Bookkeeping happens under the mutex;
    /// replies, action submission, and signal triggering after it drops.
    async fn process_packet(
        shared: &Arc<Self>,
        transport: &Arc<Transport>,
        lock_id: i64,
        packet_type: PacketType,
        source: SocketAddr,
    ) {
        let mut run_action = None;
        let mut acknowledge = false;
        let mut workers = None;
        let mut wake = None;
        {
            let mut state = shared.lock_state();
            if state.stopped {
                return;
            }
            if let Some(entry) = state.actions.get_mut(&lock_id) {
                // We own this lock: any packet for it is a request, even a
                // typeless one from a legacy sender. Duplicates are harmless
                // and still acknowledged.
                entry.requesters.insert(source);
                if !entry.running {
                    entry.running = true;
                    run_action = entry.action.take();
                }
                acknowledge = true;
                workers = state.workers.clone();
            } else {
                match packet_type {
                    PacketType::UnlockRequestConfirmation => {
                        state.confirmed_from.insert(lock_id, source.port());
                    }
                    PacketType::LockReleaseConfirmation => {
                        state.confirmed_from.insert(lock_id, source.port());
                        wake = state.release_signals.get(&lock_id).cloned();
                    }
                    _ => {
                        tracing::debug!(
                            "ignoring {packet_type:?} from {source} for lock {lock_id} we are not listening on"
                        );
                    }
                }
            }
        }

        if let (Some(action), Some(workers)) = (run_action, workers) {
            tracing::debug!("lock {lock_id} is contended, scheduling its release action");
            let signal = ContentionSignal {
                shared: shared.clone(),
                lock_id,
            };
            workers.submit(action(signal));
        }
        if acknowledge {
            let frame = protocol::encode(lock_id, PacketType::UnlockRequestConfirmation);
            match transport.send(source, &frame).await {
                Ok(true) => {
                    tracing::debug!("confirmed unlock request from {source} for lock {lock_id}");
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::debug!(
                        "failed to confirm unlock request from {source} for lock {lock_id}: {err}"
                    );
                }
            }
        }
        if let Some(signal) = wake {
            tracing::debug!("owner at port {} released lock {lock_id}", source.port());
            signal.trigger();
        }
    }

    /// Best-effort `LOCK_RELEASE_CONFIRMATION` fan-out; log-and-continue on
    /// every failure, soft or hard.
    async fn broadcast_release(
        transport: &Transport,
        addresses: impl IntoIterator<Item = SocketAddr>,
        lock_id: i64,
    ) {
        let frame = protocol::encode(lock_id, PacketType::LockReleaseConfirmation);
        for peer in addresses {
            match transport.send(peer, &frame).await {
                Ok(true) => {
                    tracing::debug!("confirmed release of lock {lock_id} to {peer}");
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::debug!("failed to confirm release of lock {lock_id} to {peer}: {err}");
                }
            }
        }
    }
}
