//! # Connection Supervisor
//!
//! Owns exactly one live connection at a time and hands it out to callers,
//! masking transient disconnects.
//!
//! ## Link cell
//!
//! The current handle, the connection state and the reconnect lock live
//! together in one `tokio::sync::watch` cell. Acquiring the lock, taking the
//! old handle, publishing the new handle and releasing the lock are each a
//! single write to that cell, so a caller can never observe a half-built
//! connection. Waiters in [`ConnectionSupervisor::get_connection`] are woken
//! by the cell's change notification instead of polling.
//!
//! ## Reconnect cycle
//!
//! ```text
//! Disconnected signal ─→ acquire lock (Ready → Reconnecting)
//!                           │
//!                           ├─ attempts += 1
//!                           ├─ stop event pump, tear down old handle
//!                           ├─ Connecting: endpoint = pool[attempts % width]
//!                           ├─ connect + subscribe events (re-attach normaliser)
//!                           └─ publish handle + Ready + release lock (one write)
//! ```
//!
//! A failed attempt keeps the lock, moves to the next rotation slot and
//! tries again after `retry_delay`. Attempts are not bounded.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{
    ConnectionState, Endpoint, EndpointList, LinkSignal, RawEvent, SupervisorConfig,
    SupervisorError, TransportError,
};
use crate::normalizer::EventNormalizer;
use crate::ports::{Transport, TransportHandle};

/// Result of a reconnect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// A fresh connection is live.
    Completed { attempts: u64, endpoint: Endpoint },
    /// Another reconnect cycle holds the lock; nothing was done.
    AlreadyInProgress,
    /// The loss was reported by a connection that has already been replaced.
    Stale,
    /// The supervisor was shut down.
    Closed,
}

/// What asked for the reconnect.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// Disconnect signal from the connection of the given generation.
    Lost(u64),
    /// Explicit request through the public API.
    Requested,
}

/// Contents of the link cell.
struct Link<H> {
    state: ConnectionState,
    handle: Option<Arc<H>>,
    /// Bumped every time a new connection is published.
    generation: u64,
    /// The reconnect lock.
    reconnecting: bool,
}

impl<H> Link<H> {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            handle: None,
            generation: 0,
            reconnecting: false,
        }
    }

    /// The handle, if it may be given to callers right now.
    fn available(&self) -> Option<Arc<H>> {
        if self.reconnecting || self.state != ConnectionState::Ready {
            return None;
        }
        self.handle.clone()
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal connection state change {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Connection state change");
        self.state = next;
    }
}

/// Background tasks attached to the current connection.
#[derive(Default)]
struct LinkTasks {
    pump: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl LinkTasks {
    fn abort(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

struct Inner<T: Transport> {
    transport: T,
    endpoints: EndpointList,
    config: SupervisorConfig,
    normalizer: Arc<EventNormalizer>,
    link: watch::Sender<Link<T::Handle>>,
    /// Reconnect attempt counter; never reset.
    attempts: AtomicU64,
    tasks: Mutex<LinkTasks>,
    closed: AtomicBool,
}

/// Supervised connection to a pool of chain-RPC endpoints.
///
/// Cloning is cheap; all clones share the same connection.
///
/// # Example
///
/// ```rust,ignore
/// let endpoints = EndpointList::parse(["wss://kusama-rpc.polkadot.io"], 5)?;
/// let supervisor =
///     ConnectionSupervisor::create(WsTransport::default(), endpoints, SupervisorConfig::default())
///         .await?;
///
/// supervisor.normalizer().subscribe(|n: &DomainNotification| println!("{n:?}"));
///
/// let api = supervisor.get_connection().await;
/// let head = api.request("chain_getHeader", serde_json::json!([])).await?;
/// ```
pub struct ConnectionSupervisor<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for ConnectionSupervisor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> ConnectionSupervisor<T> {
    /// Create the supervisor with a fresh normaliser and connect.
    pub async fn create(
        transport: T,
        endpoints: EndpointList,
        config: SupervisorConfig,
    ) -> Result<Self, SupervisorError> {
        Self::create_with_normalizer(transport, endpoints, config, Arc::default()).await
    }

    /// Create the supervisor around an existing normaliser and connect.
    ///
    /// Listeners registered on `normalizer` beforehand receive events from
    /// the very first block.
    ///
    /// Each endpoint of the pool is tried once, in order. If none accepts,
    /// [`SupervisorError::InitialConnection`] is returned and no reconnect
    /// attempt is ever made.
    pub async fn create_with_normalizer(
        transport: T,
        endpoints: EndpointList,
        config: SupervisorConfig,
        normalizer: Arc<EventNormalizer>,
    ) -> Result<Self, SupervisorError> {
        config.validate()?;

        let (link, _) = watch::channel(Link::new());
        let inner = Arc::new(Inner {
            transport,
            endpoints,
            config,
            normalizer,
            link,
            attempts: AtomicU64::new(0),
            tasks: Mutex::new(LinkTasks::default()),
            closed: AtomicBool::new(false),
        });

        inner.set_state(ConnectionState::Connecting);

        let mut last_error = None;
        for endpoint in inner.endpoints.iter() {
            info!(endpoint = %endpoint, "Connecting to chain");
            match inner.establish(endpoint).await {
                Ok((handle, events)) => {
                    if let Some(rejected) = inner.install(handle, events) {
                        rejected.disconnect().await;
                    }
                    info!(endpoint = %endpoint, "Supervisor ready");
                    return Ok(Self { inner });
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Initial connection attempt failed");
                    last_error = Some((endpoint.clone(), e));
                }
            }
        }

        inner.set_state(ConnectionState::Disconnected);
        let attempted = inner.endpoints.len();
        let (endpoint, source) = match last_error {
            Some(last) => last,
            None => (inner.endpoints.first().clone(), TransportError::Disconnected),
        };
        Err(SupervisorError::InitialConnection {
            endpoint,
            attempted,
            source,
        })
    }

    /// Whether the held connection currently reports itself live.
    ///
    /// Always `false` while a reconnect is in progress.
    pub fn is_connected(&self) -> bool {
        self.inner
            .link
            .borrow()
            .available()
            .is_some_and(|handle| handle.is_connected())
    }

    /// The current live connection.
    ///
    /// While a reconnect is in progress this waits until the replacement is
    /// published and returns it, never the torn-down handle. There is no
    /// deadline; see [`Self::get_connection_timeout`] for a bounded wait.
    ///
    /// The returned handle is a snapshot: a new reconnect may start right
    /// after this returns, so do not hold on to it across long operations.
    pub async fn get_connection(&self) -> Arc<T::Handle> {
        let mut rx = self.inner.link.subscribe();
        loop {
            let available = rx.borrow_and_update().available();
            if let Some(handle) = available {
                return handle;
            }
            // The sender lives in `self.inner`, so the cell cannot close here.
            let _ = rx.changed().await;
        }
    }

    /// [`Self::get_connection`] with a deadline.
    pub async fn get_connection_timeout(
        &self,
        limit: Duration,
    ) -> Result<Arc<T::Handle>, SupervisorError> {
        tokio::time::timeout(limit, self.get_connection())
            .await
            .map_err(|_| SupervisorError::Timeout(limit))
    }

    /// Run a reconnect cycle now.
    ///
    /// Returns [`ReconnectOutcome::AlreadyInProgress`] without doing anything
    /// if another cycle holds the lock.
    pub async fn request_reconnect(&self) -> ReconnectOutcome {
        Inner::reconnect(&self.inner, Trigger::Requested).await
    }

    /// Stop supervising and close the live connection.
    ///
    /// After shutdown the state stays `Disconnected` and
    /// [`Self::get_connection`] no longer resolves.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.tasks.lock().abort();

        let mut old = None;
        self.inner.link.send_modify(|link| {
            old = link.handle.take();
            link.transition(ConnectionState::Disconnected);
        });
        if let Some(handle) = old {
            handle.disconnect().await;
        }
        info!("Supervisor shut down");
    }

    pub fn normalizer(&self) -> &Arc<EventNormalizer> {
        &self.inner.normalizer
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link.borrow().state
    }

    /// Reconnect attempts made so far.
    pub fn reconnect_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Rotation slot of the most recent reconnect attempt (0 before any).
    pub fn rotation_slot(&self) -> usize {
        self.inner.endpoints.rotation_slot(self.reconnect_attempts())
    }

    /// Endpoint of the published connection, if any.
    pub fn current_endpoint(&self) -> Option<Endpoint> {
        self.inner
            .link
            .borrow()
            .handle
            .as_ref()
            .map(|h| h.endpoint().clone())
    }

    /// Number of connections published so far (1 after `create`).
    pub fn generation(&self) -> u64 {
        self.inner.link.borrow().generation
    }

    pub fn endpoints(&self) -> &EndpointList {
        &self.inner.endpoints
    }
}

impl<T: Transport> Inner<T> {
    /// Once closed, shutdown owns the state and further writes are dropped.
    fn set_state(&self, state: ConnectionState) {
        self.link.send_if_modified(|link| {
            if self.closed.load(Ordering::SeqCst) {
                return false;
            }
            link.transition(state);
            true
        });
    }

    /// Connect to one endpoint and open its event subscription.
    async fn establish(
        &self,
        endpoint: &Endpoint,
    ) -> Result<(Arc<T::Handle>, mpsc::Receiver<Vec<RawEvent>>), TransportError> {
        let connect = self.transport.connect(endpoint);
        let handle = match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| TransportError::timeout(format!("connect to {endpoint}")))??,
            None => connect.await?,
        };

        match handle.subscribe_events(self.config.event_buffer).await {
            Ok(events) => Ok((handle, events)),
            Err(e) => {
                handle.disconnect().await;
                Err(e)
            }
        }
    }

    /// Attach the normaliser and loss monitor, then publish the handle and
    /// release the reconnect lock in one write.
    ///
    /// After shutdown nothing is published and the handle is given back.
    /// `shutdown` sets `closed` before taking the tasks lock, so a handle
    /// published here is always torn down by a concurrent shutdown.
    #[must_use]
    fn install(
        self: &Arc<Self>,
        handle: Arc<T::Handle>,
        events: mpsc::Receiver<Vec<RawEvent>>,
    ) -> Option<Arc<T::Handle>> {
        let mut tasks = self.tasks.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Some(handle);
        }
        tasks.abort();

        let endpoint = handle.endpoint().clone();
        tasks.pump = Some(tokio::spawn(pump_events(
            self.normalizer.clone(),
            events,
            endpoint.clone(),
        )));

        let lifecycle = handle.lifecycle();
        let mut generation = 0;
        self.link.send_modify(|link| {
            link.generation += 1;
            generation = link.generation;
            link.handle = Some(handle);
            link.transition(ConnectionState::Ready);
            link.reconnecting = false;
        });

        // Armed after publication so a loss right away is never mistaken
        // for a trigger racing the lock.
        tasks.monitor = Some(tokio::spawn(watch_link(
            Arc::downgrade(self),
            lifecycle,
            generation,
            endpoint,
        )));
        None
    }

    async fn reconnect(self: &Arc<Self>, trigger: Trigger) -> ReconnectOutcome {
        if self.closed.load(Ordering::SeqCst) {
            return ReconnectOutcome::Closed;
        }

        let mut refused = ReconnectOutcome::AlreadyInProgress;
        let mut old = None;
        let acquired = self.link.send_if_modified(|link| {
            if self.closed.load(Ordering::SeqCst) {
                refused = ReconnectOutcome::Closed;
                return false;
            }
            if link.reconnecting {
                return false;
            }
            if let Trigger::Lost(generation) = trigger {
                if generation != link.generation {
                    refused = ReconnectOutcome::Stale;
                    return false;
                }
            }
            link.reconnecting = true;
            link.transition(ConnectionState::Reconnecting);
            old = link.handle.take();
            true
        });

        if !acquired {
            match refused {
                ReconnectOutcome::Closed => {}
                ReconnectOutcome::Stale => {
                    debug!(?trigger, "Ignoring loss of a replaced connection");
                }
                _ => info!("API already trying reconnect"),
            }
            return refused;
        }

        // Teardown: no events from the old connection past this point.
        self.tasks.lock().abort();
        if let Some(old) = old {
            old.disconnect().await;
        }

        loop {
            if self.closed.load(Ordering::SeqCst) {
                self.release_closed();
                return ReconnectOutcome::Closed;
            }
            let attempts = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let slot = self.endpoints.rotation_slot(attempts);
            let endpoint = self.endpoints.endpoint_for(attempts).clone();
            info!(
                reconnect_tries = attempts,
                slot,
                endpoint = %endpoint,
                "API disconnected, reconnecting"
            );

            self.set_state(ConnectionState::Connecting);
            let result = self.establish(&endpoint).await;

            if self.closed.load(Ordering::SeqCst) {
                if let Ok((handle, _)) = result {
                    handle.disconnect().await;
                }
                self.release_closed();
                return ReconnectOutcome::Closed;
            }

            match result {
                Ok((handle, events)) => {
                    if let Some(rejected) = self.install(handle, events) {
                        rejected.disconnect().await;
                        self.release_closed();
                        return ReconnectOutcome::Closed;
                    }
                    info!(reconnect_tries = attempts, endpoint = %endpoint, "Reconnected");
                    return ReconnectOutcome::Completed { attempts, endpoint };
                }
                Err(e) => {
                    warn!(
                        reconnect_tries = attempts,
                        endpoint = %endpoint,
                        error = %e,
                        "Reconnect attempt failed, rotating"
                    );
                    self.set_state(ConnectionState::Reconnecting);
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    fn release_closed(&self) {
        self.link.send_modify(|link| {
            link.reconnecting = false;
            link.transition(ConnectionState::Disconnected);
        });
    }
}

impl<T: Transport> Drop for Inner<T> {
    fn drop(&mut self) {
        self.tasks.get_mut().abort();
    }
}

/// Feed one connection's raw event batches into the normaliser.
async fn pump_events(
    normalizer: Arc<EventNormalizer>,
    mut events: mpsc::Receiver<Vec<RawEvent>>,
    endpoint: Endpoint,
) {
    while let Some(batch) = events.recv().await {
        normalizer.on_events(&batch);
    }
    debug!(endpoint = %endpoint, "Event feed closed");
}

/// Log lifecycle signals of one connection and start a reconnect when it
/// reports a disconnect.
async fn watch_link<T: Transport>(
    inner: Weak<Inner<T>>,
    mut lifecycle: watch::Receiver<LinkSignal>,
    generation: u64,
    endpoint: Endpoint,
) {
    loop {
        let signal = lifecycle.borrow_and_update().clone();
        match signal {
            LinkSignal::Connected => info!(endpoint = %endpoint, "Connected to chain"),
            LinkSignal::Ready => info!(endpoint = %endpoint, "API connection ready"),
            LinkSignal::Error(error) => {
                warn!(endpoint = %endpoint, error = %error, "The API has an error")
            }
            LinkSignal::Disconnected => break,
        }
        if lifecycle.changed().await.is_err() {
            // Handle dropped its signal sender: treat as lost.
            break;
        }
    }

    warn!(endpoint = %endpoint, "Disconnected from chain");
    let Some(inner) = inner.upgrade() else {
        return;
    };
    // Detached so that the reconnect may abort this monitor while tearing down.
    tokio::spawn(async move {
        Inner::reconnect(&inner, Trigger::Lost(generation)).await;
    });
}
