//! In-memory transport for deterministic tests.
//!
//! Endpoints are reachable unless marked otherwise. Connects can be held
//! in flight to observe the supervisor mid-reconnect, and every handle can
//! inject event batches or simulate a dropped connection.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::domain::{Endpoint, LinkSignal, RawEvent, TransportError};
use crate::ports::{Transport, TransportHandle};

struct TransportState {
    default_reachable: AtomicBool,
    reachable: Mutex<HashMap<String, bool>>,
    fail_subscriptions: AtomicBool,
    attempts: Mutex<Vec<Endpoint>>,
    handles: Mutex<Vec<Arc<InMemoryHandle>>>,
    /// `true` while connects are held.
    gate: watch::Sender<bool>,
}

/// Scriptable transport. Clones share state.
#[derive(Clone)]
pub struct InMemoryTransport {
    state: Arc<TransportState>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            state: Arc::new(TransportState {
                default_reachable: AtomicBool::new(true),
                reachable: Mutex::new(HashMap::new()),
                fail_subscriptions: AtomicBool::new(false),
                attempts: Mutex::new(Vec::new()),
                handles: Mutex::new(Vec::new()),
                gate,
            }),
        }
    }

    /// Mark one endpoint (by URL) reachable or not.
    pub fn set_reachable(&self, url: &str, reachable: bool) {
        self.state
            .reachable
            .lock()
            .insert(url.to_string(), reachable);
    }

    /// Set reachability for every endpoint without an explicit override.
    pub fn set_all_reachable(&self, reachable: bool) {
        self.state.reachable.lock().clear();
        self.state
            .default_reachable
            .store(reachable, Ordering::SeqCst);
    }

    /// Make `subscribe_events` fail on handles created from now on.
    pub fn fail_subscriptions(&self, fail: bool) {
        self.state.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    /// Block every subsequent `connect` until [`Self::release_connects`].
    pub fn hold_connects(&self) {
        self.state.gate.send_replace(true);
    }

    pub fn release_connects(&self) {
        self.state.gate.send_replace(false);
    }

    /// Every endpoint `connect` was called with, in call order.
    pub fn connect_attempts(&self) -> Vec<Endpoint> {
        self.state.attempts.lock().clone()
    }

    /// Most recent handle opened to `url`.
    pub fn handle_for(&self, url: &str) -> Option<Arc<InMemoryHandle>> {
        self.state
            .handles
            .lock()
            .iter()
            .rev()
            .find(|h| h.endpoint.as_str() == url)
            .cloned()
    }

    fn is_reachable(&self, endpoint: &Endpoint) -> bool {
        self.state
            .reachable
            .lock()
            .get(endpoint.as_str())
            .copied()
            .unwrap_or_else(|| self.state.default_reachable.load(Ordering::SeqCst))
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    type Handle = InMemoryHandle;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<InMemoryHandle>, TransportError> {
        self.state.attempts.lock().push(endpoint.clone());

        let mut gate = self.state.gate.subscribe();
        // The sender lives in `self.state`, so this only returns once released.
        let _ = gate.wait_for(|held| !*held).await;

        if !self.is_reachable(endpoint) {
            return Err(TransportError::connect(endpoint, "connection refused"));
        }

        let handle = Arc::new(InMemoryHandle::new(
            endpoint.clone(),
            self.state.fail_subscriptions.load(Ordering::SeqCst),
        ));
        self.state.handles.lock().push(handle.clone());
        Ok(handle)
    }
}

/// Connection produced by [`InMemoryTransport`].
#[derive(Debug)]
pub struct InMemoryHandle {
    endpoint: Endpoint,
    connected: AtomicBool,
    lifecycle: watch::Sender<LinkSignal>,
    events: Mutex<Option<mpsc::Sender<Vec<RawEvent>>>>,
    fail_subscription: bool,
    disconnect_calls: AtomicUsize,
    requests: Mutex<Vec<(String, Value)>>,
}

impl InMemoryHandle {
    fn new(endpoint: Endpoint, fail_subscription: bool) -> Self {
        let (lifecycle, _) = watch::channel(LinkSignal::Ready);
        Self {
            endpoint,
            connected: AtomicBool::new(true),
            lifecycle,
            events: Mutex::new(None),
            fail_subscription,
            disconnect_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Deliver one block's events. Returns `false` if nobody is subscribed.
    pub fn emit(&self, batch: Vec<RawEvent>) -> bool {
        match self.events.lock().as_ref() {
            Some(tx) => tx.try_send(batch).is_ok(),
            None => false,
        }
    }

    /// Simulate the remote side going away.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.events.lock().take();
        self.lifecycle.send_replace(LinkSignal::Disconnected);
    }

    /// Publish a non-fatal error signal.
    pub fn raise_error(&self, message: &str) {
        self.lifecycle
            .send_replace(LinkSignal::Error(message.to_string()));
    }

    /// How many times `disconnect` was called.
    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Requests issued through this handle.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TransportHandle for InMemoryHandle {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn lifecycle(&self) -> watch::Receiver<LinkSignal> {
        self.lifecycle.subscribe()
    }

    async fn subscribe_events(
        &self,
        buffer: usize,
    ) -> Result<mpsc::Receiver<Vec<RawEvent>>, TransportError> {
        if self.fail_subscription {
            return Err(TransportError::Rpc {
                code: -32601,
                message: "Method not found".into(),
            });
        }
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let (tx, rx) = mpsc::channel(buffer);
        *self.events.lock() = Some(tx);
        Ok(rx)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.requests
            .lock()
            .push((method.to_string(), params.clone()));
        Ok(json!({
            "endpoint": self.endpoint.as_str(),
            "method": method,
            "params": params,
        }))
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.drop_connection();
    }
}
