//! Correlation tables for the WebSocket transport.
//!
//! Maps JSON-RPC request ids to waiting callers, and subscription ids to
//! the event channel of the subscriber.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::domain::{RawEvent, TransportError};

pub type EventSender = mpsc::Sender<Vec<RawEvent>>;

/// A request waiting for its response.
struct PendingRequest {
    sender: oneshot::Sender<Result<Value, TransportError>>,
    created_at: Instant,
    method: String,
    /// Channel to install under the returned subscription id, if this is a
    /// subscribe call.
    subscription: Option<EventSender>,
}

/// Statistics for the pending request table
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_cancelled: AtomicU64,
    pub total_failed: AtomicU64,
}

/// Requests awaiting a response, keyed by JSON-RPC id.
///
/// Flow:
/// 1. Caller allocates an id and calls `register()` to get a receiver
/// 2. Caller writes the request frame
/// 3. Reader task gets the response and calls `complete()`
/// 4. Caller awaits the receiver or times out and calls `cancel()`
pub struct PendingRequests {
    pending: DashMap<u64, PendingRequest>,
    subscriptions: DashMap<String, EventSender>,
    stats: PendingStats,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            subscriptions: DashMap::new(),
            stats: PendingStats::default(),
        }
    }

    /// Register a request and get the receiver for its response.
    pub fn register(
        &self,
        id: u64,
        method: &str,
        subscription: Option<EventSender>,
    ) -> oneshot::Receiver<Result<Value, TransportError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingRequest {
                sender: tx,
                created_at: Instant::now(),
                method: method.to_string(),
                subscription,
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, "Registered pending request");
        rx
    }

    /// Complete a request with its response.
    ///
    /// For a successful subscribe call the event channel is installed
    /// before the caller is woken, so no notification can slip past.
    /// Returns false if the id was unknown or the caller gave up.
    pub fn complete(&self, id: u64, result: Result<Value, TransportError>) -> bool {
        let Some((_, pending)) = self.pending.remove(&id) else {
            warn!(id, "Response for unknown or expired request id");
            return false;
        };

        let result = match (result, pending.subscription) {
            (Ok(value), Some(events)) => match subscription_key(&value) {
                Some(key) => {
                    debug!(subscription = %key, method = pending.method, "Subscription installed");
                    self.subscriptions.insert(key, events);
                    Ok(value)
                }
                None => Err(TransportError::Protocol(format!(
                    "{} returned no subscription id",
                    pending.method
                ))),
            },
            (result, _) => result,
        };

        match pending.sender.send(result) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    id,
                    method = pending.method,
                    response_time_ms = pending.created_at.elapsed().as_millis(),
                    "Completed pending request"
                );
                true
            }
            Err(_) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(id, method = pending.method, "Pending request receiver dropped");
                false
            }
        }
    }

    /// Drop a request whose caller stopped waiting.
    pub fn cancel(&self, id: u64) -> bool {
        if self.pending.remove(&id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Fail every waiting request and close every subscription.
    pub fn fail_all(&self, error: TransportError) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.sender.send(Err(error.clone()));
                failed += 1;
            }
        }
        self.stats
            .total_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
        self.subscriptions.clear();
        failed
    }

    /// Event channel for a subscription id.
    pub fn subscriber(&self, key: &str) -> Option<EventSender> {
        self.subscriptions.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove_subscription(&self, key: &str) -> Option<EventSender> {
        self.subscriptions.remove(key).map(|(_, tx)| tx)
    }

    pub fn subscription_ids(&self) -> Vec<String> {
        self.subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription ids are strings on most nodes and numbers on some.
pub fn subscription_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
