//! # Event Normalizer
//!
//! Consumes per-block raw event batches from the active connection and
//! emits whitelisted [`DomainNotification`]s to registered listeners.
//!
//! Listeners are owned here, not by any connection, so a reconnect only
//! re-attaches the event feed; registrations survive untouched.

pub mod listener;
pub mod whitelist;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{DomainNotification, RawEvent};

pub use listener::{ChannelListener, ListenerId, NotificationFilter, NotificationListener};
pub use whitelist::{normalize, Normalized};

struct Registration {
    id: ListenerId,
    filter: NotificationFilter,
    listener: Arc<dyn NotificationListener>,
}

/// Fans whitelisted chain events out to listeners.
pub struct EventNormalizer {
    /// Registration order is delivery order.
    listeners: RwLock<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
    notifications_emitted: AtomicU64,
}

impl EventNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            notifications_emitted: AtomicU64::new(0),
        }
    }

    /// Register a listener for every notification kind.
    pub fn subscribe<L>(&self, listener: L) -> ListenerId
    where
        L: NotificationListener + 'static,
    {
        self.subscribe_filtered(NotificationFilter::all(), listener)
    }

    /// Register a listener for a subset of notification kinds.
    pub fn subscribe_filtered<L>(&self, filter: NotificationFilter, listener: L) -> ListenerId
    where
        L: NotificationListener + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Arc::new(Registration {
            id,
            filter,
            listener: Arc::new(listener),
        }));
        debug!(listener = %id, "Notification listener registered");
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        let removed = listeners.len() != before;
        if removed {
            debug!(listener = %id, "Notification listener removed");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Total notifications built since creation.
    pub fn notifications_emitted(&self) -> u64 {
        self.notifications_emitted.load(Ordering::Relaxed)
    }

    /// Process one block's raw events.
    ///
    /// Each whitelisted record is delivered to every listener before the
    /// next record is looked at. Returns the number of notifications built.
    pub fn on_events(&self, events: &[RawEvent]) -> usize {
        let mut emitted = 0;
        for event in events {
            match normalize(event) {
                Normalized::Notification(notification) => {
                    self.emit(&notification);
                    emitted += 1;
                }
                Normalized::Malformed(reason) => {
                    debug!(
                        section = %event.section,
                        method = %event.method,
                        reason,
                        "Skipping malformed event"
                    );
                }
                Normalized::Ignored => {}
            }
        }
        emitted
    }

    fn emit(&self, notification: &DomainNotification) {
        self.notifications_emitted.fetch_add(1, Ordering::Relaxed);
        // Snapshot so listeners may (un)subscribe from inside a callback.
        let snapshot: Vec<Arc<Registration>> = self.listeners.read().clone();
        for registration in snapshot {
            if registration.filter.matches(notification) {
                registration.listener.on_notification(notification);
            }
        }
    }
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
