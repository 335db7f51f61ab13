//! Listener contract for domain notifications.

use std::collections::HashSet;
use std::fmt;
use tokio::sync::mpsc;

use crate::domain::{DomainNotification, NotificationKind};

/// Identifier returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Receives domain notifications synchronously, in emission order.
///
/// Implementations run on the event pump task and must not block.
pub trait NotificationListener: Send + Sync {
    fn on_notification(&self, notification: &DomainNotification);
}

impl<F> NotificationListener for F
where
    F: Fn(&DomainNotification) + Send + Sync,
{
    fn on_notification(&self, notification: &DomainNotification) {
        self(notification)
    }
}

/// Forwards notifications into an unbounded channel.
///
/// Useful for consumers that want to `await` notifications on their own task.
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<DomainNotification>,
}

impl ChannelListener {
    pub fn new(sender: mpsc::UnboundedSender<DomainNotification>) -> Self {
        Self { sender }
    }

    /// Create a listener together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DomainNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl NotificationListener for ChannelListener {
    fn on_notification(&self, notification: &DomainNotification) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sender.send(notification.clone());
    }
}

/// Which notification kinds a listener wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFilter {
    kinds: Option<HashSet<NotificationKind>>,
}

impl NotificationFilter {
    /// Match every notification.
    pub fn all() -> Self {
        Self { kinds: None }
    }

    /// Match only the listed kinds.
    pub fn kinds(kinds: impl IntoIterator<Item = NotificationKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    pub fn matches(&self, notification: &DomainNotification) -> bool {
        match &self.kinds {
            None => true,
            Some(kinds) => kinds.contains(&notification.kind()),
        }
    }
}

impl Default for NotificationFilter {
    fn default() -> Self {
        Self::all()
    }
}
