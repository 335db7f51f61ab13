//! Raw chain event records and the domain notifications derived from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event record as delivered by the remote node, already decoded to JSON.
///
/// A block's records arrive together as a `Vec<RawEvent>` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Pallet / module name, e.g. `staking`.
    pub section: String,
    /// Event variant, e.g. `Reward`.
    pub method: String,
    /// Positional payload fields.
    #[serde(default)]
    pub data: Vec<Value>,
}

impl RawEvent {
    pub fn new(section: impl Into<String>, method: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            section: section.into(),
            method: method.into(),
            data,
        }
    }

    pub fn is(&self, section: &str, method: &str) -> bool {
        self.section == section && self.method == method
    }
}

/// Normalised application-level notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainNotification {
    /// A new session started.
    #[serde(rename_all = "camelCase")]
    SessionRotated { session_index: String },

    /// A staking reward was paid to a stash.
    #[serde(rename_all = "camelCase")]
    RewardPaid { stash: String, amount: String },

    /// Validators reported offline in the last session.
    #[serde(rename_all = "camelCase")]
    ValidatorsOffline { offline_ids: Vec<String> },
}

impl DomainNotification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            DomainNotification::SessionRotated { .. } => NotificationKind::SessionRotated,
            DomainNotification::RewardPaid { .. } => NotificationKind::RewardPaid,
            DomainNotification::ValidatorsOffline { .. } => NotificationKind::ValidatorsOffline,
        }
    }
}

/// Discriminant of [`DomainNotification`], used for listener filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    SessionRotated,
    RewardPaid,
    ValidatorsOffline,
}
