//! Mapping from raw chain events to domain notifications.
//!
//! | section    | method        | payload                  | notification        |
//! |------------|---------------|--------------------------|---------------------|
//! | `session`  | `NewSession`  | `[session_index]`        | `SessionRotated`    |
//! | `staking`  | `Reward`      | `[stash, amount]`        | `RewardPaid`        |
//! | `imOnline` | `SomeOffline` | `[[[id, exposure], ..]]` | `ValidatorsOffline` |

use serde_json::Value;

use crate::domain::{DomainNotification, RawEvent};

pub const SESSION_SECTION: &str = "session";
pub const NEW_SESSION_METHOD: &str = "NewSession";
pub const STAKING_SECTION: &str = "staking";
pub const REWARD_METHOD: &str = "Reward";
pub const IM_ONLINE_SECTION: &str = "imOnline";
pub const SOME_OFFLINE_METHOD: &str = "SomeOffline";

/// Outcome of matching one raw event against the whitelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Whitelisted and well-formed.
    Notification(DomainNotification),
    /// Whitelisted but the payload did not have the expected shape.
    Malformed(&'static str),
    /// Not on the whitelist.
    Ignored,
}

/// Match a single raw event.
pub fn normalize(event: &RawEvent) -> Normalized {
    if event.is(SESSION_SECTION, NEW_SESSION_METHOD) {
        return match event.data.first().and_then(stringify) {
            Some(session_index) => {
                Normalized::Notification(DomainNotification::SessionRotated { session_index })
            }
            None => Normalized::Malformed("NewSession without session index"),
        };
    }

    if event.is(STAKING_SECTION, REWARD_METHOD) {
        let stash = event.data.first().and_then(stringify);
        let amount = event.data.get(1).and_then(stringify);
        return match (stash, amount) {
            (Some(stash), Some(amount)) => {
                Normalized::Notification(DomainNotification::RewardPaid { stash, amount })
            }
            _ => Normalized::Malformed("Reward without stash and amount"),
        };
    }

    if event.is(IM_ONLINE_SECTION, SOME_OFFLINE_METHOD) {
        return match event.data.first().and_then(offline_ids) {
            Some(offline_ids) => {
                Normalized::Notification(DomainNotification::ValidatorsOffline { offline_ids })
            }
            None => Normalized::Malformed("SomeOffline without offline list"),
        };
    }

    Normalized::Ignored
}

/// Render a primitive payload field as a string.
///
/// Strings are taken verbatim; numbers and booleans use their JSON text.
fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Extract validator ids from a list of `[id, exposure]` pairs.
fn offline_ids(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|entry| match entry {
            Value::Array(pair) => pair.first().and_then(stringify),
            other => stringify(other),
        })
        .collect()
}
