//! Connection state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the supervised connection.
///
/// ```text
/// Disconnected ──create──→ Connecting ──handshake──→ Ready
///                              ↑                       │
///                              │                     loss
///                              │                       ↓
///                              └──────teardown──── Reconnecting
/// ```
///
/// Any live state may also drop to `Disconnected`: a first connection that
/// fails everywhere, or a shutdown. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Reconnecting,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Ready)
                | (Ready, Reconnecting)
                | (Reconnecting, Connecting)
                // a failed attempt inside a reconnect cycle goes back to tearing down
                | (Connecting, Reconnecting)
                | (Connecting, Disconnected)
                | (Ready, Disconnected)
                | (Reconnecting, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Lifecycle signal published by a transport handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSignal {
    Connected,
    Ready,
    Disconnected,
    Error(String),
}

impl LinkSignal {
    pub fn is_disconnected(&self) -> bool {
        matches!(self, LinkSignal::Disconnected)
    }
}
