//! rpc-failover - Supervised chain-RPC connection with endpoint failover.
//!
//! Keeps exactly one live connection to a pool of chain RPC endpoints,
//! replaces it when it drops, and turns the raw per-block event feed into
//! a small set of domain notifications.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    ConnectionSupervisor                       │
//! │                                                              │
//! │  EndpointList ──► reconnect lock ──► Transport::connect      │
//! │   (rotation slot = attempts % failover width)                │
//! │                                                              │
//! │  lifecycle monitor ── Disconnected ──► reconnect             │
//! │                                                              │
//! │  event pump ── Vec<RawEvent> ──► EventNormalizer             │
//! │                                     │                        │
//! └─────────────────────────────────────┼────────────────────────┘
//!                                       ▼
//!                 SessionRotated / RewardPaid / ValidatorsOffline
//!                                       │
//!                                       ▼
//!                           registered listeners
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use rpc_failover::{
//!     ConnectionSupervisor, DomainNotification, EndpointList, SupervisorConfig, WsTransport,
//! };
//!
//! let endpoints = EndpointList::parse(["wss://rpc-1.example", "wss://rpc-2.example"], 5)?;
//! let supervisor =
//!     ConnectionSupervisor::create(WsTransport::default(), endpoints, SupervisorConfig::default())
//!         .await?;
//! supervisor.normalizer().subscribe(|n: &DomainNotification| println!("{n:?}"));
//! let api = supervisor.get_connection().await;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

pub mod adapters;
pub mod domain;
pub mod normalizer;
pub mod ports;
pub mod service;

pub use domain::{
    ConfigError, ConnectionState, DomainNotification, Endpoint, EndpointList, LinkSignal,
    NotificationKind, RawEvent, SupervisorConfig, SupervisorError, TransportError,
    WsTransportConfig, DEFAULT_FAILOVER_WIDTH,
};
pub use normalizer::{
    ChannelListener, EventNormalizer, ListenerId, NotificationFilter, NotificationListener,
};
pub use ports::{Transport, TransportHandle};
pub use service::{ConnectionSupervisor, ReconnectOutcome};

#[cfg(feature = "ws")]
pub use adapters::{WsHandle, WsTransport};
