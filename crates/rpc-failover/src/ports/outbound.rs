//! # Driven Ports (Outbound SPI)
//!
//! The transport is the only boundary of the core. It opens connections,
//! reports their lifecycle, delivers per-block raw events and carries the
//! requests issued by upstream callers.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::domain::{Endpoint, LinkSignal, RawEvent, TransportError};

/// Opens connections to remote RPC endpoints.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the supervisor calls `connect`
/// from its reconnect task while callers hold handles on other tasks.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Live connection type produced by this transport.
    type Handle: TransportHandle;

    /// Connect and complete the protocol handshake.
    ///
    /// Resolves once the connection is usable, or fails with
    /// [`TransportError::Connect`] / [`TransportError::Timeout`].
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<Self::Handle>, TransportError>;
}

/// One live connection.
#[async_trait]
pub trait TransportHandle: Send + Sync + 'static {
    /// Endpoint this handle is connected to.
    fn endpoint(&self) -> &Endpoint;

    /// Whether the connection currently reports itself live.
    fn is_connected(&self) -> bool;

    /// Lifecycle signals (connected, ready, disconnected, error).
    ///
    /// The receiver always holds the latest signal, so a watcher that
    /// subscribes late still observes a disconnect that already happened.
    fn lifecycle(&self) -> watch::Receiver<LinkSignal>;

    /// Open the per-block raw event subscription.
    ///
    /// Each item is one block's event records in on-chain order. The
    /// receiver closes when the connection goes away.
    async fn subscribe_events(
        &self,
        buffer: usize,
    ) -> Result<mpsc::Receiver<Vec<RawEvent>>, TransportError>;

    /// Issue a request against the remote node.
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Tear the connection down. Idempotent.
    async fn disconnect(&self);
}
