//! Transport implementations.
//!
//! `ws` speaks JSON-RPC over WebSocket to a real node; `memory` is a
//! scriptable stand-in for tests.

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
#[cfg(feature = "ws")]
pub mod pending;
#[cfg(feature = "ws")]
pub mod ws;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{InMemoryHandle, InMemoryTransport};
#[cfg(feature = "ws")]
pub use ws::{WsHandle, WsTransport};
