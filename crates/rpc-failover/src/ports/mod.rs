//! # Ports
//!
//! Interfaces the supervisor requires from the host: a transport that can
//! open connections, and the handle such a connection exposes.

pub mod outbound;

pub use outbound::{Transport, TransportHandle};
