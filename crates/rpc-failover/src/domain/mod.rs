//! Domain Layer - connection vocabulary with no I/O
//!
//! This module contains:
//! - Endpoint pools and the failover rotation arithmetic
//! - Connection state machine
//! - Raw event records and normalised domain notifications
//! - Configuration and error types

pub mod config;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod state;

pub use config::*;
pub use endpoints::*;
pub use error::*;
pub use events::*;
pub use state::*;
