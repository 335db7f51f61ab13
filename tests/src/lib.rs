//! # Staking-Harness Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── failover.rs        # Reconnect lock, rotation arithmetic, waiting callers
//!     ├── notifications.rs   # Whitelist normalisation and listener delivery
//!     └── ws_end_to_end.rs   # Supervisor over real WebSocket nodes
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p failover-tests
//! cargo test -p failover-tests integration::failover::
//! ```

#![allow(dead_code)]

pub mod integration;
