//! Staking harness: loads a config directory, picks the endpoint pool for the
//! configured network and runs a supervised chain connection.

pub mod config;
pub mod network;

pub use config::{load_config_dir, GlobalConfig, HarnessConfig};
pub use network::Network;
