//! Known networks and their public endpoint pools.

use std::fmt;

pub const KUSAMA_ENDPOINTS: &[&str] = &[
    "wss://kusama-rpc.polkadot.io",
    "wss://kusama-rpc.dwellir.com",
    "wss://kusama.api.onfinality.io/public-ws",
];

pub const POLKADOT_ENDPOINTS: &[&str] = &[
    "wss://rpc.polkadot.io",
    "wss://polkadot-rpc.dwellir.com",
    "wss://polkadot.api.onfinality.io/public-ws",
];

pub const LOCAL_ENDPOINTS: &[&str] = &["ws://127.0.0.1:9944"];

/// Network selected by the SS58 prefix in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Polkadot,
    Kusama,
    Local,
}

impl Network {
    /// 2 is Kusama, 0 is Polkadot, anything else is a local dev chain.
    pub fn from_prefix(prefix: u16) -> Self {
        match prefix {
            2 => Network::Kusama,
            0 => Network::Polkadot,
            _ => Network::Local,
        }
    }

    pub fn endpoints(self) -> &'static [&'static str] {
        match self {
            Network::Kusama => KUSAMA_ENDPOINTS,
            Network::Polkadot => POLKADOT_ENDPOINTS,
            Network::Local => LOCAL_ENDPOINTS,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Polkadot => write!(f, "polkadot"),
            Network::Kusama => write!(f, "kusama"),
            Network::Local => write!(f, "local"),
        }
    }
}
