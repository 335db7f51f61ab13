//! Config directory loading.
//!
//! A config directory holds `main.json` and, optionally, `secret.json`.
//! Keys in `secret.json` override the same keys in `main.json`; nested
//! objects are merged key by key.

use anyhow::{Context, Result};
use rpc_failover::{
    ConfigError, EndpointList, SupervisorConfig, WsTransportConfig, DEFAULT_FAILOVER_WIDTH,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::network::Network;

pub const MAIN_FILE: &str = "main.json";
pub const SECRET_FILE: &str = "secret.json";

/// Full harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessConfig {
    pub global: GlobalConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub transport: WsTransportConfig,
}

/// Network selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    pub network_prefix: u16,
    /// Replaces the built-in pool of the network when set.
    #[serde(default)]
    pub endpoints: Option<Vec<String>>,
    #[serde(default = "default_failover_width")]
    pub failover_width: usize,
}

fn default_failover_width() -> usize {
    DEFAULT_FAILOVER_WIDTH
}

impl HarnessConfig {
    pub fn network(&self) -> Network {
        Network::from_prefix(self.global.network_prefix)
    }

    /// Endpoint pool to supervise.
    pub fn endpoint_list(&self) -> Result<EndpointList, ConfigError> {
        let urls: Vec<String> = match &self.global.endpoints {
            Some(urls) => urls.clone(),
            None => self
                .network()
                .endpoints()
                .iter()
                .map(|url| url.to_string())
                .collect(),
        };
        EndpointList::parse(urls, self.global.failover_width)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.supervisor.validate()?;
        self.transport.validate()?;
        self.endpoint_list().map(|_| ())
    }
}

/// Load and validate a config directory.
pub fn load_config_dir(dir: &Path) -> Result<HarnessConfig> {
    let main_path = dir.join(MAIN_FILE);
    let mut merged = read_json(&main_path)?;

    let secret_path = dir.join(SECRET_FILE);
    if secret_path.exists() {
        let secret = read_json(&secret_path)?;
        merge(&mut merged, secret);
    }

    let config: HarnessConfig = serde_json::from_value(merged)
        .with_context(|| format!("invalid configuration in {}", dir.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", dir.display()))?;
    Ok(config)
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Deep-merge `overlay` into `base`.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
