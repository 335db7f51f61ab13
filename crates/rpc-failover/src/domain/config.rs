//! Supervisor and transport configuration with validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ConfigError;

/// Connection supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Deadline for a single connection attempt; `None` waits forever
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    /// Pause before retrying after a failed reconnect attempt
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Raw event batches buffered between transport and normaliser
    pub event_buffer: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(30)),
            retry_delay: Duration::from_secs(2),
            event_buffer: 256,
        }
    }
}

impl SupervisorConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "eventBuffer",
                reason: "must be at least 1".into(),
            });
        }
        if self.connect_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "connectTimeout",
                reason: "must be non-zero when set".into(),
            });
        }
        Ok(())
    }
}

/// WebSocket JSON-RPC transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WsTransportConfig {
    /// RPC method opening the per-block event subscription
    pub subscribe_method: String,
    /// RPC method closing it
    pub unsubscribe_method: String,
    /// Method name carried by subscription notifications
    pub notification_method: String,
    /// Deadline for the WebSocket handshake
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Deadline for a single request/response round trip
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Capacity of the outbound frame queue
    pub outbound_buffer: usize,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            subscribe_method: "chain_subscribeEvents".into(),
            unsubscribe_method: "chain_unsubscribeEvents".into(),
            notification_method: "chain_events".into(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            outbound_buffer: 64,
        }
    }
}

impl WsTransportConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("subscribeMethod", &self.subscribe_method),
            ("unsubscribeMethod", &self.unsubscribe_method),
            ("notificationMethod", &self.notification_method),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "cannot be empty".into(),
                });
            }
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "requestTimeout",
                reason: "cannot be 0".into(),
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "connectTimeout",
                reason: "cannot be 0".into(),
            });
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "outboundBuffer",
                reason: "cannot be 0".into(),
            });
        }
        Ok(())
    }
}
