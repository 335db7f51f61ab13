//! Endpoint pools and failover rotation.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ConfigError;

/// Default number of rotation slots used when choosing a failover endpoint.
pub const DEFAULT_FAILOVER_WIDTH: usize = 5;

/// Network address of a candidate RPC node (`ws://` or `wss://`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(String);

impl Endpoint {
    /// Parse an endpoint, rejecting anything that is not a WebSocket URL.
    pub fn parse(url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: url,
                reason: "endpoint is empty".into(),
            });
        }

        let Some((scheme, rest)) = trimmed.split_once("://") else {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: url,
                reason: "missing scheme".into(),
            });
        };

        if !matches!(scheme, "ws" | "wss") {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: url.clone(),
                reason: format!("unsupported scheme '{scheme}'"),
            });
        }
        if rest.is_empty() {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: url,
                reason: "missing host".into(),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The URL as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

/// Ordered, non-empty pool of endpoints, fixed at construction.
///
/// Rotation uses `attempt % failover_width`, where the width is configured
/// independently of the pool length. When a slot lies beyond the end of the
/// pool it wraps over the pool, so a single local endpoint still resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointList {
    endpoints: Vec<Endpoint>,
    failover_width: usize,
}

impl EndpointList {
    /// Create a pool with the default failover width.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, ConfigError> {
        Self::with_failover_width(endpoints, DEFAULT_FAILOVER_WIDTH)
    }

    /// Create a pool with an explicit failover width.
    pub fn with_failover_width(
        endpoints: Vec<Endpoint>,
        failover_width: usize,
    ) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::EmptyEndpointList);
        }
        if failover_width == 0 {
            return Err(ConfigError::InvalidFailoverWidth(failover_width));
        }
        Ok(Self {
            endpoints,
            failover_width,
        })
    }

    /// Parse a list of URLs into a pool.
    pub fn parse<I, S>(urls: I, failover_width: usize) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints = urls
            .into_iter()
            .map(Endpoint::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_failover_width(endpoints, failover_width)
    }

    /// Rotation slot for the given attempt number.
    pub fn rotation_slot(&self, attempt: u64) -> usize {
        (attempt % self.failover_width as u64) as usize
    }

    /// Endpoint chosen for the given attempt number.
    pub fn endpoint_for(&self, attempt: u64) -> &Endpoint {
        let slot = self.rotation_slot(attempt);
        &self.endpoints[slot % self.endpoints.len()]
    }

    pub fn failover_width(&self) -> usize {
        self.failover_width
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }

    pub fn first(&self) -> &Endpoint {
        &self.endpoints[0]
    }
}
