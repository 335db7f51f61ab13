//! Cross-module flows through the public API of `rpc-failover`.

use std::time::Duration;

use rpc_failover::{
    ConnectionState, ConnectionSupervisor, EndpointList, SupervisorConfig, Transport,
};

#[cfg(test)]
mod failover;
#[cfg(test)]
mod notifications;

/// Upper bound for any single wait in the suite.
pub const WAIT: Duration = Duration::from_secs(5);

/// `ws://node-0:9944` .. `ws://node-{n-1}:9944`.
pub fn node_urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("ws://node-{i}:9944")).collect()
}

pub fn pool(n: usize, failover_width: usize) -> EndpointList {
    EndpointList::parse(node_urls(n), failover_width).expect("valid pool")
}

pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        connect_timeout: Some(Duration::from_secs(1)),
        retry_delay: Duration::from_millis(10),
        event_buffer: 16,
    }
}

/// Wait until the supervisor has published `generation` connections.
pub async fn wait_for_generation<T: Transport>(sup: &ConnectionSupervisor<T>, generation: u64) {
    tokio::time::timeout(WAIT, async {
        while sup.generation() < generation {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reconnect did not complete in time");
}

/// Wait until a reconnect cycle holds the lock.
pub async fn wait_until_busy<T: Transport>(sup: &ConnectionSupervisor<T>) {
    tokio::time::timeout(WAIT, async {
        while sup.state() == ConnectionState::Ready {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reconnect did not start in time");
}
