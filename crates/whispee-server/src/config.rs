//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the Whispee server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// WebSocket/HTTP port (`0` picks a free port).
    pub port: u16,
    /// Port for the legacy plain TCP listener; disabled when `None`.
    pub legacy_port: Option<u16>,
    /// Bound of each connection's outbound frame queue.
    pub max_send_queue: usize,
    /// Interval between server-initiated Ping frames, in seconds. `0` is read as `1`.
    pub heartbeat_interval_secs: u64,
    /// How long shutdown waits for connection tasks before giving up, in seconds.
    pub shutdown_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Never zero; a zero period would panic the writer's ticker.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 456,
            legacy_port: None,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            shutdown_timeout_secs: 10,
            max_message_size: 1024 * 1024, // 1 MB
        }
    }
}
