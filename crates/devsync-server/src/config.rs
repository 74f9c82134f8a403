//! Server configuration.

use std::time::Duration;

use devsync_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the DevSync server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// How long a new connection may take to send `auth`.
    pub handshake_timeout_ms: u64,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence in milliseconds after which a connection is dropped.
    pub heartbeat_timeout_ms: u64,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            handshake_timeout_ms: 2_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            send_queue_capacity: 256,
            max_message_size: 4 * 1024 * 1024, // 4 MB
        }
    }
}

impl ServerConfig {
    /// Handshake window.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Ping period, never zero.
    pub fn heartbeat_interval(&self) -> Duration {
        // `tokio::time::interval` panics on a zero period.
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Allowed silence before disconnect.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            handshake_timeout_ms: s.handshake_timeout_ms,
            heartbeat_interval_ms: s.heartbeat_interval_ms,
            heartbeat_timeout_ms: s.heartbeat_timeout_ms,
            send_queue_capacity: s.send_queue_capacity,
            max_message_size: s.max_message_size,
        }
    }
}
