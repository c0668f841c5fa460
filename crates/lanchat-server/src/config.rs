//! Server configuration.

use std::time::Duration;

use lanchat_core::Profile;
use lanchat_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the chat server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Outbound queue length per connection.
    pub send_queue_capacity: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Grace period for open sessions at shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// Protocol profile.
    pub profile: Profile,
}

impl ServerConfig {
    /// `host:port` as passed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            send_queue_capacity: 256,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            shutdown_timeout_ms: 5_000,
            profile: Profile::Full,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            send_queue_capacity: s.send_queue_capacity,
            max_message_size: s.max_message_size,
            shutdown_timeout_ms: s.shutdown_timeout_ms,
            profile: s.profile,
        }
    }
}
