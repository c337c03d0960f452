//! Client configuration

use std::time::Duration;

use crate::protocol::constants::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_PORT, DEFAULT_WRITE_TIMEOUT};

/// Chat client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the chat server
    pub server_addr: String,

    /// Period between heartbeats
    pub heartbeat_interval: Duration,

    /// Deadline for one outbound frame
    pub write_timeout: Duration,

    /// Deadline for the TCP connect and for the login reply
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Config for the given server address
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Default::default()
        }
    }

    /// Set the heartbeat period (never zero)
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
