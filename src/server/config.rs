//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::DEFAULT_SINK_CAPACITY;

/// Default listening port
pub const DEFAULT_PORT: u16 = 9710;

/// Largest chunk read from a producer in one call (one network MTU)
pub const DEFAULT_READ_SIZE: usize = 1500;

/// Longest accepted identifier line, in bytes
pub const MAX_IDENTIFIER_LEN: usize = 512;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// The identifier line must arrive within this time
    pub handshake_timeout: Duration,

    /// A producer silent for this long is disconnected
    pub read_timeout: Duration,

    /// A viewer that cannot take a chunk within this time is disconnected
    pub write_timeout: Duration,

    /// Maximum bytes read from a producer per chunk
    pub read_size: usize,

    /// Chunks buffered per viewer before the oldest are dropped
    pub viewer_queue_capacity: usize,

    /// Longest accepted identifier line
    pub max_identifier_len: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Interval between statistics log lines (zero disables them)
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            handshake_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
            read_size: DEFAULT_READ_SIZE,
            viewer_queue_capacity: DEFAULT_SINK_CAPACITY,
            max_identifier_len: MAX_IDENTIFIER_LEN,
            tcp_nodelay: true, // Important for low latency
            stats_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set producer read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set viewer write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the per-read chunk size (at least 1 byte)
    pub fn read_size(mut self, size: usize) -> Self {
        self.read_size = size.max(1);
        self
    }

    /// Set the per-viewer queue capacity (at least 1 chunk)
    pub fn viewer_queue_capacity(mut self, capacity: usize) -> Self {
        self.viewer_queue_capacity = capacity.max(1);
        self
    }

    /// Set the statistics log interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }
}
