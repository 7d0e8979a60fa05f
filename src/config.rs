//! File configuration
//!
//! The daemon reads a single TOML file. Every section and field is optional;
//! anything missing keeps its built-in default.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:9710"
//! max_connections = 200
//! read_timeout_secs = 5
//! write_timeout_ms = 1000
//!
//! [registry]
//! ingest_capacity = 1024
//!
//! [auth]
//! backend = "basic"
//!
//! [auth.basic.credentials]
//! demo = "$argon2id$v=19$..."
//!
//! [forwarding]
//! demo = [{ addr = "relay.example.net:9710" }]
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::AuthConfig;
use crate::error::{Error, Result};
use crate::forward::ForwardingConfig;
use crate::registry::RegistryConfig;
use crate::server::ServerConfig;

/// `[server]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<SocketAddr>,
    pub max_connections: Option<usize>,
    pub handshake_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub read_size: Option<usize>,
    pub viewer_queue_capacity: Option<usize>,
    pub tcp_nodelay: Option<bool>,
    pub stats_interval_secs: Option<u64>,
}

/// `[registry]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySection {
    pub ingest_capacity: Option<usize>,
    pub default_quality: Option<String>,
}

/// Whole configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub registry: RegistrySection,
    pub auth: AuthConfig,
    pub forwarding: ForwardingConfig,
}

impl FileConfig {
    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::parse(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Server settings, defaults overlaid with the file's values
    pub fn server_config(&self) -> ServerConfig {
        let section = &self.server;
        let mut config = ServerConfig::default();

        if let Some(addr) = section.bind {
            config = config.bind(addr);
        }
        if let Some(max) = section.max_connections {
            config = config.max_connections(max);
        }
        if let Some(secs) = section.handshake_timeout_secs {
            config = config.handshake_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = section.read_timeout_secs {
            config = config.read_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = section.write_timeout_ms {
            config = config.write_timeout(Duration::from_millis(ms));
        }
        if let Some(size) = section.read_size {
            config = config.read_size(size);
        }
        if let Some(capacity) = section.viewer_queue_capacity {
            config = config.viewer_queue_capacity(capacity);
        }
        if let Some(nodelay) = section.tcp_nodelay {
            config.tcp_nodelay = nodelay;
        }
        if let Some(secs) = section.stats_interval_secs {
            config = config.stats_interval(Duration::from_secs(secs));
        }

        config
    }

    /// Registry settings, defaults overlaid with the file's values
    pub fn registry_config(&self) -> RegistryConfig {
        let mut config = RegistryConfig::default();

        if let Some(capacity) = self.registry.ingest_capacity {
            config = config.ingest_capacity(capacity);
        }
        if let Some(ref name) = self.registry.default_quality {
            config = config.default_quality(name.clone());
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthBackendKind;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = FileConfig::parse("").unwrap();
        let server = config.server_config();
        let registry = config.registry_config();

        assert_eq!(server.bind_addr.port(), 9710);
        assert_eq!(server.write_timeout, Duration::from_secs(1));
        assert_eq!(registry.default_quality, "source");
        assert_eq!(config.auth.backend, AuthBackendKind::None);
        assert!(config.forwarding.is_empty());
    }

    #[test]
    fn test_full_file() {
        let config = FileConfig::parse(
            r#"
            [server]
            bind = "127.0.0.1:9000"
            max_connections = 10
            handshake_timeout_secs = 3
            read_timeout_secs = 30
            write_timeout_ms = 250
            read_size = 1316
            viewer_queue_capacity = 64
            tcp_nodelay = false
            stats_interval_secs = 0

            [registry]
            ingest_capacity = 16
            default_quality = "original"

            [auth]
            backend = "bypass"

            [forwarding]
            demo = [{ addr = "127.0.0.1:9001" }]
            "#,
        )
        .unwrap();

        let server = config.server_config();
        assert_eq!(server.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(server.max_connections, 10);
        assert_eq!(server.handshake_timeout, Duration::from_secs(3));
        assert_eq!(server.read_timeout, Duration::from_secs(30));
        assert_eq!(server.write_timeout, Duration::from_millis(250));
        assert_eq!(server.read_size, 1316);
        assert_eq!(server.viewer_queue_capacity, 64);
        assert!(!server.tcp_nodelay);
        assert!(server.stats_interval.is_zero());

        let registry = config.registry_config();
        assert_eq!(registry.ingest_capacity, 16);
        assert_eq!(registry.default_quality, "original");

        assert_eq!(config.auth.backend, AuthBackendKind::Bypass);
        assert_eq!(config.forwarding.routes["demo"].len(), 1);
    }

    #[test]
    fn test_unknown_server_field_rejected() {
        let err = FileConfig::parse("[server]\nport = 1\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = FileConfig::load("/nonexistent/fanoutd.toml").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("fanoutd.toml")));
    }
}
