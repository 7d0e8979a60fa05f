//! Registry configuration

/// Default number of chunks buffered between a producer and its broadcast loop
pub const DEFAULT_INGEST_CAPACITY: usize = 1024;

/// Default per-quality rendezvous slot capacity
pub const RENDEZVOUS_CAPACITY: usize = 1;

/// Default quality created for every producer
pub const DEFAULT_QUALITY: &str = "source";

/// Configuration for the stream registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of each quality's ingest sink.
    ///
    /// When full, the producer's send waits for the broadcast loop.
    pub ingest_capacity: usize,

    /// Name of the quality a producer publishes into
    pub default_quality: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: DEFAULT_INGEST_CAPACITY,
            default_quality: DEFAULT_QUALITY.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Set the ingest sink capacity (clamped to at least 1)
    pub fn ingest_capacity(mut self, capacity: usize) -> Self {
        self.ingest_capacity = capacity.max(1);
        self
    }

    /// Set the default quality name
    pub fn default_quality(mut self, name: impl Into<String>) -> Self {
        self.default_quality = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.ingest_capacity, 1024);
        assert_eq!(config.default_quality, "source");
    }

    #[test]
    fn test_ingest_capacity_clamped() {
        let config = RegistryConfig::default().ingest_capacity(0);
        assert_eq!(config.ingest_capacity, 1);
    }
}
