//! Statistics for qualities, streams and sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters owned by a quality and updated by its broadcast loop
#[derive(Debug, Default)]
pub struct QualityCounters {
    chunks_in: AtomicU64,
    bytes_in: AtomicU64,
    chunks_dropped: AtomicU64,
}

impl QualityCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one chunk taken from the ingest sink
    pub fn record_ingest(&self, len: usize) {
        self.chunks_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record one chunk discarded by the backpressure policy
    pub fn record_drop(&self) {
        self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunks_in(&self) -> u64 {
        self.chunks_in.load(Ordering::Relaxed)
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn chunks_dropped(&self) -> u64 {
        self.chunks_dropped.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of one quality
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityStats {
    /// Quality name
    pub name: String,
    /// Registered consumer sinks
    pub consumers: usize,
    /// Chunks received from the producer
    pub chunks_in: u64,
    /// Bytes received from the producer
    pub bytes_in: u64,
    /// Chunks discarded across all consumers
    pub chunks_dropped: u64,
}

/// Point-in-time view of one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStats {
    /// Stream name
    pub name: String,
    /// Live viewer count
    pub viewers: usize,
    /// Per-quality statistics, sorted by name
    pub qualities: Vec<QualityStats>,
}

impl StreamStats {
    /// Bytes received across every quality
    pub fn bytes_in(&self) -> u64 {
        self.qualities.iter().map(|q| q.bytes_in).sum()
    }
}

/// Point-in-time view of the whole registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live streams, sorted by name
    pub streams: Vec<StreamStats>,
}

impl RegistryStats {
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn total_viewers(&self) -> usize {
        self.streams.iter().map(|s| s.viewers).sum()
    }
}

/// Per-connection transfer statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// When the connection was accepted
    pub started_at: Instant,
    /// Bytes read from the peer
    pub bytes_received: u64,
    /// Bytes written to the peer
    pub bytes_sent: u64,
    /// Chunks read or written
    pub chunks: u64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_received: 0,
            bytes_sent: 0,
            chunks: 0,
        }
    }

    pub fn on_received(&mut self, len: usize) {
        self.bytes_received += len as u64;
        self.chunks += 1;
    }

    pub fn on_sent(&mut self, len: usize) {
        self.bytes_sent += len as u64;
        self.chunks += 1;
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average bitrate in bits per second over whole seconds
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            ((self.bytes_received + self.bytes_sent) * 8) / secs
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_counters() {
        let counters = QualityCounters::new();
        counters.record_ingest(100);
        counters.record_ingest(50);
        counters.record_drop();

        assert_eq!(counters.chunks_in(), 2);
        assert_eq!(counters.bytes_in(), 150);
        assert_eq!(counters.chunks_dropped(), 1);
    }

    #[test]
    fn test_registry_stats_totals() {
        let quality = QualityStats {
            name: "source".into(),
            consumers: 2,
            chunks_in: 10,
            bytes_in: 15_000,
            chunks_dropped: 0,
        };
        let stats = RegistryStats {
            streams: vec![
                StreamStats {
                    name: "a".into(),
                    viewers: 2,
                    qualities: vec![quality.clone()],
                },
                StreamStats {
                    name: "b".into(),
                    viewers: 3,
                    qualities: vec![quality],
                },
            ],
        };

        assert_eq!(stats.stream_count(), 2);
        assert_eq!(stats.total_viewers(), 5);
        assert_eq!(stats.streams[0].bytes_in(), 15_000);
    }

    #[test]
    fn test_session_stats() {
        let mut stats = SessionStats::new();
        stats.on_received(1500);
        stats.on_sent(500);

        assert_eq!(stats.bytes_received, 1500);
        assert_eq!(stats.bytes_sent, 500);
        assert_eq!(stats.chunks, 2);
        // Under a second has elapsed, so no whole-second average yet
        assert_eq!(stats.bitrate(), 0);
    }
}
