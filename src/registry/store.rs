//! Stream registry implementation
//!
//! The process-wide table of live streams by name, plus best-effort
//! "stream created" notifications for subsystems such as forwarders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::quality::Quality;
use super::stream::Stream;
use crate::stats::RegistryStats;

/// Handle returned by [`StreamRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Central registry for all live streams
///
/// The stream table and the subscriber set are locked independently, and the
/// table lock is never held while a stream's own lock is taken.
pub struct StreamRegistry {
    /// Map of stream name to stream
    streams: RwLock<HashMap<String, Arc<Stream>>>,

    /// Receivers of new stream names
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<String>>>,

    next_subscriber_id: AtomicU64,

    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Create a stream.
    ///
    /// Fails with [`RegistryError::StreamAlreadyExists`] if the name is live,
    /// leaving the existing stream untouched. On success every subscriber is
    /// told the new name without waiting; a subscriber whose queue is full
    /// misses this notification.
    pub async fn create(&self, name: &str) -> Result<Arc<Stream>, RegistryError> {
        self.publish(Arc::new(Stream::new(name, &self.config))).await
    }

    /// Create a stream together with its first quality.
    ///
    /// The quality exists before the stream enters the table, so viewers and
    /// subscribers never see the stream without it. On a name conflict the
    /// fresh stream is closed and the live one is left untouched.
    pub async fn create_with_quality(
        &self,
        name: &str,
        quality: &str,
    ) -> Result<(Arc<Stream>, Arc<Quality>), RegistryError> {
        let stream = Arc::new(Stream::new(name, &self.config));
        let lane = stream.create_quality(quality).await?;

        match self.publish(Arc::clone(&stream)).await {
            Ok(stream) => Ok((stream, lane)),
            Err(e) => {
                stream.close().await;
                Err(e)
            }
        }
    }

    async fn publish(&self, stream: Arc<Stream>) -> Result<Arc<Stream>, RegistryError> {
        let name = stream.name().to_string();
        {
            let mut streams = self.streams.write().await;
            if streams.contains_key(&name) {
                return Err(RegistryError::StreamAlreadyExists(name));
            }
            streams.insert(name.clone(), Arc::clone(&stream));
        }

        tracing::info!(stream = %name, "Stream created");
        self.notify_created(&name).await;

        Ok(stream)
    }

    /// Look up a live stream
    pub async fn get(&self, name: &str) -> Result<Arc<Stream>, RegistryError> {
        self.streams
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::StreamNotFound(name.to_string()))
    }

    /// Remove a stream from the table; no-op if absent.
    ///
    /// Does not close the stream: its owner calls [`Stream::close`] first.
    pub async fn delete(&self, name: &str) {
        if self.streams.write().await.remove(name).is_some() {
            tracing::info!(stream = %name, "Stream removed");
        }
    }

    /// Register a receiver of new stream names
    pub async fn subscribe(&self, sender: mpsc::Sender<String>) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().await.insert(id, sender);
        id
    }

    /// Remove a receiver of new stream names; no-op if already removed
    pub async fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().await.remove(&id);
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Check if a stream is live
    pub async fn contains(&self, name: &str) -> bool {
        self.streams.read().await.contains_key(name)
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Names of every live stream, sorted
    pub async fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.streams.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every live stream
    pub async fn stats(&self) -> RegistryStats {
        // Collect under the table lock, inspect each stream after releasing it
        let streams: Vec<Arc<Stream>> = self.streams.read().await.values().cloned().collect();

        let mut stats = Vec::with_capacity(streams.len());
        for stream in streams {
            stats.push(stream.stats().await);
        }
        stats.sort_by(|a, b| a.name.cmp(&b.name));

        RegistryStats { streams: stats }
    }

    async fn notify_created(&self, name: &str) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|id, sender| match sender.try_send(name.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(stream = %name, subscriber = id.0, "Failed to announce stream to subscriber");
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(subscriber = id.0, "Subscriber gone, removing");
                false
            }
        });
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::registry::ConsumerSink;

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = StreamRegistry::new();
        let created = registry.create("demo").await.unwrap();
        let fetched = registry.get("demo").await.unwrap();

        assert!(Arc::ptr_eq(&created, &fetched));
        assert_eq!(registry.stream_count().await, 1);
        assert!(registry.contains("demo").await);
    }

    #[tokio::test]
    async fn test_duplicate_create_leaves_original() {
        let registry = StreamRegistry::new();
        let original = registry.create("demo").await.unwrap();
        original.create_quality("source").await.unwrap();

        let result = registry.create("demo").await;
        assert!(matches!(result, Err(RegistryError::StreamAlreadyExists(ref n)) if n == "demo"));

        let fetched = registry.get("demo").await.unwrap();
        assert!(Arc::ptr_eq(&original, &fetched));
        assert!(fetched.get_quality("source").await.is_ok());
    }

    #[tokio::test]
    async fn test_create_with_quality_is_visible_at_once() {
        let registry = StreamRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.subscribe(tx).await;

        let (stream, quality) = registry.create_with_quality("demo", "source").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "demo");

        // Whoever hears about the stream finds its quality already there
        let fetched = registry.get("demo").await.unwrap();
        assert!(Arc::ptr_eq(&stream, &fetched));
        assert!(Arc::ptr_eq(&quality, &fetched.get_quality("source").await.unwrap()));
    }

    #[tokio::test]
    async fn test_create_with_quality_conflict_leaves_original() {
        let registry = StreamRegistry::new();
        let (original, source) = registry.create_with_quality("demo", "source").await.unwrap();

        let err = registry.create_with_quality("demo", "source").await.unwrap_err();
        assert!(err.is_already_exists());

        let fetched = registry.get("demo").await.unwrap();
        assert!(Arc::ptr_eq(&original, &fetched));
        assert!(!source.is_closed());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let registry = StreamRegistry::new();
        let err = registry.get("demo").await.unwrap_err();
        assert_eq!(err, RegistryError::StreamNotFound("demo".into()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let registry = StreamRegistry::new();
        registry.create("demo").await.unwrap();

        registry.delete("demo").await;
        registry.delete("demo").await;
        assert!(registry.get("demo").await.is_err());

        // Name is free again
        assert!(registry.create("demo").await.is_ok());
    }

    #[tokio::test]
    async fn test_create_notifies_subscribers() {
        let registry = StreamRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.subscribe(tx).await;

        registry.create("demo").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "demo");

        // A rejected duplicate is not announced
        let _ = registry.create("demo").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_notification() {
        let registry = StreamRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        registry.subscribe(tx).await;

        let created = tokio::time::timeout(Duration::from_secs(1), async {
            registry.create("a").await.unwrap();
            registry.create("b").await.unwrap();
        })
        .await;
        assert!(created.is_ok(), "creator blocked on a full subscriber");

        assert_eq!(rx.recv().await.unwrap(), "a");
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_prune() {
        let registry = StreamRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        let id = registry.subscribe(tx).await;
        registry.unsubscribe(id).await;
        registry.unsubscribe(id).await;

        registry.create("demo").await.unwrap();
        assert!(rx.recv().await.is_none());

        let (tx, rx) = mpsc::channel(8);
        registry.subscribe(tx).await;
        drop(rx);
        registry.create("other").await.unwrap();
        assert_eq!(registry.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_registry_stats() {
        let registry = StreamRegistry::new();
        let stream = registry.create("b").await.unwrap();
        let quality = stream.create_quality("source").await.unwrap();
        registry.create("a").await.unwrap();

        let sink = ConsumerSink::new(4);
        quality.register(sink.clone()).await;
        stream.increment_viewer_count();
        quality.send(Bytes::from_static(b"abc")).await;
        tokio::time::timeout(Duration::from_secs(1), sink.recv())
            .await
            .unwrap();

        let stats = registry.stats().await;
        assert_eq!(stats.stream_count(), 2);
        assert_eq!(stats.streams[0].name, "a");
        assert_eq!(stats.total_viewers(), 1);
        assert_eq!(stats.streams[1].qualities[0].bytes_in, 3);
        assert_eq!(registry.stream_names().await, vec!["a", "b"]);
    }
}
