//! Stream: a named set of qualities
//!
//! A stream is created when a producer connects with a fresh name and is torn
//! down when that producer leaves. It owns every quality it creates; closing
//! the stream closes each of them, which in turn ends every viewer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::quality::Quality;
use crate::stats::StreamStats;

/// A live stream
#[derive(Debug)]
pub struct Stream {
    name: String,
    qualities: RwLock<HashMap<String, Arc<Quality>>>,
    viewers: AtomicUsize,
    ingest_capacity: usize,
}

impl Stream {
    pub(super) fn new(name: &str, config: &RegistryConfig) -> Self {
        Self {
            name: name.to_string(),
            qualities: RwLock::new(HashMap::new()),
            viewers: AtomicUsize::new(0),
            ingest_capacity: config.ingest_capacity,
        }
    }

    /// Stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a quality and start its broadcast task
    pub async fn create_quality(&self, name: &str) -> Result<Arc<Quality>, RegistryError> {
        let mut qualities = self.qualities.write().await;
        if qualities.contains_key(name) {
            return Err(RegistryError::QualityAlreadyExists {
                stream: self.name.clone(),
                quality: name.to_string(),
            });
        }

        let quality = Arc::new(Quality::new(&self.name, name, self.ingest_capacity));
        qualities.insert(name.to_string(), Arc::clone(&quality));

        tracing::debug!(stream = %self.name, quality = %name, "Quality created");
        Ok(quality)
    }

    /// Look up a quality
    pub async fn get_quality(&self, name: &str) -> Result<Arc<Quality>, RegistryError> {
        self.qualities
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::QualityNotFound {
                stream: self.name.clone(),
                quality: name.to_string(),
            })
    }

    /// Close and remove a quality; no-op if absent
    pub async fn delete_quality(&self, name: &str) {
        let removed = self.qualities.write().await.remove(name);
        // Closed outside the table lock
        if let Some(quality) = removed {
            quality.close();
        }
    }

    /// Names of every quality, sorted
    pub async fn quality_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.qualities.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every quality owned by this stream
    pub async fn close(&self) {
        let drained: Vec<Arc<Quality>> = self
            .qualities
            .write()
            .await
            .drain()
            .map(|(_, quality)| quality)
            .collect();

        for quality in &drained {
            quality.close();
        }

        tracing::debug!(stream = %self.name, qualities = drained.len(), "Stream closed");
    }

    /// Record a viewer joining. Pair with [`Quality::register`].
    pub fn increment_viewer_count(&self) -> usize {
        self.viewers.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record a viewer leaving. Pair with [`Quality::unregister`].
    ///
    /// The count never goes below zero; an unpaired decrement is logged.
    pub fn decrement_viewer_count(&self) -> usize {
        match self
            .viewers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => {
                tracing::warn!(stream = %self.name, "Viewer count decremented below zero");
                0
            }
        }
    }

    /// Current number of live viewers
    pub fn viewer_count(&self) -> usize {
        self.viewers.load(Ordering::Acquire)
    }

    /// Snapshot of this stream and its qualities
    pub async fn stats(&self) -> StreamStats {
        let qualities: Vec<Arc<Quality>> = self.qualities.read().await.values().cloned().collect();

        let mut quality_stats = Vec::with_capacity(qualities.len());
        for quality in qualities {
            quality_stats.push(quality.stats().await);
        }
        quality_stats.sort_by(|a, b| a.name.cmp(&b.name));

        StreamStats {
            name: self.name.clone(),
            viewers: self.viewer_count(),
            qualities: quality_stats,
        }
    }
}
