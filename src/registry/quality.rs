//! Quality: a single fanout lane
//!
//! A quality owns one ingest sink fed by the producer and a set of consumer
//! sinks, one per viewer. A dedicated task copies every ingested chunk to
//! every registered consumer without ever waiting on one: a full consumer
//! loses its oldest buffered chunk instead (see [`ConsumerSink`]).
//!
//! ```text
//!  producer ──send()──► ingest (bounded mpsc) ──► broadcast task
//!                                                   │ push (never waits)
//!                              ┌────────────────────┼────────────────────┐
//!                              ▼                    ▼                    ▼
//!                         ConsumerSink         ConsumerSink         ConsumerSink
//!                          viewer recv()        viewer recv()        viewer recv()
//! ```
//!
//! Closing the ingest sink lets the task drain what is already queued, then
//! close every consumer sink and stop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use super::rendezvous::Rendezvous;
use super::sink::{ConsumerSink, PushOutcome, SinkId};
use crate::stats::{QualityCounters, QualityStats};

#[derive(Debug, Default)]
struct Consumers {
    sinks: HashMap<SinkId, ConsumerSink>,
    /// Set once the broadcast task has exited
    finished: bool,
}

/// A fanout lane within a stream
#[derive(Debug)]
pub struct Quality {
    stream: String,
    name: String,
    ingest: Mutex<Option<mpsc::Sender<Bytes>>>,
    consumers: Arc<AsyncMutex<Consumers>>,
    counters: Arc<QualityCounters>,
    rendezvous: Rendezvous,
}

impl Quality {
    /// Create a quality and spawn its broadcast task.
    ///
    /// Must be called from within a tokio runtime.
    pub(super) fn new(stream: &str, name: &str, ingest_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(ingest_capacity.max(1));
        let consumers = Arc::new(AsyncMutex::new(Consumers::default()));
        let counters = Arc::new(QualityCounters::new());

        tokio::spawn(broadcast_loop(
            stream.to_string(),
            name.to_string(),
            rx,
            Arc::clone(&consumers),
            Arc::clone(&counters),
        ));

        Self {
            stream: stream.to_string(),
            name: name.to_string(),
            ingest: Mutex::new(Some(tx)),
            consumers,
            counters,
            rendezvous: Rendezvous::new(),
        }
    }

    /// Quality name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning stream
    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    /// Feed one chunk into the ingest sink.
    ///
    /// Waits while the ingest sink is full. Returns `false` once the quality
    /// has been closed.
    pub async fn send(&self, chunk: Bytes) -> bool {
        // Clone the sender so the lock is not held across the await
        let tx = self
            .ingest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match tx {
            Some(tx) => tx.send(chunk).await.is_ok(),
            None => false,
        }
    }

    /// Close the ingest sink.
    ///
    /// The broadcast task drains the remaining chunks, then closes every
    /// registered consumer sink. Calling this more than once is a no-op.
    pub fn close(&self) {
        let closed = self
            .ingest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();

        if closed {
            self.rendezvous.close();
            tracing::debug!(stream = %self.stream, quality = %self.name, "Quality closed");
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.ingest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Add a consumer sink.
    ///
    /// Returns `false` if the broadcast task has already finished; the sink is
    /// then closed immediately so its reader observes end of stream.
    pub async fn register(&self, sink: ConsumerSink) -> bool {
        let mut consumers = self.consumers.lock().await;
        if consumers.finished {
            sink.close();
            return false;
        }

        consumers.sinks.insert(sink.id(), sink);
        true
    }

    /// Remove and close a consumer sink.
    ///
    /// Returns `true` if the sink was registered. A second call for the same
    /// sink is a no-op.
    pub async fn unregister(&self, sink: &ConsumerSink) -> bool {
        let removed = self.consumers.lock().await.sinks.remove(&sink.id());
        match removed {
            Some(sink) => {
                sink.close();
                true
            }
            None => false,
        }
    }

    /// Number of registered consumer sinks
    pub async fn consumer_count(&self) -> usize {
        self.consumers.lock().await.sinks.len()
    }

    /// Offer/answer slots for out-of-band session negotiation
    pub fn rendezvous(&self) -> &Rendezvous {
        &self.rendezvous
    }

    /// Snapshot of this quality's counters
    pub async fn stats(&self) -> QualityStats {
        QualityStats {
            name: self.name.clone(),
            consumers: self.consumer_count().await,
            chunks_in: self.counters.chunks_in(),
            bytes_in: self.counters.bytes_in(),
            chunks_dropped: self.counters.chunks_dropped(),
        }
    }
}

impl Drop for Quality {
    fn drop(&mut self) {
        self.close();
    }
}

async fn broadcast_loop(
    stream: String,
    quality: String,
    mut ingest: mpsc::Receiver<Bytes>,
    consumers: Arc<AsyncMutex<Consumers>>,
    counters: Arc<QualityCounters>,
) {
    while let Some(chunk) = ingest.recv().await {
        counters.record_ingest(chunk.len());

        // Held for one pass only; pushes never wait on a consumer
        let consumers = consumers.lock().await;
        for sink in consumers.sinks.values() {
            if sink.push(chunk.clone()) == PushOutcome::DroppedOldest {
                counters.record_drop();
                tracing::trace!(
                    stream = %stream,
                    quality = %quality,
                    sink = %sink.id(),
                    "Consumer full, dropped oldest chunk"
                );
            }
        }
    }

    let mut consumers = consumers.lock().await;
    consumers.finished = true;
    let closed = consumers.sinks.len();
    for (_, sink) in consumers.sinks.drain() {
        sink.close();
    }

    tracing::debug!(
        stream = %stream,
        quality = %quality,
        consumers_closed = closed,
        chunks = counters.chunks_in(),
        dropped = counters.chunks_dropped(),
        "Broadcast loop finished"
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn recv_timeout(sink: &ConsumerSink) -> Option<Bytes> {
        tokio::time::timeout(Duration::from_secs(1), sink.recv())
            .await
            .expect("sink recv timed out")
    }

    #[tokio::test]
    async fn test_broadcast_to_all_consumers() {
        let quality = Quality::new("demo", "source", 16);
        let a = ConsumerSink::new(16);
        let b = ConsumerSink::new(16);
        assert!(quality.register(a.clone()).await);
        assert!(quality.register(b.clone()).await);

        assert!(quality.send(Bytes::from_static(b"hello world")).await);

        assert_eq!(recv_timeout(&a).await.unwrap(), Bytes::from_static(b"hello world"));
        assert_eq!(recv_timeout(&b).await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_in_order_delivery() {
        let quality = Quality::new("demo", "source", 64);
        let sink = ConsumerSink::new(64);
        quality.register(sink.clone()).await;

        for i in 0..50u8 {
            assert!(quality.send(Bytes::from(vec![i])).await);
        }
        quality.close();

        let mut received = Vec::new();
        while let Some(chunk) = recv_timeout(&sink).await {
            received.push(chunk[0]);
        }
        assert_eq!(received, (0..50u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_slow_consumer_keeps_most_recent() {
        let quality = Quality::new("demo", "source", 128);
        let slow = ConsumerSink::new(4);
        quality.register(slow.clone()).await;

        for i in 0..20u8 {
            assert!(quality.send(Bytes::from(vec![i])).await);
        }
        quality.close();

        let mut received = Vec::new();
        while let Some(chunk) = recv_timeout(&slow).await {
            received.push(chunk[0]);
        }
        assert_eq!(received, vec![16, 17, 18, 19]);

        let stats = quality.stats().await;
        assert_eq!(stats.chunks_in, 20);
        assert_eq!(stats.chunks_dropped, 16);
    }

    #[tokio::test]
    async fn test_slow_consumer_does_not_stall_others() {
        let quality = Quality::new("demo", "source", 8);
        let stalled = ConsumerSink::new(1);
        let fast = ConsumerSink::new(1024);
        quality.register(stalled.clone()).await;
        quality.register(fast.clone()).await;

        // Far more than either the ingest or the stalled sink can hold
        for i in 0..500u32 {
            let sent = tokio::time::timeout(
                Duration::from_secs(1),
                quality.send(Bytes::from(i.to_be_bytes().to_vec())),
            )
            .await
            .expect("producer blocked");
            assert!(sent);
        }
        quality.close();

        let mut count = 0;
        while recv_timeout(&fast).await.is_some() {
            count += 1;
        }
        assert_eq!(count, 500);
        assert_eq!(stalled.len(), 1);
    }

    #[tokio::test]
    async fn test_close_ends_consumers() {
        let quality = Quality::new("demo", "source", 16);
        let sink = ConsumerSink::new(16);
        quality.register(sink.clone()).await;

        quality.close();
        assert!(quality.is_closed());
        assert!(recv_timeout(&sink).await.is_none());
        assert!(!quality.send(Bytes::from_static(b"late")).await);
    }

    #[tokio::test]
    async fn test_register_after_finish_closes_sink() {
        let quality = Quality::new("demo", "source", 16);
        let first = ConsumerSink::new(4);
        quality.register(first.clone()).await;
        quality.close();
        assert!(recv_timeout(&first).await.is_none());

        let late = ConsumerSink::new(4);
        assert!(!quality.register(late.clone()).await);
        assert!(late.is_closed());
    }

    #[tokio::test]
    async fn test_unregister_twice_is_noop() {
        let quality = Quality::new("demo", "source", 16);
        let sink = ConsumerSink::new(4);
        quality.register(sink.clone()).await;
        assert_eq!(quality.consumer_count().await, 1);

        assert!(quality.unregister(&sink).await);
        assert!(!quality.unregister(&sink).await);
        assert!(sink.is_closed());
        assert_eq!(quality.consumer_count().await, 0);

        // Unregistered sinks receive nothing further
        quality.send(Bytes::from_static(b"after")).await;
        quality.close();
        tokio::task::yield_now().await;
        assert!(sink.is_empty());
    }
}
