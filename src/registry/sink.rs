//! Bounded consumer sinks
//!
//! A [`ConsumerSink`] is the queue between a quality's broadcast loop (the
//! only writer) and one viewer task (the only reader). Writes never wait: when
//! the queue is full the oldest buffered chunk is discarded to make room, so a
//! slow viewer only ever loses its own backlog.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::Notify;

/// Default number of chunks a viewer may fall behind before drops start
pub const DEFAULT_SINK_CAPACITY: usize = 1024;

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a consumer sink, used to unregister a specific viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl std::fmt::Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

/// Result of a non-blocking push into a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The chunk was queued without loss
    Queued,
    /// The queue was full; the oldest chunk was discarded
    DroppedOldest,
    /// The sink is closed; the chunk was discarded
    Closed,
}

#[derive(Debug, Default)]
struct SinkQueue {
    chunks: VecDeque<Bytes>,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    queue: Mutex<SinkQueue>,
    notify: Notify,
}

/// Bounded drop-oldest FIFO of byte chunks
///
/// Cloning yields another handle to the same queue; the quality keeps one
/// handle and the viewer task keeps the other.
#[derive(Debug, Clone)]
pub struct ConsumerSink {
    id: SinkId,
    shared: Arc<Shared>,
}

impl ConsumerSink {
    /// Create a sink holding at most `capacity` chunks (clamped to at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            id: SinkId(NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed)),
            shared: Arc::new(Shared {
                capacity,
                queue: Mutex::new(SinkQueue {
                    chunks: VecDeque::with_capacity(capacity.min(64)),
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Sink identity
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Maximum number of buffered chunks
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of chunks currently buffered
    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    /// Whether no chunk is buffered
    pub fn is_empty(&self) -> bool {
        self.lock().chunks.is_empty()
    }

    /// Whether the sink has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Enqueue a chunk without waiting, discarding the oldest one if full
    pub(crate) fn push(&self, chunk: Bytes) -> PushOutcome {
        let outcome = {
            let mut queue = self.lock();
            if queue.closed {
                return PushOutcome::Closed;
            }

            let outcome = if queue.chunks.len() >= self.shared.capacity {
                queue.chunks.pop_front();
                PushOutcome::DroppedOldest
            } else {
                PushOutcome::Queued
            };
            queue.chunks.push_back(chunk);
            outcome
        };

        self.shared.notify.notify_one();
        outcome
    }

    /// Mark the sink closed.
    ///
    /// Returns `true` only for the call that actually closed it. Chunks
    /// already buffered stay readable.
    pub(crate) fn close(&self) -> bool {
        let closed_now = {
            let mut queue = self.lock();
            !std::mem::replace(&mut queue.closed, true)
        };

        if closed_now {
            self.shared.notify.notify_one();
        }
        closed_now
    }

    /// Take the next chunk if one is buffered
    pub fn try_recv(&self) -> Option<Bytes> {
        self.lock().chunks.pop_front()
    }

    /// Wait for the next chunk.
    ///
    /// Returns `None` once the sink is closed and fully drained.
    pub async fn recv(&self) -> Option<Bytes> {
        loop {
            {
                let mut queue = self.lock();
                if let Some(chunk) = queue.chunks.pop_front() {
                    return Some(chunk);
                }
                if queue.closed {
                    return None;
                }
            }

            // A push or close between the unlock above and this await leaves a
            // stored permit, so the wakeup is not lost.
            self.shared.notify.notified().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkQueue> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
