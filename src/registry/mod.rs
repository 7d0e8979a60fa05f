//! Stream registry and fanout engine
//!
//! The registry tracks live streams by name. Each stream holds one or more
//! qualities, and each quality copies its producer's chunks to every viewer.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<StreamRegistry>
//!                  ┌──────────────────────────┐
//!                  │ streams: HashMap<name,   │──► new-stream notifications
//!                  │   Arc<Stream> {          │    (forwarders, ...)
//!                  │     qualities: HashMap<  │
//!                  │       name, Quality>     │
//!                  │     viewers: AtomicUsize │
//!                  │   }>                     │
//!                  └────────────┬─────────────┘
//!                               │
//!      ┌────────────────────────┼────────────────────────┐
//!      ▼                        ▼                        ▼
//! [Producer]               [Viewer]                 [Viewer]
//! quality.send()           sink.recv()              sink.recv()
//!      │                        ▲                        ▲
//!      └──► broadcast task ─────┴── push (drop-oldest) ──┘
//! ```
//!
//! # Zero-Copy Design
//!
//! Chunks are `bytes::Bytes`, so every consumer sink shares the producer's
//! allocation; fanout only bumps a reference count.

pub mod config;
pub mod error;
pub mod quality;
pub mod rendezvous;
pub mod sink;
pub mod store;
pub mod stream;

pub use config::{RegistryConfig, DEFAULT_QUALITY};
pub use error::RegistryError;
pub use quality::Quality;
pub use rendezvous::{Rendezvous, SdpKind, SessionDescription};
pub use sink::{ConsumerSink, PushOutcome, SinkId, DEFAULT_SINK_CAPACITY};
pub use store::{StreamRegistry, SubscriberId};
pub use stream::Stream;
