//! # fanout-rs
//!
//! A live byte-stream fanout server. One producer per stream name pushes an
//! opaque byte stream; any number of viewers receive it. Slow viewers lose the
//! oldest buffered chunks instead of slowing the producer or each other.
//!
//! A client connects over TCP and sends one identifier line:
//!
//! - `name:credential` publishes `name` (the credential may be empty in open mode)
//! - `name` watches the default quality of `name`
//! - `name@quality` watches a specific quality
//!
//! Everything after the newline is stream payload.
//!
//! ```no_run
//! use fanout_rs::{FanoutServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> fanout_rs::Result<()> {
//!     let config = ServerConfig::with_addr("0.0.0.0:9710".parse().unwrap());
//!     let server = FanoutServer::new(config);
//!     server.run().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`registry`]: streams, qualities and the per-quality broadcast loop
//! - [`session`]: identifier parsing and the producer/viewer pumps
//! - [`server`]: TCP accept loop
//! - [`auth`]: pluggable producer authentication
//! - [`forward`]: relaying streams to other servers
//! - [`stats`]: counters and snapshots

pub mod auth;
pub mod config;
pub mod error;
pub mod forward;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use auth::{AuthBackend, AuthConfig};
pub use config::FileConfig;
pub use error::{Error, Result};
pub use forward::{ForwardTarget, Forwarder, ForwardingConfig};
pub use registry::{ConsumerSink, Quality, RegistryConfig, Stream, StreamRegistry};
pub use server::{FanoutServer, ServerConfig};
pub use session::StreamIdentifier;
