//! Stream forwarding
//!
//! Relays selected streams to other fanout servers as they go live. The
//! forwarder listens for new-stream notifications; for each configured stream
//! it attaches a consumer sink to the default quality and, per target, opens a
//! TCP connection, sends the target's identifier line and copies the stream
//! until either side ends.
//!
//! ```toml
//! [forwarding]
//! demo = [
//!     { addr = "relay-1.example.net:9710", identifier = "%name:relay-secret" },
//!     { addr = "relay-2.example.net:9710" },
//! ]
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::registry::{ConsumerSink, Quality, StreamRegistry, DEFAULT_SINK_CAPACITY};

/// Placeholder replaced by the stream name in target identifiers
pub const NAME_PLACEHOLDER: &str = "%name";

/// Capacity of the forwarder's new-stream notification queue
const EVENT_QUEUE_CAPACITY: usize = 8;

/// How long to wait for a new stream's default quality to appear
const QUALITY_WAIT_ATTEMPTS: u32 = 20;
const QUALITY_WAIT_STEP: Duration = Duration::from_millis(50);

fn default_identifier() -> String {
    format!("{}:", NAME_PLACEHOLDER)
}

/// A remote server receiving a forwarded stream
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForwardTarget {
    /// `host:port` of the remote fanout server
    pub addr: String,
    /// Identifier line sent on connect; `%name` is replaced by the stream name
    #[serde(default = "default_identifier")]
    pub identifier: String,
}

impl ForwardTarget {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            identifier: default_identifier(),
        }
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Identifier line for a given stream
    pub fn identifier_for(&self, stream: &str) -> String {
        self.identifier.replace(NAME_PLACEHOLDER, stream)
    }
}

/// Stream name → targets
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ForwardingConfig {
    pub routes: HashMap<String, Vec<ForwardTarget>>,
}

impl ForwardingConfig {
    /// Add a target for a stream
    pub fn route(mut self, stream: impl Into<String>, target: ForwardTarget) -> Self {
        self.routes.entry(stream.into()).or_default().push(target);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.routes.values().all(Vec::is_empty)
    }
}

/// Relays configured streams to remote servers
pub struct Forwarder {
    registry: Arc<StreamRegistry>,
    config: ForwardingConfig,
    queue_capacity: usize,
}

impl Forwarder {
    pub fn new(registry: Arc<StreamRegistry>, config: ForwardingConfig) -> Self {
        Self {
            registry,
            config,
            queue_capacity: DEFAULT_SINK_CAPACITY,
        }
    }

    /// Set the per-target consumer queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Start forwarding in the background; `None` when nothing is configured
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        if self.config.is_empty() {
            return None;
        }
        Some(tokio::spawn(self.run()))
    }

    /// Follow new-stream notifications until the registry drops us.
    ///
    /// Each routed stream is handled on its own task so a slow stream never
    /// holds up the notification queue.
    pub async fn run(self) {
        let (tx, mut events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let subscriber = self.registry.subscribe(tx).await;
        tracing::info!(streams = self.config.routes.len(), "Stream forwarding initialized");

        while let Some(name) = events.recv().await {
            let Some(targets) = self.config.routes.get(&name) else {
                continue;
            };

            tokio::spawn(forward_stream(
                Arc::clone(&self.registry),
                name,
                targets.clone(),
                self.queue_capacity,
            ));
        }

        self.registry.unsubscribe(subscriber).await;
    }
}

async fn forward_stream(
    registry: Arc<StreamRegistry>,
    name: String,
    targets: Vec<ForwardTarget>,
    capacity: usize,
) {
    let quality = match wait_for_quality(&registry, &name).await {
        Ok(quality) => quality,
        Err(e) => {
            tracing::warn!(stream = %name, error = %e, "Cannot forward stream");
            return;
        }
    };

    for target in targets {
        tracing::info!(stream = %name, target = %target.addr, "Starting forwarding");
        let quality = Arc::clone(&quality);
        let name = name.clone();

        tokio::spawn(async move {
            match forward(&quality, &name, &target, capacity).await {
                Ok(()) => tracing::info!(stream = %name, target = %target.addr, "Forwarding ended"),
                Err(e) => tracing::warn!(stream = %name, target = %target.addr, error = %e, "Forwarding failed"),
            }
        });
    }
}

/// Streams created without their quality get a moment to add it
async fn wait_for_quality(registry: &StreamRegistry, name: &str) -> Result<Arc<Quality>> {
    let quality_name = &registry.config().default_quality;
    let mut attempt = 0;

    loop {
        let stream = registry.get(name).await?;
        match stream.get_quality(quality_name).await {
            Ok(quality) => return Ok(quality),
            Err(e) if attempt >= QUALITY_WAIT_ATTEMPTS => return Err(Error::from(e)),
            Err(_) => {
                attempt += 1;
                tokio::time::sleep(QUALITY_WAIT_STEP).await;
            }
        }
    }
}

async fn forward(quality: &Quality, name: &str, target: &ForwardTarget, capacity: usize) -> Result<()> {
    // Register first so chunks arriving while connecting are buffered
    let sink = ConsumerSink::new(capacity);
    quality.register(sink.clone()).await;

    let result = async {
        let mut socket = TcpStream::connect(&target.addr).await?;
        socket.set_nodelay(true)?;
        socket
            .write_all(format!("{}\n", target.identifier_for(name)).as_bytes())
            .await?;

        while let Some(chunk) = sink.recv().await {
            if chunk.is_empty() {
                break;
            }
            socket.write_all(&chunk).await?;
        }

        socket.shutdown().await?;
        Ok(())
    }
    .await;

    quality.unregister(&sink).await;
    result
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn test_identifier_substitution() {
        let target = ForwardTarget::new("127.0.0.1:9710");
        assert_eq!(target.identifier_for("demo"), "demo:");

        let target = target.identifier("%name-mirror:secret");
        assert_eq!(target.identifier_for("demo"), "demo-mirror:secret");
    }

    #[test]
    fn test_config_deserialize() {
        let config: ForwardingConfig = toml::from_str(
            r#"
            demo = [
                { addr = "127.0.0.1:9710", identifier = "%name:key" },
                { addr = "127.0.0.1:9711" },
            ]
            "#,
        )
        .unwrap();

        let targets = &config.routes["demo"];
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].identifier, "%name:key");
        assert_eq!(targets[1].identifier, "%name:");
        assert!(!config.is_empty());
        assert!(ForwardingConfig::default().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_disabled_without_routes() {
        let registry = Arc::new(StreamRegistry::new());
        assert!(Forwarder::new(registry, ForwardingConfig::default())
            .spawn()
            .is_none());
    }

    #[tokio::test]
    async fn test_forwards_new_stream() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();

        let registry = Arc::new(StreamRegistry::new());
        let config = ForwardingConfig::default().route(
            "demo",
            ForwardTarget::new(upstream_addr.to_string()).identifier("%name:relay"),
        );
        let handle = Forwarder::new(Arc::clone(&registry), config).spawn().unwrap();

        // Let the forwarder subscribe
        while registry.subscriber_count().await == 0 {
            tokio::task::yield_now().await;
        }

        let stream = registry.create("demo").await.unwrap();
        let quality = stream.create_quality("source").await.unwrap();
        while quality.consumer_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        quality.send(Bytes::from_static(b"payload")).await;
        stream.close().await;

        let (mut socket, _) = upstream.accept().await.unwrap();
        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), socket.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"demo:relay\npayload");

        handle.abort();
    }

    #[tokio::test]
    async fn test_stalled_stream_does_not_block_others() {
        let slow_upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let fast_upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let registry = Arc::new(StreamRegistry::new());
        let config = ForwardingConfig::default()
            .route("slow", ForwardTarget::new(slow_upstream.local_addr().unwrap().to_string()))
            .route("fast", ForwardTarget::new(fast_upstream.local_addr().unwrap().to_string()));
        let handle = Forwarder::new(Arc::clone(&registry), config).spawn().unwrap();

        while registry.subscriber_count().await == 0 {
            tokio::task::yield_now().await;
        }

        // "slow" never gets a quality; enough unrouted streams follow to fill
        // the notification queue while it is being waited on
        registry.create("slow").await.unwrap();
        tokio::task::yield_now().await;
        for i in 0..EVENT_QUEUE_CAPACITY + 1 {
            registry.create(&format!("other{}", i)).await.unwrap();
            tokio::task::yield_now().await;
        }
        let (stream, quality) = registry.create_with_quality("fast", "source").await.unwrap();

        let registered = tokio::time::timeout(Duration::from_millis(500), async {
            while quality.consumer_count().await == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(registered.is_ok(), "fast stream was never forwarded");

        quality.send(Bytes::from_static(b"data")).await;
        stream.close().await;

        let (mut socket, _) = fast_upstream.accept().await.unwrap();
        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), socket.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"fast:\ndata");

        handle.abort();
    }
}
