//! Fanout server listener
//!
//! Handles the TCP accept loop and spawns one session task per connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::auth::AuthBackend;
use crate::error::Result;
use crate::registry::{RegistryConfig, StreamRegistry};
use crate::server::config::ServerConfig;
use crate::session::Session;

/// Fanout server
pub struct FanoutServer {
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    auth: Option<Arc<dyn AuthBackend>>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl FanoutServer {
    /// Create a new server in open mode (no authentication backend)
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(StreamRegistry::new()), None)
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(
        config: ServerConfig,
        registry_config: RegistryConfig,
        auth: Option<Arc<dyn AuthBackend>>,
    ) -> Self {
        Self::with_registry(
            config,
            Arc::new(StreamRegistry::with_config(registry_config)),
            auth,
        )
    }

    /// Create a new server sharing an existing registry
    pub fn with_registry(
        config: ServerConfig,
        registry: Arc<StreamRegistry>,
        auth: Option<Arc<dyn AuthBackend>>,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            registry,
            auth,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(listener) => result,
        }
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Fanout server listening");

        let stats_handle = self.spawn_stats_task();
        let result = self.accept_loop(&listener).await;

        if let Some(handle) = stats_handle {
            handle.abort();
        }
        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let session = Session::new(
            session_id,
            socket,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.registry),
            self.auth.clone(),
        );

        tokio::spawn(async move {
            // Held for the lifetime of the session
            let _permit = permit;

            if let Err(e) = session.run().await {
                if e.is_client_error() {
                    tracing::debug!(session_id = session_id, error = %e, "Session refused");
                } else {
                    tracing::warn!(session_id = session_id, error = %e, "Session error");
                }
            }
        });
    }

    fn spawn_stats_task(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.stats_interval;
        if interval.is_zero() {
            return None;
        }

        let registry = Arc::clone(&self.registry);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let stats = registry.stats().await;
                tracing::info!(
                    streams = stats.stream_count(),
                    viewers = stats.total_viewers(),
                    "Registry statistics"
                );
                for stream in &stats.streams {
                    let dropped: u64 = stream.qualities.iter().map(|q| q.chunks_dropped).sum();
                    tracing::debug!(
                        stream = %stream.name,
                        viewers = stream.viewers,
                        bytes_in = stream.bytes_in(),
                        dropped = dropped,
                        "Stream statistics"
                    );
                }
            }
        }))
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

impl std::fmt::Debug for FanoutServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutServer")
            .field("config", &self.config)
            .field("auth", &self.auth.as_ref().map(|a| a.name()))
            .finish_non_exhaustive()
    }
}
