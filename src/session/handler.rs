//! Producer and viewer session handler
//!
//! Reads the identifier line, then either publishes the connection's bytes
//! into a fresh stream or copies an existing quality to the connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::identifier::StreamIdentifier;
use super::state::{Role, SessionState};
use crate::auth::AuthBackend;
use crate::error::{Error, Result};
use crate::registry::{ConsumerSink, Quality, RegistryError, Stream, StreamRegistry};
use crate::server::config::ServerConfig;

/// Message written to a viewer whose stream is not live
pub const STREAM_INACTIVE_MESSAGE: &[u8] = b"This stream is inactive.\n";

/// Message written to a viewer whose quality does not exist
pub const QUALITY_MISSING_MESSAGE: &[u8] = b"This stream quality is not available.\n";

/// One accepted connection
pub struct Session<S> {
    state: SessionState,
    socket: S,
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    auth: Option<Arc<dyn AuthBackend>>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        id: u64,
        socket: S,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<StreamRegistry>,
        auth: Option<Arc<dyn AuthBackend>>,
    ) -> Self {
        Self {
            state: SessionState::new(id, peer_addr),
            socket,
            config,
            registry,
            auth,
        }
    }

    /// Session state (phase, resolved stream, statistics)
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the session to completion and close the transport
    pub async fn run(mut self) -> Result<()> {
        let result = self.run_inner().await;

        self.state.close();
        let _ = self.socket.shutdown().await;

        tracing::debug!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            stream = ?self.state.stream,
            bytes_received = self.state.stats.bytes_received,
            bytes_sent = self.state.stats.bytes_sent,
            duration_ms = self.state.stats.duration().as_millis() as u64,
            "Session closed"
        );

        result
    }

    async fn run_inner(&mut self) -> Result<()> {
        let (token, leftover) = self.read_identifier().await?;

        match StreamIdentifier::parse(&token)? {
            StreamIdentifier::Producer { name, credential } => {
                let quality = self.registry.config().default_quality.clone();
                self.state.resolve(Role::Producer, &name, &quality);
                self.run_producer(&name, &credential, &quality, leftover).await
            }
            StreamIdentifier::Consumer { name, quality } => {
                self.state.resolve(Role::Consumer, &name, &quality);
                self.run_consumer(&name, &quality).await
            }
        }
    }

    /// Read the identifier line; bytes after the newline are returned as the
    /// start of the payload.
    async fn read_identifier(&mut self) -> Result<(String, Bytes)> {
        let timeout = self.config.handshake_timeout;
        let max_len = self.config.max_identifier_len;

        let (line, leftover) =
            tokio::time::timeout(timeout, read_line(&mut self.socket, max_len))
                .await
                .map_err(|_| Error::HandshakeTimeout(timeout))??;

        let token = String::from_utf8(line.to_vec())
            .map_err(|_| Error::InvalidIdentifier("identifier is not valid UTF-8".into()))?;
        Ok((token, leftover))
    }

    async fn authenticate(&self, name: &str, credential: &str) -> Result<()> {
        // No backend configured: open mode
        let Some(auth) = &self.auth else {
            return Ok(());
        };

        match auth.login(name, credential).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(
                    session_id = self.state.id,
                    peer = %self.state.peer_addr,
                    stream = %name,
                    "Failed to authenticate producer"
                );
                Err(Error::AuthenticationFailed(name.to_string()))
            }
            Err(e) => {
                tracing::warn!(
                    session_id = self.state.id,
                    stream = %name,
                    backend = auth.name(),
                    error = %e,
                    "Authentication backend error"
                );
                Err(e.into())
            }
        }
    }

    async fn run_producer(
        &mut self,
        name: &str,
        credential: &str,
        quality_name: &str,
        leftover: Bytes,
    ) -> Result<()> {
        self.authenticate(name, credential).await?;

        let (stream, quality) = self
            .registry
            .create_with_quality(name, quality_name)
            .await
            .map_err(|e| {
                tracing::warn!(session_id = self.state.id, stream = %name, error = %e, "Producer rejected");
                e
            })?;

        tracing::info!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            stream = %name,
            quality = %quality_name,
            "Publisher registered"
        );

        self.state.activate();
        let result = self.pump_ingest(&quality, leftover).await;

        self.teardown_stream(&stream).await;
        result
    }

    async fn teardown_stream(&self, stream: &Stream) {
        stream.close().await;
        self.registry.delete(stream.name()).await;

        tracing::info!(
            session_id = self.state.id,
            stream = %stream.name(),
            "Publisher disconnected"
        );
    }

    async fn pump_ingest(&mut self, quality: &Quality, leftover: Bytes) -> Result<()> {
        if !leftover.is_empty() {
            self.state.stats.on_received(leftover.len());
            quality.send(leftover).await;
        }

        let mut buf = BytesMut::zeroed(self.config.read_size);
        loop {
            let read = tokio::time::timeout(self.config.read_timeout, self.socket.read(&mut buf[..])).await;

            let n = match read {
                Ok(Ok(0)) => {
                    tracing::debug!(session_id = self.state.id, "Producer sent end of stream");
                    return Ok(());
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "producer read timed out",
                    )))
                }
            };

            let chunk = Bytes::copy_from_slice(&buf[..n]);
            self.state.stats.on_received(n);

            if !quality.send(chunk).await {
                // Quality was closed underneath us
                return Ok(());
            }
        }
    }

    async fn lookup(
        &self,
        name: &str,
        quality_name: &str,
    ) -> std::result::Result<(Arc<Stream>, Arc<Quality>), RegistryError> {
        let stream = self.registry.get(name).await?;
        let quality = stream.get_quality(quality_name).await?;
        Ok((stream, quality))
    }

    async fn run_consumer(&mut self, name: &str, quality_name: &str) -> Result<()> {
        let (stream, quality) = match self.lookup(name, quality_name).await {
            Ok(found) => found,
            Err(e) => {
                tracing::info!(session_id = self.state.id, error = %e, "Kicking viewer");
                let message = match e {
                    RegistryError::QualityNotFound { .. } => QUALITY_MISSING_MESSAGE,
                    _ => STREAM_INACTIVE_MESSAGE,
                };
                let _ = tokio::time::timeout(
                    self.config.write_timeout,
                    self.socket.write_all(message),
                )
                .await;
                return Err(e.into());
            }
        };

        let sink = ConsumerSink::new(self.config.viewer_queue_capacity);
        quality.register(sink.clone()).await;
        let viewers = stream.increment_viewer_count();

        tracing::info!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            stream = %name,
            quality = %quality_name,
            viewers = viewers,
            "Viewer added"
        );

        self.state.activate();
        let result = self.pump_viewer(&sink).await;

        quality.unregister(&sink).await;
        let viewers = stream.decrement_viewer_count();

        tracing::debug!(
            session_id = self.state.id,
            stream = %name,
            viewers = viewers,
            "Viewer removed"
        );

        result
    }

    async fn pump_viewer(&mut self, sink: &ConsumerSink) -> Result<()> {
        let write_timeout = self.config.write_timeout;
        let (mut reader, mut writer) = tokio::io::split(&mut self.socket);
        let mut discard = [0u8; 256];

        loop {
            tokio::select! {
                chunk = sink.recv() => {
                    let chunk = match chunk {
                        Some(chunk) if !chunk.is_empty() => chunk,
                        _ => {
                            tracing::debug!(session_id = self.state.id, "Removing viewer at end of stream");
                            return Ok(());
                        }
                    };

                    match tokio::time::timeout(write_timeout, writer.write_all(&chunk)).await {
                        Ok(Ok(())) => self.state.stats.on_sent(chunk.len()),
                        Ok(Err(e)) => return Err(e.into()),
                        Err(_) => {
                            return Err(Error::Io(io::Error::new(
                                io::ErrorKind::TimedOut,
                                "viewer write timed out",
                            )))
                        }
                    }
                }
                read = reader.read(&mut discard) => {
                    // Viewers have nothing to say; input only tells us they left
                    match read {
                        Ok(0) | Err(_) => {
                            tracing::debug!(session_id = self.state.id, "Viewer disconnected");
                            return Ok(());
                        }
                        Ok(_) => {}
                    }
                }
            }
        }
    }
}

async fn read_line<R>(reader: &mut R, max_len: usize) -> Result<(BytesMut, Bytes)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(max_len.min(1024));

    loop {
        if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            if pos > max_len {
                return Err(Error::InvalidIdentifier("identifier too long".into()));
            }
            let line = buf.split_to(pos + 1);
            return Ok((line, buf.freeze()));
        }
        if buf.len() > max_len {
            return Err(Error::InvalidIdentifier("identifier too long".into()));
        }

        if reader.read_buf(&mut buf).await? == 0 {
            if buf.is_empty() {
                return Err(Error::InvalidIdentifier(
                    "connection closed before identifier".into(),
                ));
            }
            // Identifier without trailing newline, terminated by EOF
            return Ok((buf, Bytes::new()));
        }
    }
}
