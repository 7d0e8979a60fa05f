//! Error types for the fanout server

use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthError;
use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Transport read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream or quality table failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The authentication backend failed to check a credential
    #[error("authentication backend error: {0}")]
    Auth(#[from] AuthError),

    /// The backend rejected the producer's credential
    #[error("authentication failed for stream {0}")]
    AuthenticationFailed(String),

    /// The connection identifier could not be parsed
    #[error("invalid stream identifier: {0}")]
    InvalidIdentifier(String),

    /// The client did not send its identifier in time
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Errors caused by the peer rather than by this server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Registry(_)
                | Error::AuthenticationFailed(_)
                | Error::InvalidIdentifier(_)
                | Error::HandshakeTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_registry_error() {
        let err: Error = RegistryError::StreamNotFound("demo".into()).into();
        assert_eq!(err.to_string(), "stream not found: demo");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_io_is_not_client_error() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(!err.is_client_error());
    }
}
