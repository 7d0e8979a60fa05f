//! Producer authentication
//!
//! A producer announces itself as `name:credential`; the configured
//! [`AuthBackend`] decides whether that pair may publish. The backend is
//! chosen once at startup from [`AuthConfig`] and shared by every connection.
//! Running without a backend is open mode: every producer is accepted.

pub mod basic;
pub mod bypass;
pub mod config;
pub mod ldap;

use async_trait::async_trait;
use thiserror::Error;

pub use basic::{hash_password, BasicBackend};
pub use bypass::BypassBackend;
pub use config::{AuthBackendKind, AuthConfig, BasicConfig};
pub use ldap::{LdapBackend, LdapConfig};

/// Error type for authentication backends
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// A stored credential could not be parsed
    #[error("invalid password hash for {identity}: {reason}")]
    InvalidHash { identity: String, reason: String },
    /// Hashing or verification failed for a reason other than a mismatch
    #[error("password verification failed: {0}")]
    Verification(String),
    /// The backend itself is unusable
    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),
}

/// Authentication backend trait
///
/// Implement this trait to add new credential stores.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Check an identity/secret pair.
    ///
    /// `Ok(false)` is a clean rejection; `Err` means the check itself failed.
    /// Callers treat both as a refusal.
    async fn login(&self, identity: &str, secret: &str) -> Result<bool, AuthError>;

    /// Release backend resources at shutdown
    async fn close(&self) {}

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
