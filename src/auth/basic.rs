//! Basic backend: a static map of identity to Argon2 password hash
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`), as
//! produced by [`hash_password`] or `fanoutd hash-password`.

use std::collections::HashMap;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;

use super::{AuthBackend, AuthError};

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Verification(format!("password hash failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Verification(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Verification(e.to_string())),
    }
}

/// Backend checking producers against configured password hashes
#[derive(Debug, Clone)]
pub struct BasicBackend {
    credentials: HashMap<String, String>,
}

impl BasicBackend {
    /// Create a backend, rejecting any hash that is not a valid PHC string
    pub fn new(credentials: HashMap<String, String>) -> Result<Self, AuthError> {
        for (identity, hash) in &credentials {
            PasswordHash::new(hash).map_err(|e| AuthError::InvalidHash {
                identity: identity.clone(),
                reason: e.to_string(),
            })?;
        }

        if credentials.is_empty() {
            tracing::warn!("Basic authentication has no credentials; every producer will be refused");
        }

        Ok(Self { credentials })
    }

    /// Number of configured identities
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl AuthBackend for BasicBackend {
    async fn login(&self, identity: &str, secret: &str) -> Result<bool, AuthError> {
        let Some(hash) = self.credentials.get(identity).cloned() else {
            tracing::debug!(identity = %identity, "Unknown identity");
            return Ok(false);
        };

        // Argon2 is deliberately slow; keep it off the async workers
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || verify_password(&secret, &hash))
            .await
            .map_err(|e| AuthError::Verification(e.to_string()))?
    }

    fn name(&self) -> &'static str {
        "basic"
    }
}
