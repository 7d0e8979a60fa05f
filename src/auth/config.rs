//! Authentication configuration

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use super::{AuthBackend, AuthError, BasicBackend, BypassBackend, LdapBackend, LdapConfig};

/// Which backend checks producer credentials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthBackendKind {
    /// No backend: every producer is accepted
    #[default]
    None,
    /// Explicit accept-all backend
    Bypass,
    /// Static identity → Argon2 hash map
    Basic,
    /// Bind against an LDAP directory
    Ldap,
}

/// Credentials for the basic backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    /// Identity → PHC password hash
    pub credentials: HashMap<String, String>,
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub backend: AuthBackendKind,
    pub basic: BasicConfig,
    pub ldap: LdapConfig,
}

impl AuthConfig {
    /// Select the backend kind
    pub fn backend(mut self, kind: AuthBackendKind) -> Self {
        self.backend = kind;
        self
    }

    /// Add a basic credential
    pub fn credential(mut self, identity: impl Into<String>, hash: impl Into<String>) -> Self {
        self.basic.credentials.insert(identity.into(), hash.into());
        self
    }

    /// Set the LDAP backend settings
    pub fn ldap(mut self, config: LdapConfig) -> Self {
        self.ldap = config;
        self
    }

    /// Build the configured backend; `None` means open mode
    pub fn init(&self) -> Result<Option<Arc<dyn AuthBackend>>, AuthError> {
        let backend: Option<Arc<dyn AuthBackend>> = match self.backend {
            AuthBackendKind::None => None,
            AuthBackendKind::Bypass => Some(Arc::new(BypassBackend::new())),
            AuthBackendKind::Basic => {
                Some(Arc::new(BasicBackend::new(self.basic.credentials.clone())?))
            }
            AuthBackendKind::Ldap => Some(Arc::new(LdapBackend::new(self.ldap.clone())?)),
        };

        match &backend {
            Some(backend) => tracing::info!(backend = backend.name(), "Authentication backend initialized"),
            None => tracing::warn!("No authentication backend, accepting every producer"),
        }

        Ok(backend)
    }
}
