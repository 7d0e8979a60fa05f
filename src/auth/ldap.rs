//! LDAP backend: a producer authenticates by binding as its stream name
//!
//! The bind DN is `cn=<identity>,<user_dn>`. Aliases let several stream names
//! share one directory account: `aliases = { "demo-backup" = "demo" }` binds
//! `demo-backup` as `cn=demo`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{AuthBackend, AuthError};

/// LDAP result code for a rejected bind
const INVALID_CREDENTIALS: u32 = 49;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn default_uri() -> String {
    "ldap://127.0.0.1:389".to_string()
}

/// LDAP backend settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LdapConfig {
    /// Server URI, `ldap://` or `ldaps://`
    pub uri: String,
    /// Base appended to `cn=<identity>` to form the bind DN
    pub user_dn: String,
    /// Stream name → directory identity
    pub aliases: HashMap<String, String>,
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user_dn: String::new(),
            aliases: HashMap::new(),
        }
    }
}

impl LdapConfig {
    pub fn new(uri: impl Into<String>, user_dn: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            user_dn: user_dn.into(),
            aliases: HashMap::new(),
        }
    }

    /// Map a stream name onto another identity
    pub fn alias(mut self, name: impl Into<String>, identity: impl Into<String>) -> Self {
        self.aliases.insert(name.into(), identity.into());
        self
    }
}

/// Backend binding against an LDAP directory
///
/// One connection is kept and reused; it is opened on the first login and
/// reopened after a transport failure.
pub struct LdapBackend {
    config: LdapConfig,
    conn: Mutex<Option<Ldap>>,
}

impl LdapBackend {
    pub fn new(config: LdapConfig) -> Result<Self, AuthError> {
        if config.user_dn.is_empty() {
            return Err(AuthError::Unavailable("ldap user_dn is not set".into()));
        }

        Ok(Self {
            config,
            conn: Mutex::new(None),
        })
    }

    /// Follow aliases from a stream name to a directory identity.
    ///
    /// Chains are followed; a cycle stops after every alias was visited once.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        let mut identity = name;
        for _ in 0..self.config.aliases.len() {
            match self.config.aliases.get(identity) {
                Some(target) => {
                    tracing::debug!(stream = %name, alias = %target, "Using stream alias");
                    identity = target.as_str();
                }
                None => return identity,
            }
        }

        if self.config.aliases.contains_key(identity) {
            tracing::warn!(stream = %name, "Alias cycle, binding with last identity");
        }
        identity
    }

    /// Bind DN for a stream name
    pub fn bind_dn(&self, name: &str) -> String {
        format!("cn={},{}", self.resolve_alias(name), self.config.user_dn)
    }

    async fn connect(&self) -> Result<Ldap, AuthError> {
        let settings = LdapConnSettings::new().set_conn_timeout(CONNECT_TIMEOUT);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.config.uri)
            .await
            .map_err(|e| AuthError::Unavailable(format!("{}: {}", self.config.uri, e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!(error = %e, "LDAP connection error");
            }
        });

        tracing::debug!(uri = %self.config.uri, "LDAP connection opened");
        Ok(ldap)
    }
}

#[async_trait]
impl AuthBackend for LdapBackend {
    async fn login(&self, identity: &str, secret: &str) -> Result<bool, AuthError> {
        // An empty password is an anonymous bind, which most servers accept
        if secret.is_empty() {
            return Ok(false);
        }

        let dn = self.bind_dn(identity);
        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            *conn = Some(self.connect().await?);
        }
        let ldap = conn
            .as_mut()
            .ok_or_else(|| AuthError::Unavailable("ldap connection lost".into()))?;

        match ldap.simple_bind(&dn, secret).await {
            Ok(result) if result.rc == 0 => Ok(true),
            Ok(result) if result.rc == INVALID_CREDENTIALS => {
                tracing::debug!(dn = %dn, "LDAP bind rejected");
                Ok(false)
            }
            Ok(result) => Err(AuthError::Verification(format!(
                "ldap bind for {} returned code {}: {}",
                dn, result.rc, result.text
            ))),
            Err(e) => {
                // Reconnect on the next login
                *conn = None;
                Err(AuthError::Unavailable(e.to_string()))
            }
        }
    }

    async fn close(&self) {
        if let Some(mut ldap) = self.conn.lock().await.take() {
            if let Err(e) = ldap.unbind().await {
                tracing::debug!(error = %e, "LDAP unbind failed");
            }
        }
    }

    fn name(&self) -> &'static str {
        "ldap"
    }
}

impl std::fmt::Debug for LdapBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(config: LdapConfig) -> LdapBackend {
        LdapBackend::new(config).unwrap()
    }

    #[test]
    fn test_bind_dn_without_alias() {
        let backend = backend(LdapConfig::new("ldap://127.0.0.1:389", "ou=users,dc=example,dc=org"));
        assert_eq!(backend.bind_dn("demo"), "cn=demo,ou=users,dc=example,dc=org");
    }

    #[test]
    fn test_alias_chain_resolved() {
        let backend = backend(
            LdapConfig::new("ldap://127.0.0.1:389", "dc=example")
                .alias("demo-backup", "demo-main")
                .alias("demo-main", "demo"),
        );

        assert_eq!(backend.resolve_alias("demo-backup"), "demo");
        assert_eq!(backend.resolve_alias("demo-main"), "demo");
        assert_eq!(backend.resolve_alias("other"), "other");
        assert_eq!(backend.bind_dn("demo-backup"), "cn=demo,dc=example");
    }

    #[test]
    fn test_alias_cycle_terminates() {
        let backend = backend(
            LdapConfig::new("ldap://127.0.0.1:389", "dc=example")
                .alias("a", "b")
                .alias("b", "a"),
        );

        let identity = backend.resolve_alias("a");
        assert!(identity == "a" || identity == "b");
    }

    #[test]
    fn test_missing_user_dn_rejected() {
        let err = LdapBackend::new(LdapConfig::default()).unwrap_err();
        assert!(matches!(err, AuthError::Unavailable(_)));
    }

    #[test]
    fn test_config_deserialize() {
        let config: LdapConfig = toml::from_str(
            r#"
            uri = "ldap://ldap.example.org"
            user_dn = "ou=streamers,dc=example,dc=org"
            [aliases]
            "demo-backup" = "demo"
            "#,
        )
        .unwrap();

        assert_eq!(config.uri, "ldap://ldap.example.org");
        assert_eq!(config.user_dn, "ou=streamers,dc=example,dc=org");
        assert_eq!(config.aliases["demo-backup"], "demo");
        assert_eq!(LdapConfig::default().uri, "ldap://127.0.0.1:389");
    }

    #[tokio::test]
    async fn test_empty_password_refused_without_bind() {
        // Port 1 is never contacted: the empty secret is refused up front
        let backend = backend(LdapConfig::new("ldap://127.0.0.1:1", "dc=example"));
        assert!(!backend.login("demo", "").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_backend_error() {
        let backend = backend(LdapConfig::new("ldap://127.0.0.1:1", "dc=example"));
        let err = backend.login("demo", "secret").await.unwrap_err();
        assert!(matches!(err, AuthError::Unavailable(_)));
        backend.close().await;
    }
}
