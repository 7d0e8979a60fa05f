//! Bypass backend: accepts every credential for every name

use async_trait::async_trait;

use super::{AuthBackend, AuthError};

/// Backend that opens the server to every producer
#[derive(Debug, Clone, Copy, Default)]
pub struct BypassBackend;

impl BypassBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthBackend for BypassBackend {
    async fn login(&self, _identity: &str, _secret: &str) -> Result<bool, AuthError> {
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "bypass"
    }
}
