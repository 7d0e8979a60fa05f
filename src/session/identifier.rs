//! Connection identifier parsing
//!
//! Every connection opens with a single text token:
//!
//! - `name:credential` publishes `name` (the credential may itself contain `:`)
//! - `name` watches the default quality of `name`
//! - `name@quality` watches a specific quality

use crate::error::{Error, Result};
use crate::registry::DEFAULT_QUALITY;

/// Separator between stream name and producer credential
pub const CREDENTIAL_SEPARATOR: char = ':';

/// Separator between stream name and requested quality
pub const QUALITY_SEPARATOR: char = '@';

/// Role and target resolved from a connection identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamIdentifier {
    /// Streamer publishing under `name`
    Producer { name: String, credential: String },
    /// Viewer of `quality` within `name`
    Consumer { name: String, quality: String },
}

impl StreamIdentifier {
    /// Parse an identifier token
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();

        if let Some((name, credential)) = token.split_once(CREDENTIAL_SEPARATOR) {
            if name.is_empty() {
                return Err(Error::InvalidIdentifier("empty stream name".into()));
            }
            return Ok(StreamIdentifier::Producer {
                name: name.to_string(),
                credential: credential.to_string(),
            });
        }

        let (name, quality) = match token.split_once(QUALITY_SEPARATOR) {
            Some((name, quality)) if quality.is_empty() => (name, DEFAULT_QUALITY),
            Some((name, quality)) => (name, quality),
            None => (token, DEFAULT_QUALITY),
        };

        if name.is_empty() {
            return Err(Error::InvalidIdentifier("empty stream name".into()));
        }

        Ok(StreamIdentifier::Consumer {
            name: name.to_string(),
            quality: quality.to_string(),
        })
    }

    /// Stream name, whatever the role
    pub fn name(&self) -> &str {
        match self {
            StreamIdentifier::Producer { name, .. } | StreamIdentifier::Consumer { name, .. } => {
                name
            }
        }
    }

    pub fn is_producer(&self) -> bool {
        matches!(self, StreamIdentifier::Producer { .. })
    }
}

impl std::str::FromStr for StreamIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
