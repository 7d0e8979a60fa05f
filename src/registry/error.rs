//! Registry error types
//!
//! Error types for stream and quality table operations.

use thiserror::Error;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A stream with this name is already live
    #[error("stream already exists: {0}")]
    StreamAlreadyExists(String),
    /// No live stream with this name
    #[error("stream not found: {0}")]
    StreamNotFound(String),
    /// The stream already has a quality with this name
    #[error("quality already exists: {stream}@{quality}")]
    QualityAlreadyExists { stream: String, quality: String },
    /// The stream has no quality with this name
    #[error("quality not found: {stream}@{quality}")]
    QualityNotFound { stream: String, quality: String },
}

impl RegistryError {
    /// True for both the stream and quality lookup failures
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::StreamNotFound(_) | RegistryError::QualityNotFound { .. }
        )
    }

    /// True for both the stream and quality duplicate-name failures
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            RegistryError::StreamAlreadyExists(_) | RegistryError::QualityAlreadyExists { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(RegistryError::StreamNotFound("demo".into()).is_not_found());
        assert!(RegistryError::QualityNotFound {
            stream: "demo".into(),
            quality: "text".into()
        }
        .is_not_found());
        assert!(RegistryError::StreamAlreadyExists("demo".into()).is_already_exists());
        assert!(!RegistryError::StreamAlreadyExists("demo".into()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::QualityAlreadyExists {
            stream: "demo".into(),
            quality: "source".into(),
        };
        assert_eq!(err.to_string(), "quality already exists: demo@source");
    }
}
