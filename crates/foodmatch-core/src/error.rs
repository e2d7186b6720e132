//! Error types for foodmatch-core.

use thiserror::Error;

use crate::config::ConfigValidationError;

/// Result type alias using foodmatch-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a places-search provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Places provider unavailable: {0}")]
    Unavailable(String),

    #[error("Places provider rate limited: {0}")]
    RateLimited(String),
}

impl ProviderError {
    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Create a rate limited error
    pub fn rate_limited(reason: impl Into<String>) -> Self {
        Self::RateLimited(reason.into())
    }
}

/// Core error types for session operations
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Invalid parameter {field}: {message}")]
    InvalidParameters { field: String, message: String },

    #[error("Location not available yet")]
    LocationUnavailable,

    // External dependency errors
    #[error("No candidate places found")]
    NoCandidates { source: Option<ProviderError> },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    // Usage errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    DuplicateSession(String),

    #[error("User {user_id} is not a member of session {session_id}")]
    UnknownMember { session_id: String, user_id: String },

    #[error("Place {place_id} is not a candidate in session {session_id}")]
    UnknownPlace { session_id: String, place_id: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("Lock poisoned")]
    LockPoisoned,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create an invalid parameter error
    pub fn invalid_parameters(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an unknown member error
    pub fn unknown_member(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::UnknownMember {
            session_id: session_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Create an unknown place error
    pub fn unknown_place(session_id: impl Into<String>, place_id: impl Into<String>) -> Self {
        Self::UnknownPlace {
            session_id: session_id.into(),
            place_id: place_id.into(),
        }
    }

    /// External dependency failures: retrying or telling the user may help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoCandidates { .. } | Self::Provider(_))
    }

    /// Bad user input that should be re-prompted.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameters { .. } | Self::LocationUnavailable
        )
    }

    /// Programming or usage errors, surfaced and never retried.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_)
                | Self::DuplicateSession(_)
                | Self::UnknownMember { .. }
                | Self::UnknownPlace { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_classification() {
        let err = Error::invalid_parameters("distance", "must be greater than 0");
        assert!(err.is_invalid_input());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("distance"));

        let err = Error::from(ProviderError::rate_limited("quota"));
        assert!(err.is_retryable());
        assert!(!err.is_usage_error());

        let err = Error::unknown_member("s-1", "u-9");
        assert!(err.is_usage_error());
        assert!(err.to_string().contains("u-9"));
        assert!(err.to_string().contains("s-1"));
    }

    #[test]
    fn test_no_candidates_keeps_provider_cause() {
        let err = Error::NoCandidates {
            source: Some(ProviderError::unavailable("status 500")),
        };
        assert!(err.is_retryable());
        let cause = err.source().expect("cause");
        assert!(cause.to_string().contains("status 500"));

        let err = Error::NoCandidates { source: None };
        assert!(err.source().is_none());
    }
}
